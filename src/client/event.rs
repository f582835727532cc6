use std::fmt;

/// Lifecycle phase of the bootstrap client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Connection attempt in flight.
    #[default]
    Connecting,
    /// Handshake finished, messages may arrive.
    Open,
    /// Terminal.
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connecting => write!(f, "connecting"),
            Phase::Open => write!(f, "open"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Payload of a data message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Binary(bytes) => write!(f, "<{} bytes of binary data>", bytes.len()),
        }
    }
}

/// Something that happened on the transport.
///
/// A transport emits at most one `Open`, any number of `Message` and `Error`
/// events, and exactly one `Close` as its last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The opening handshake completed.
    Open,
    /// A complete data message arrived.
    Message(Payload),
    /// The connection is gone.
    Close {
        /// Whether the closing handshake completed.
        was_clean: bool,
        /// Status code from the server's close frame, 1005 if it carried
        /// none, 1006 if the connection dropped.
        code: u16,
        /// Reason text from the close frame, or a description of the failure.
        reason: String,
    },
    /// Transport failure. Always followed by a non-clean `Close`.
    Error(String),
}

impl TransportEvent {
    /// Shorthand for a text message event.
    pub fn text(text: impl Into<String>) -> Self {
        TransportEvent::Message(Payload::Text(text.into()))
    }

    /// Shorthand for a close event.
    pub fn close(was_clean: bool, code: u16, reason: impl Into<String>) -> Self {
        TransportEvent::Close {
            was_clean,
            code,
            reason: reason.into(),
        }
    }
}
