//! Transport-level connection states (RFC 6455 Section 4 and 7).

/// WebSocket connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Opening handshake in progress.
    #[default]
    Connecting,
    /// Handshake complete; frames may be exchanged.
    Open,
    /// Close frame sent, waiting for the peer's close frame.
    Closing,
    /// Connection fully closed.
    Closed,
}

impl ConnectionState {
    /// Everything except `Closed`.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Frames are only read while `Open` or `Closing`.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn test_can_receive_in_each_state() {
        assert!(!ConnectionState::Connecting.can_receive());
        assert!(ConnectionState::Open.can_receive());
        assert!(ConnectionState::Closing.can_receive());
        assert!(!ConnectionState::Closed.can_receive());
    }

    #[test]
    fn test_is_active() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Closing.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
