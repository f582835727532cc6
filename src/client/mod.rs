//! The session bootstrap client.
//!
//! [`SessionBootstrapClient`] follows one connection through its lifecycle
//! and keeps the session id the server hands out in its first message:
//!
//! ```text
//! Connecting --Open--> Open --Close--> Closed
//! Connecting --Close--> Closed        (connection attempt failed)
//! ```
//!
//! Transport events arrive on a channel, so the state machine can be driven
//! by a live [`transport`](crate::transport) task or by synthetic events.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsboot::{ClientConfig, SessionBootstrapClient};
//!
//! # async fn demo() {
//! let mut client = SessionBootstrapClient::connect(ClientConfig::default());
//! if let Some(id) = client.run().await {
//!     println!("session {id}");
//! }
//! # }
//! ```

mod event;
mod observer;

pub use event::{Payload, Phase, TransportEvent};
pub use observer::{
    GROUP_ERROR, GROUP_MESSAGE, GROUP_PARSED, LogEntry, Observer, TracingObserver,
};

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Level;

use crate::config::ClientConfig;
use crate::transport::{self, CLOSE_TIMEOUT};

/// How long a dropped or shut down client lets the transport close the
/// connection before aborting it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2 * CLOSE_TIMEOUT.as_secs());

/// Tracks the connection phase and captures the server-assigned session id.
///
/// The session id is set at most once, from the first message after `Open`
/// whose JSON object carries a string `session` field. Later messages are
/// logged and otherwise ignored.
pub struct SessionBootstrapClient<O = TracingObserver> {
    phase: Phase,
    session: Option<String>,
    observer: O,
    events: Option<mpsc::Receiver<TransportEvent>>,
    transport: Option<JoinHandle<()>>,
}

impl SessionBootstrapClient<TracingObserver> {
    /// A client with no transport attached, logging through `tracing`.
    pub fn new() -> Self {
        Self::with_observer(TracingObserver)
    }

    /// Start connecting to `config.endpoint` and return the client that
    /// follows the attempt.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: ClientConfig) -> Self {
        Self::connect_with_observer(config, TracingObserver)
    }
}

impl Default for SessionBootstrapClient<TracingObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Observer> SessionBootstrapClient<O> {
    /// A client with no transport attached, reporting to `observer`.
    pub fn with_observer(observer: O) -> Self {
        Self {
            phase: Phase::Connecting,
            session: None,
            observer,
            events: None,
            transport: None,
        }
    }

    /// Like [`connect`](SessionBootstrapClient::connect), reporting to
    /// `observer`.
    pub fn connect_with_observer(config: ClientConfig, observer: O) -> Self {
        let (events, task) = transport::spawn(config);
        let mut client = Self::with_observer(observer);
        client.events = Some(events);
        client.transport = Some(task);
        client
    }

    /// Read events from `events` instead of a spawned transport.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Receiver<TransportEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The acquired session id, if any.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Handle events until the connection is closed or the event source is
    /// exhausted. Returns the session id acquired along the way.
    pub async fn run(&mut self) -> Option<&str> {
        self.drive(false).await;
        self.session()
    }

    /// Handle events until a session id is acquired or the connection is
    /// closed. The connection stays up; call [`run`](Self::run) to follow it
    /// further.
    pub async fn wait_for_session(&mut self) -> Option<&str> {
        self.drive(true).await;
        self.session()
    }

    /// Drop the event receiver and give the transport [`SHUTDOWN_GRACE`] to
    /// finish its closing handshake before aborting it.
    pub async fn shutdown(&mut self) {
        self.events = None;
        if let Some(mut task) = self.transport.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }

    async fn drive(&mut self, until_session: bool) {
        // Dropping this future drops the receiver, which tells the transport
        // to close.
        let Some(mut events) = self.events.take() else {
            return;
        };
        while self.phase != Phase::Closed {
            if until_session && self.session.is_some() {
                self.events = Some(events);
                return;
            }
            let Some(event) = events.recv().await else {
                return;
            };
            self.handle(event);
        }
    }

    /// Apply one transport event.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(payload) => self.on_message(payload),
            TransportEvent::Close {
                was_clean,
                code,
                reason,
            } => self.on_close(was_clean, code, &reason),
            TransportEvent::Error(err) => self.on_error(&err),
        }
    }

    fn on_open(&mut self) {
        if self.phase != Phase::Connecting {
            self.log(Level::WARN, format!("Ignoring open event while {}", self.phase));
            return;
        }
        self.phase = Phase::Open;
        self.log(Level::INFO, "WebSocket Connected");
    }

    fn on_message(&mut self, payload: Payload) {
        if self.phase != Phase::Open {
            self.log(Level::WARN, format!("Ignoring message while {}", self.phase));
            return;
        }

        self.observer.observe(
            LogEntry::new(Level::INFO, format!("Data: [{payload}]")).in_group(GROUP_MESSAGE),
        );

        let Payload::Text(text) = payload else {
            self.log(Level::WARN, "Ignoring malformed payload: binary data");
            return;
        };

        let fields = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => fields,
            Ok(other) => {
                self.log(
                    Level::WARN,
                    format!("Ignoring malformed payload: expected a JSON object, got {}", kind(&other)),
                );
                return;
            }
            Err(err) => {
                self.log(Level::WARN, format!("Ignoring malformed payload: {err}"));
                return;
            }
        };

        self.observer.observe(
            LogEntry::new(
                Level::INFO,
                format!("Parsed Data : [object] {}", Value::Object(fields.clone())),
            )
            .in_group(GROUP_PARSED),
        );

        if self.session.is_some() {
            return;
        }
        match fields.get("session") {
            Some(Value::String(id)) => {
                self.session = Some(id.clone());
                self.log(Level::INFO, format!("Acquired Session ID: [{id}]"));
            }
            Some(other) => self.log(
                Level::WARN,
                format!("Ignoring session field of type {}", kind(other)),
            ),
            None => self.log(Level::DEBUG, "Message carries no session field"),
        }
    }

    fn on_close(&mut self, was_clean: bool, code: u16, reason: &str) {
        if self.phase == Phase::Closed {
            self.log(Level::DEBUG, "Ignoring close event after close");
            return;
        }
        self.phase = Phase::Closed;
        if was_clean {
            self.log(Level::INFO, "WebSocket Closed");
        } else {
            self.log(Level::ERROR, format!("WebSocket Closed: [{reason}] (code {code})"));
        }
    }

    fn on_error(&mut self, err: &str) {
        self.observer
            .observe(LogEntry::new(Level::ERROR, err).in_group(GROUP_ERROR));
    }

    fn log(&mut self, level: Level, message: impl Into<String>) {
        self.observer.observe(LogEntry::new(level, message));
    }
}

impl<O> Drop for SessionBootstrapClient<O> {
    fn drop(&mut self) {
        self.events = None;
        let Some(mut task) = self.transport.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> SessionBootstrapClient<Vec<LogEntry>> {
        SessionBootstrapClient::with_observer(Vec::new())
    }

    fn opened() -> SessionBootstrapClient<Vec<LogEntry>> {
        let mut client = recording();
        client.handle(TransportEvent::Open);
        client
    }

    fn messages(client: &SessionBootstrapClient<Vec<LogEntry>>) -> Vec<&str> {
        client
            .observer()
            .iter()
            .map(|e| e.message.as_str())
            .collect()
    }

    #[test]
    fn test_open_transitions_and_logs() {
        let client = opened();
        assert_eq!(client.phase(), Phase::Open);
        assert_eq!(client.observer()[0], LogEntry::new(Level::INFO, "WebSocket Connected"));
    }

    #[test]
    fn test_first_message_sets_session() {
        let mut client = opened();
        client.handle(TransportEvent::text(r#"{"session":"abc123"}"#));

        assert_eq!(client.session(), Some("abc123"));
        let log = messages(&client);
        assert!(log.contains(&r#"Data: [{"session":"abc123"}]"#));
        assert!(log.contains(&"Acquired Session ID: [abc123]"));
    }

    #[test]
    fn test_later_messages_do_not_override() {
        let mut client = opened();
        client.handle(TransportEvent::text(r#"{"session":"abc123"}"#));
        client.handle(TransportEvent::text(r#"{"session":"xyz789"}"#));

        assert_eq!(client.session(), Some("abc123"));
        let parsed = client
            .observer()
            .iter()
            .filter(|e| e.group == Some(GROUP_PARSED))
            .count();
        assert_eq!(parsed, 2);
        assert_eq!(
            messages(&client)
                .iter()
                .filter(|m| m.starts_with("Acquired"))
                .count(),
            1
        );
    }

    #[test]
    fn test_reference_server_spacing() {
        let mut client = opened();
        client.handle(TransportEvent::text("{\"session\" : \"0f1e2d3c\"}"));
        assert_eq!(client.session(), Some("0f1e2d3c"));
    }

    #[test]
    fn test_malformed_payload_is_ignored() {
        let mut client = opened();
        client.handle(TransportEvent::text("not json"));
        client.handle(TransportEvent::text("[1,2]"));
        client.handle(TransportEvent::Message(Payload::Binary(vec![0xde, 0xad])));

        assert_eq!(client.session(), None);
        assert_eq!(client.phase(), Phase::Open);
        let warnings: Vec<_> = client
            .observer()
            .iter()
            .filter(|e| e.level == Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 3);
        assert!(warnings
            .iter()
            .all(|e| e.message.starts_with("Ignoring malformed payload")));

        client.handle(TransportEvent::text(r#"{"session":"late"}"#));
        assert_eq!(client.session(), Some("late"));
    }

    #[test]
    fn test_message_without_session_keeps_waiting() {
        let mut client = opened();
        client.handle(TransportEvent::text(r#"{"hello":"world"}"#));
        client.handle(TransportEvent::text(r#"{"session":7}"#));
        assert_eq!(client.session(), None);

        client.handle(TransportEvent::text(r#"{"session":"s1"}"#));
        assert_eq!(client.session(), Some("s1"));
    }

    #[test]
    fn test_message_before_open_is_ignored() {
        let mut client = recording();
        client.handle(TransportEvent::text(r#"{"session":"early"}"#));
        assert_eq!(client.session(), None);
        assert_eq!(client.phase(), Phase::Connecting);
    }

    #[test]
    fn test_clean_close() {
        let mut client = opened();
        client.handle(TransportEvent::close(true, 1000, ""));

        assert_eq!(client.phase(), Phase::Closed);
        let last = client.observer().last().unwrap();
        assert_eq!(last.message, "WebSocket Closed");
        assert!(!last.is_error());
    }

    #[test]
    fn test_unclean_close_carries_reason() {
        let mut client = opened();
        client.handle(TransportEvent::close(false, 1006, "network lost"));

        assert_eq!(client.phase(), Phase::Closed);
        let last = client.observer().last().unwrap();
        assert!(last.is_error());
        assert!(last.message.contains("network lost"));
    }

    #[test]
    fn test_failed_connect_goes_straight_to_closed() {
        let mut client = recording();
        client.handle(TransportEvent::Error("connection refused".into()));
        client.handle(TransportEvent::close(false, 1006, "connection refused"));
        assert_eq!(client.phase(), Phase::Closed);

        client.handle(TransportEvent::Open);
        assert_eq!(client.phase(), Phase::Closed);
    }

    #[test]
    fn test_error_changes_nothing() {
        for setup in [0, 1, 2] {
            let mut client = recording();
            if setup >= 1 {
                client.handle(TransportEvent::Open);
                client.handle(TransportEvent::text(r#"{"session":"keep"}"#));
            }
            if setup == 2 {
                client.handle(TransportEvent::close(true, 1000, ""));
            }
            let phase = client.phase();
            let session = client.session().map(str::to_owned);

            client.handle(TransportEvent::Error("boom".into()));

            assert_eq!(client.phase(), phase);
            assert_eq!(client.session().map(str::to_owned), session);
            let last = client.observer().last().unwrap();
            assert_eq!(last.group, Some(GROUP_ERROR));
            assert!(last.is_error());
        }
    }

    #[tokio::test]
    async fn test_run_drains_until_close() {
        let (tx, rx) = mpsc::channel(8);
        for event in [
            TransportEvent::Open,
            TransportEvent::text(r#"{"session":"abc123"}"#),
            TransportEvent::close(true, 1000, ""),
            TransportEvent::text(r#"{"session":"after"}"#),
        ] {
            tx.send(event).await.unwrap();
        }

        let mut client = recording().with_events(rx);
        assert_eq!(client.run().await, Some("abc123"));
        assert_eq!(client.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn test_run_stops_when_sender_dropped() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(TransportEvent::Open).await.unwrap();
        drop(tx);

        let mut client = recording().with_events(rx);
        assert_eq!(client.run().await, None);
        assert_eq!(client.phase(), Phase::Open);
    }

    #[tokio::test]
    async fn test_wait_for_session_keeps_following() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(TransportEvent::Open).await.unwrap();
        tx.send(TransportEvent::text(r#"{"hello":1}"#)).await.unwrap();
        tx.send(TransportEvent::text(r#"{"session":"abc123"}"#)).await.unwrap();

        let mut client = recording().with_events(rx);
        assert_eq!(client.wait_for_session().await, Some("abc123"));
        assert_eq!(client.phase(), Phase::Open);

        // the channel is still attached
        tx.send(TransportEvent::close(true, 1000, "")).await.unwrap();
        assert_eq!(client.run().await, Some("abc123"));
        assert_eq!(client.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn test_wait_for_session_stops_on_close() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(TransportEvent::Open).await.unwrap();
        tx.send(TransportEvent::close(false, 1006, "")).await.unwrap();

        let mut client = recording().with_events(rx);
        assert_eq!(client.wait_for_session().await, None);
        assert_eq!(client.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_drops_receiver() {
        let (tx, rx) = mpsc::channel(8);
        let mut client = recording().with_events(rx);
        client.shutdown().await;
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_run_without_events_returns_immediately() {
        let mut client = recording();
        assert_eq!(client.run().await, None);
    }
}
