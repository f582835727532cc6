use tracing::Level;

/// Group for the raw payload of every inbound message.
pub const GROUP_MESSAGE: &str = "WebSocket Message";
/// Group for the decoded JSON structure of an inbound message.
pub const GROUP_PARSED: &str = "Parsed Data";
/// Group for transport errors.
pub const GROUP_ERROR: &str = "WebSocket Error";

/// One diagnostic produced by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub group: Option<&'static str>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            group: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: &'static str) -> Self {
        self.group = Some(group);
        self
    }

    /// Whether the entry is classified as an error.
    pub fn is_error(&self) -> bool {
        self.level == Level::ERROR
    }
}

/// Sink for client diagnostics.
pub trait Observer {
    fn observe(&mut self, entry: LogEntry);
}

/// Forwards entries to `tracing`, keeping the entry's level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&mut self, entry: LogEntry) {
        let LogEntry {
            level,
            group,
            message,
        } = entry;
        if level == Level::ERROR {
            tracing::error!(group, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(group, "{message}");
        } else if level == Level::INFO {
            tracing::info!(group, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(group, "{message}");
        } else {
            tracing::trace!(group, "{message}");
        }
    }
}

/// Keeps every entry in memory.
impl Observer for Vec<LogEntry> {
    fn observe(&mut self, entry: LogEntry) {
        self.push(entry);
    }
}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn observe(&mut self, entry: LogEntry) {
        (**self).observe(entry);
    }
}
