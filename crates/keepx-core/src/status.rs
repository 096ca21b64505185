//! Progress/status sink used around open and save.

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Receives human-readable progress for long operations.
pub trait StatusLogger {
    /// Begin an operation; `write_to_log` also records it as a message.
    fn start_logging(&mut self, operation: &str, write_to_log: bool);

    /// Report status text. Returns whether the caller should continue.
    fn set_text(&mut self, text: &str, level: LogLevel) -> bool;

    fn end_logging(&mut self);
}

/// Forwards status messages to `tracing` and keeps the latest ones.
#[derive(Debug, Default)]
pub struct TracingStatusLogger {
    started: bool,
    ended: bool,
    messages: Vec<(LogLevel, String)>,
}

impl TracingStatusLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded since the last `set_text` (plus the operation, when
    /// it was written to the log).
    pub fn messages(&self) -> &[(LogLevel, String)] {
        &self.messages
    }

    pub fn is_active(&self) -> bool {
        self.started && !self.ended
    }
}

impl StatusLogger for TracingStatusLogger {
    fn start_logging(&mut self, operation: &str, write_to_log: bool) {
        tracing::info!("{}", operation);
        self.started = true;
        self.ended = false;
        if write_to_log {
            self.messages.push((LogLevel::Info, operation.to_string()));
        }
    }

    fn set_text(&mut self, text: &str, level: LogLevel) -> bool {
        match level {
            LogLevel::Info => tracing::debug!("{}", text),
            LogLevel::Warning => tracing::warn!("{}", text),
            LogLevel::Error => tracing::error!("{}", text),
        }
        self.messages.clear();
        self.messages.push((level, text.to_string()));
        true
    }

    fn end_logging(&mut self) {
        self.ended = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_message() {
        let mut logger = TracingStatusLogger::new();
        logger.start_logging("Opening database", true);
        assert!(logger.is_active());
        assert_eq!(logger.messages().len(), 1);

        assert!(logger.set_text("Decrypting", LogLevel::Info));
        assert!(logger.set_text("Slow KDF", LogLevel::Warning));
        assert_eq!(logger.messages(), &[(LogLevel::Warning, "Slow KDF".to_string())]);

        logger.end_logging();
        assert!(!logger.is_active());
    }
}
