//! Silent and capturing logger implementations

use parking_lot::Mutex;

use super::traits::Logger;

/// A logger that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl NoOpLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for NoOpLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// A logger that keeps every line in memory, prefixed with its level.
///
/// Handy in tests that assert a failure was reported rather than raised.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded lines
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any line at `level` contains `needle`
    pub fn contains(&self, level: &str, needle: &str) -> bool {
        let prefix = format!("{level}: ");
        self.lines
            .lock()
            .iter()
            .any(|l| l.starts_with(&prefix) && l.contains(needle))
    }

    fn push(&self, level: &str, message: &str) {
        self.lines.lock().push(format!("{level}: {message}"));
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.push("DEBUG", message);
    }
    fn info(&self, message: &str) {
        self.push("INFO", message);
    }
    fn warn(&self, message: &str) {
        self.push("WARN", message);
    }
    fn error(&self, message: &str) {
        self.push("ERROR", message);
    }
}
