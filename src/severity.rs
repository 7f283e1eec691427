//! Log severity levels and the atomic threshold gate.

use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    /// Uppercase name used in rendered log lines.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

/// Process-wide minimum severity shared by every logging thread.
///
/// Sits on the hot path of each log call, so the threshold is a single
/// atomic scalar rather than a lock.
pub struct SeverityFilter {
    threshold: AtomicU8,
}

impl SeverityFilter {
    pub fn new(threshold: Severity) -> Self {
        Self {
            threshold: AtomicU8::new(threshold as u8),
        }
    }

    /// Whether a message at `severity` passes the current threshold.
    pub fn should_log(&self, severity: Severity) -> bool {
        severity as u8 >= self.threshold.load(Ordering::Relaxed)
    }

    /// Replace the threshold, taking effect for all subsequent log calls.
    pub fn set_level(&self, severity: Severity) {
        self.threshold.store(severity as u8, Ordering::Relaxed);
    }
}

impl Default for SeverityFilter {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}
