//! Operator console funnel.
//!
//! Every operator-facing report goes through [`Console::write`] tagged with a
//! severity. Error-severity lines increment an unread-notification counter
//! the operator can silence. Timestamps are seconds since the console was
//! created, which doubles as the process clock for received-message records.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Severity of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// One console line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleEntry {
    /// Seconds since startup.
    pub timestamp: f64,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for ConsoleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.1}] {}: {}", self.timestamp, self.severity, self.message)
    }
}

#[derive(Debug)]
pub struct Console {
    started: Instant,
    entries: Mutex<Vec<ConsoleEntry>>,
    notification_count: AtomicUsize,
    show_notification: AtomicBool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
            notification_count: AtomicUsize::new(0),
            show_notification: AtomicBool::new(false),
        }
    }

    /// Seconds since the console was created. Shared clock for everything
    /// that stamps relative time.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn write(&self, severity: Severity, message: impl Into<String>) {
        if severity == Severity::Error {
            self.notification_count.fetch_add(1, Ordering::Relaxed);
            self.show_notification.store(true, Ordering::Relaxed);
        }

        let message = message.into();
        // Mirror every line into the process log so both surfaces agree.
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }

        let entry = ConsoleEntry {
            timestamp: self.elapsed_secs(),
            severity,
            message,
        };
        self.entries.lock().unwrap().push(entry);
    }

    /// Reset the unread-notification state.
    pub fn silence(&self) {
        self.notification_count.store(0, Ordering::Relaxed);
        self.show_notification.store(false, Ordering::Relaxed);
    }

    pub fn notification_count(&self) -> usize {
        self.notification_count.load(Ordering::Relaxed)
    }

    pub fn has_notification(&self) -> bool {
        self.show_notification.load(Ordering::Relaxed)
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries appended since `from`, plus the new cursor position. Lets a
    /// display surface poll without re-reading the whole buffer.
    pub fn entries_since(&self, from: usize) -> (Vec<ConsoleEntry>, usize) {
        let entries = self.entries.lock().unwrap();
        let fresh = entries.get(from..).unwrap_or(&[]).to_vec();
        (fresh, entries.len())
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
