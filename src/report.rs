//! Diagnostic reporting
//!
//! A connection failure is turned into exactly one user-facing message and
//! handed to a [`DiagnosticReporter`]. Where that message ends up (a log, a
//! terminal, a UI toast) is the reporter's business.

use crate::ConnectionFailure;
use std::sync::Mutex;

/// Prefix of every connection failure diagnostic
pub const DIAGNOSTIC_PREFIX: &str = "❌ Database connection failed";

/// Format the diagnostic for a failure, interpolating the underlying message
pub fn format_diagnostic(failure: &ConnectionFailure) -> String {
    format!("{}: {}", DIAGNOSTIC_PREFIX, failure)
}

/// Sink for user-facing diagnostics
pub trait DiagnosticReporter: Send + Sync {
    /// Display one diagnostic message
    fn report(&self, message: &str);
}

impl<F> DiagnosticReporter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Emits diagnostics as `tracing` error events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl DiagnosticReporter for TracingReporter {
    fn report(&self, message: &str) {
        tracing::error!(target: "pgconnect::diagnostic", "{}", message);
    }
}

/// Writes diagnostics to standard error, one per line
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrReporter;

impl DiagnosticReporter for StderrReporter {
    fn report(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Keeps diagnostics in memory for later display
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: Mutex<Vec<String>>,
}

impl MemoryReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages reported so far, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Remove and return all messages
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        // A poisoned lock still holds valid strings
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DiagnosticReporter for MemoryReporter {
    fn report(&self, message: &str) {
        self.lock().push(message.to_string());
    }
}
