//! Diagnostic reporting.
//!
//! Rejected calls are never fatal. They are reported as human-readable
//! messages through a [`Diagnostics`] collaborator injected into every
//! channel, so a test can capture and assert on them.

use std::sync::{Mutex, PoisonError};
use tracing::{error, trace};

/// Sink for diagnostic messages.
pub trait Diagnostics: Send + Sync {
    /// Report a diagnostic message.
    fn warn(&self, message: &str);
}

/// Reports diagnostics through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn warn(&self, message: &str) {
        error!(target: "echo_mock", "{}", message);
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct CapturedDiagnostics {
    messages: Mutex<Vec<String>>,
}

impl CapturedDiagnostics {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Get the number of captured messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Check if any captured message contains `fragment`.
    #[must_use]
    pub fn contains(&self, fragment: &str) -> bool {
        self.lock().iter().any(|m| m.contains(fragment))
    }

    /// Drop all captured messages.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Diagnostics for CapturedDiagnostics {
    fn warn(&self, message: &str) {
        trace!(target: "echo_mock", diagnostic = message, "Captured diagnostic");
        self.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_captured_diagnostics() {
        let captured = CapturedDiagnostics::new();
        assert!(captured.is_empty());

        captured.warn("Channel didn't listen to event: foo");
        captured.warn("user is null");

        assert_eq!(captured.len(), 2);
        assert!(captured.contains("event: foo"));
        assert!(!captured.contains("bar"));
        assert_eq!(captured.messages()[1], "user is null");

        captured.clear();
        assert!(captured.is_empty());
    }

    #[test]
    fn test_tracing_diagnostics_as_trait_object() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let diagnostics: Arc<dyn Diagnostics> = Arc::new(TracingDiagnostics);
        diagnostics.warn("Echo doesn't have channel: missing");
    }
}
