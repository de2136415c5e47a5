//! Progress reporting
//!
//! Components receive a reporter at construction instead of writing to a
//! global logger, so tests can pass [`NullReporter`] and the CLI can drive a
//! spinner.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink for human-readable progress messages.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, message: &str);

    /// A recoverable failure the user should see.
    fn warn(&self, message: &str) {
        self.report(message);
    }
}

/// Shared handle passed into components.
pub type Reporter = Arc<dyn ProgressReporter>;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _message: &str) {}
}

/// Forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Terminal spinner showing the latest message.
pub struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.bar
            .println(format!("{} {}", console::style("warning:").yellow().bold(), message));
    }
}

/// Keeps every message; for tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_keeps_order() {
        let reporter = RecordingReporter::default();
        reporter.report("one");
        reporter.warn("two");
        assert_eq!(reporter.messages(), vec!["one", "two"]);
    }

    #[test]
    fn test_null_reporter_is_object_safe() {
        let reporter: Reporter = Arc::new(NullReporter);
        reporter.report("ignored");
    }
}
