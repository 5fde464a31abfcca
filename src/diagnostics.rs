// src/diagnostics.rs

//! User-facing diagnostics channel.
//!
//! Two outputs exist: an append-only line channel (one line per notable
//! event) and transient warnings for failures that a user should notice.
//! Lines are gated by the *current* verbosity setting; warnings always
//! surface. Everything is mirrored into `tracing`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::settings::SettingsProvider;
use crate::errors::RetemplateError;
use crate::types::Verbosity;

/// Where diagnostics end up.
pub trait DiagnosticSink: Send + Sync {
    /// Append one line to the diagnostics channel.
    fn append(&self, line: &str);
    /// Surface a transient warning to the user.
    fn notify(&self, message: &str);
}

/// Prints lines to stdout and user notifications to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSink;

impl DiagnosticSink for TerminalSink {
    fn append(&self, line: &str) {
        println!("[retemplate] {line}");
    }

    fn notify(&self, message: &str) {
        eprintln!("[retemplate] {message}");
    }
}

/// Verbosity-aware front-end shared by every engine component.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
    settings: Arc<dyn SettingsProvider>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { sink, settings }
    }

    /// A line shown at `normal` verbosity and above.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: "retemplate::diagnostics", "{message}");
        if self.verbosity() >= Verbosity::Normal {
            self.sink.append(message);
        }
    }

    /// A line shown only at `verbose`.
    pub fn detail(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(target: "retemplate::diagnostics", "{message}");
        if self.verbosity() >= Verbosity::Verbose {
            self.sink.append(message);
        }
    }

    /// An informational message the user should see even if the
    /// diagnostics channel is not open, e.g. the outcome of a manual
    /// "render all".
    pub fn notice(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.line(message);
        self.sink.notify(message);
    }

    /// A failure: one diagnostic line plus a transient user warning.
    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!(target: "retemplate::diagnostics", "{message}");
        if self.verbosity() >= Verbosity::Normal {
            self.sink.append(&format!("warning: {message}"));
        }
        self.sink.notify(message);
    }

    /// Report a recovered error under its category. Malformed transform
    /// entries only get a line; everything else also warns the user.
    pub fn report(&self, err: &RetemplateError) {
        let message = format!("[{}] {err}", err.category());
        match err {
            RetemplateError::InvalidTransformSpec { .. } => self.line(message),
            _ => self.warn(message),
        }
    }

    fn verbosity(&self) -> Verbosity {
        self.settings.current().verbosity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{Settings, StaticSettings};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        lines: Mutex<Vec<String>>,
        notes: Mutex<Vec<String>>,
    }

    impl DiagnosticSink for Collect {
        fn append(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
        fn notify(&self, message: &str) {
            self.notes.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn verbosity_is_read_on_every_line() {
        let sink = Arc::new(Collect::default());
        let settings = Arc::new(StaticSettings::new(Settings::default()));
        let diag = Diagnostics::new(sink.clone(), settings.clone());

        diag.line("shown");
        diag.detail("hidden");
        settings.set(Settings {
            verbosity: Verbosity::Verbose,
            ..Settings::default()
        });
        diag.detail("now shown");
        settings.set(Settings {
            verbosity: Verbosity::Silent,
            ..Settings::default()
        });
        diag.line("dropped");
        diag.warn("still warned");

        assert_eq!(*sink.lines.lock().unwrap(), vec!["shown", "now shown"]);
        assert_eq!(*sink.notes.lock().unwrap(), vec!["still warned"]);
    }

    #[test]
    fn malformed_entries_do_not_raise_warnings() {
        let sink = Arc::new(Collect::default());
        let diag = Diagnostics::new(sink.clone(), Arc::new(StaticSettings::default()));

        diag.report(&RetemplateError::InvalidTransformSpec {
            origin: "/w/.retemplate.json".into(),
            message: "missing target".into(),
        });
        diag.report(&RetemplateError::MissingSource("/w/a.njk".into()));

        let lines = sink.lines.lock().unwrap();
        assert!(lines[0].starts_with("[transform]"));
        assert!(lines[1].starts_with("warning: [missing-source]"));
        assert_eq!(sink.notes.lock().unwrap().len(), 1);
    }
}
