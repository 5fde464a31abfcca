// src/config/settings.rs

//! User-configurable options, read at point of use.
//!
//! ```toml
//! [settings]
//! template_extension = ".njk"
//! search_paths = ["shared/templates"]
//! verbosity = "verbose"
//! ```
//!
//! Nothing in the engine stores a [`Settings`] value; every consumer asks
//! its [`SettingsProvider`] again, so edits to the settings file take effect
//! on the next scan or render without a reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::Deserialize;
use tracing::warn;

use crate::errors::{Result, RetemplateError};
use crate::types::Verbosity;

/// Default template file extension.
pub const DEFAULT_TEMPLATE_EXTENSION: &str = ".njk";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Extension identifying template files inside directory transforms.
    pub template_extension: String,
    /// Extra template search paths, relative to the workspace root.
    pub search_paths: Vec<String>,
    pub verbosity: Verbosity,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
            search_paths: Vec::new(),
            verbosity: Verbosity::default(),
        }
    }
}

impl Settings {
    /// The template extension lower-cased and with a leading dot.
    pub fn normalized_extension(&self) -> String {
        let ext = self.template_extension.trim().to_lowercase();
        if ext.is_empty() {
            return DEFAULT_TEMPLATE_EXTENSION.to_string();
        }
        if ext.starts_with('.') {
            ext
        } else {
            format!(".{ext}")
        }
    }
}

/// Source of the current settings.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Settings;
}

/// In-process settings, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticSettings {
    inner: RwLock<Settings>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn set(&self, settings: Settings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

impl SettingsProvider for StaticSettings {
    fn current(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Values given on the command line that win over the settings file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub template_extension: Option<String>,
    pub search_paths: Option<Vec<String>>,
    pub verbosity: Option<Verbosity>,
}

impl SettingsOverrides {
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(ext) = &self.template_extension {
            settings.template_extension = ext.clone();
        }
        if let Some(paths) = &self.search_paths {
            settings.search_paths = paths.clone();
        }
        if let Some(verbosity) = self.verbosity {
            settings.verbosity = verbosity;
        }
        settings
    }
}

#[derive(Debug, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    settings: Settings,
}

/// Parse a `[settings]` TOML document.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let doc: SettingsDocument =
        toml::from_str(contents).map_err(|e| RetemplateError::Settings(e.to_string()))?;
    Ok(doc.settings)
}

/// Load a settings file from disk.
pub fn load_settings_file(path: impl AsRef<Path>) -> Result<Settings> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_settings(&contents)
}

/// Settings backed by a TOML file that is re-read on every access.
///
/// A missing or malformed file falls back to defaults; the problem is logged
/// once per distinct error message rather than on every read.
#[derive(Debug)]
pub struct TomlSettingsFile {
    path: PathBuf,
    overrides: SettingsOverrides,
    last_error: Mutex<Option<String>>,
}

impl TomlSettingsFile {
    pub fn new(path: impl Into<PathBuf>, overrides: SettingsOverrides) -> Self {
        Self {
            path: path.into(),
            overrides,
            last_error: Mutex::new(None),
        }
    }

    fn remember_error(&self, message: Option<String>) {
        let mut last = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(msg) = &message {
            if last.as_deref() != Some(msg.as_str()) {
                warn!(path = ?self.path, error = %msg, "using default settings");
            }
        }
        *last = message;
    }
}

impl SettingsProvider for TomlSettingsFile {
    fn current(&self) -> Settings {
        let base = if self.path.exists() {
            match load_settings_file(&self.path) {
                Ok(settings) => {
                    self.remember_error(None);
                    settings
                }
                Err(err) => {
                    self.remember_error(Some(err.to_string()));
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };
        self.overrides.apply(base)
    }
}
