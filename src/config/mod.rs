// src/config/mod.rs

//! Configuration for retemplate.
//!
//! Responsibilities:
//! - Define the document data model (`model.rs`).
//! - Parse one document in any supported format (`loader.rs`).
//! - Merge all documents with shallow variable overwrite (`merge.rs`).
//! - Find documents inside the workspace roots (`discovery.rs`).
//! - Provide user settings read at point of use (`settings.rs`).

pub mod discovery;
pub mod loader;
pub mod merge;
pub mod model;
pub mod settings;

pub use discovery::{ConfigSource, DEFAULT_CONFIG_GLOB, GlobConfigSource, StaticConfigSource};
pub use loader::{ConfigFormat, ParsedDocument, load_document, parse_document};
pub use merge::{merge_configs, merge_vars, sort_locations};
pub use model::{
    ConfigDocument, ConfigLocation, MergedConfig, ScopedSpec, TransformSpec, VariableEnvironment,
};
pub use settings::{
    Settings, SettingsOverrides, SettingsProvider, StaticSettings, TomlSettingsFile,
};
