// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Every variant except `Io`/`Settings`/`Other` is recovered at the point of
//! detection: the offending file or transform is dropped, a diagnostic is
//! emitted, and the surrounding batch keeps going.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetemplateError {
    #[error("failed to parse config {path:?}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid transform in {origin:?}: {message}")]
    InvalidTransformSpec { origin: PathBuf, message: String },

    #[error("template source does not exist: {0:?}")]
    MissingSource(PathBuf),

    #[error("degenerate transform {source_path:?} -> {target:?}: {reason}")]
    DegenerateTransform {
        source_path: PathBuf,
        target: PathBuf,
        reason: String,
    },

    #[error("transform {source_path:?} -> {target:?} is part of a cycle")]
    CycleDetected { source_path: PathBuf, target: PathBuf },

    #[error("failed to scan directory {dir:?}: {message}")]
    DirectoryScan { dir: PathBuf, message: String },

    #[error("failed to render {template}: {message}")]
    Render { template: String, message: String },

    #[error("failed to write {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RetemplateError {
    /// Short category label used as the prefix of diagnostic lines.
    pub fn category(&self) -> &'static str {
        match self {
            RetemplateError::ConfigParse { .. } => "config",
            RetemplateError::InvalidTransformSpec { .. } => "transform",
            RetemplateError::MissingSource(_) => "missing-source",
            RetemplateError::DegenerateTransform { .. } => "degenerate",
            RetemplateError::CycleDetected { .. } => "cycle",
            RetemplateError::DirectoryScan { .. } => "scan",
            RetemplateError::Render { .. } => "render",
            RetemplateError::Write { .. } => "write",
            RetemplateError::Settings(_) => "settings",
            RetemplateError::Io(_) => "io",
            RetemplateError::Other(_) => "error",
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RetemplateError>;
