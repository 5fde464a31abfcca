// src/render/mod.rs

//! Rendering templates and persisting their output.
//!
//! The template language itself sits behind [`TemplateRenderer`]; the
//! engine only ever hands it a lookup name, the search paths and a
//! variable snapshot. [`writer`] owns the byte-compare-then-write step.

use std::path::PathBuf;

use crate::config::model::VariableEnvironment;

pub mod jinja;
pub mod writer;

pub use jinja::MiniJinjaRenderer;
pub use writer::{WriteOutcome, render_and_write};

/// Turns a named template into text.
///
/// Implementations must not keep state between calls: every call resolves
/// `lookup_name` and its includes against `search_paths` afresh. The call
/// is synchronous and may block on disk IO; the engine runs it on the
/// blocking pool.
pub trait TemplateRenderer: Send + Sync {
    /// Render `lookup_name` with `vars`, or return a diagnostic message.
    fn render(
        &self,
        lookup_name: &str,
        search_paths: &[PathBuf],
        vars: &VariableEnvironment,
    ) -> Result<String, String>;
}
