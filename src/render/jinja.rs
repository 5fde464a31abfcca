// src/render/jinja.rs

use std::io;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior, Value};

use crate::config::model::VariableEnvironment;
use crate::render::TemplateRenderer;

/// Jinja-style rendering through `minijinja`.
///
/// A fresh [`Environment`] is built for every render so nothing from an
/// earlier template (including since-deleted includes) survives.
#[derive(Debug, Clone, Default)]
pub struct MiniJinjaRenderer;

impl MiniJinjaRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(
        &self,
        lookup_name: &str,
        search_paths: &[PathBuf],
        vars: &VariableEnvironment,
    ) -> Result<String, String> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let roots = search_paths.to_vec();
        env.set_loader(move |name| load_from_search_paths(&roots, name));

        let template = env.get_template(lookup_name).map_err(|e| format_error(&e))?;
        template
            .render(Value::from_serialize(vars))
            .map_err(|e| format_error(&e))
    }
}

/// Find `name` under the first search path that has it.
fn load_from_search_paths(roots: &[PathBuf], name: &str) -> Result<Option<String>, Error> {
    let Some(relative) = safe_relative(name) else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("template name {name:?} escapes the search paths"),
        ));
    };

    for root in roots {
        let candidate = root.join(&relative);
        match std::fs::read_to_string(&candidate) {
            Ok(source) => return Ok(Some(source)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) if e.kind() == io::ErrorKind::IsADirectory => continue,
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("could not read template {:?}", candidate),
                )
                .with_source(e));
            }
        }
    }
    Ok(None)
}

/// `name` as a relative path, or `None` when it contains `..` or is
/// absolute.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return None,
            s => out.push(s),
        }
    }
    if out.as_os_str().is_empty() || Path::new(name).is_absolute() {
        return None;
    }
    Some(out)
}

/// Flatten a minijinja error and its causes into one line.
fn format_error(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
