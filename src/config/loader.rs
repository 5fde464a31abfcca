// src/config/loader.rs

//! Parse one configuration document into variables and transform specs.
//!
//! A document is a mapping with two optional keys:
//!
//! ```yaml
//! vars:
//!   title: Hello
//!   nested: { a: 1 }
//! transforms:
//!   templates/index.html.njk: public/index.html
//!   templates/pages: { target: public/pages, recursive: true }
//! ```
//!
//! `transforms` may also be a list of `{source, target, recursive?}` objects
//! or a single such object.

use std::path::Path;

use serde_json::{Map, Value};

use crate::config::model::{ConfigDocument, TransformSpec, VariableEnvironment};
use crate::errors::{Result, RetemplateError};
use crate::fs::FileSystem;

/// Serialization format of a config document, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    fn parse(self, contents: &str) -> std::result::Result<Value, String> {
        match self {
            ConfigFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

/// A parsed document plus the entries that had to be dropped from it.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub document: ConfigDocument,
    pub dropped: Vec<RetemplateError>,
}

/// Read and parse the document at `path`.
pub fn load_document(fs: &dyn FileSystem, path: &Path) -> Result<ParsedDocument> {
    let contents = fs.read_to_string(path).map_err(|e| parse_error(path, e))?;
    parse_document(path, &contents)
}

/// Parse document text. `path` selects the format and labels diagnostics.
pub fn parse_document(path: &Path, contents: &str) -> Result<ParsedDocument> {
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| parse_error(path, "unsupported config file extension"))?;

    // An empty file is an empty mapping, not a structural error.
    if contents.trim().is_empty() {
        return Ok(ParsedDocument::default());
    }

    let root = format.parse(contents).map_err(|e| parse_error(path, e))?;
    let Value::Object(mut root) = root else {
        return Err(parse_error(path, "document root must be a mapping"));
    };

    let vars = match root.remove("vars") {
        None | Some(Value::Null) => VariableEnvironment::new(),
        Some(Value::Object(vars)) => vars,
        Some(_) => return Err(parse_error(path, "`vars` must be a mapping")),
    };

    let mut dropped = Vec::new();
    let transforms = match root.remove("transforms") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => normalize_transforms(&value, path, &mut dropped),
    };

    Ok(ParsedDocument {
        document: ConfigDocument { vars, transforms },
        dropped,
    })
}

/// Normalize the three accepted `transforms` shapes into specs. Entries that
/// lack a usable source or target are pushed onto `dropped`.
pub fn normalize_transforms(
    value: &Value,
    origin: &Path,
    dropped: &mut Vec<RetemplateError>,
) -> Vec<TransformSpec> {
    let mut specs = Vec::new();
    match value {
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let label = format!("transforms[{idx}]");
                match item {
                    Value::Object(obj) => {
                        let spec = object_spec(obj, None, origin, &label, dropped);
                        push_spec(&mut specs, dropped, origin, &label, spec);
                    }
                    _ => dropped.push(invalid(origin, format!("{label}: expected an object"))),
                }
            }
        }
        Value::Object(obj) if is_single_spec(obj) => {
            let spec = object_spec(obj, None, origin, "transforms", dropped);
            push_spec(&mut specs, dropped, origin, "transforms", spec);
        }
        Value::Object(map) => {
            for (key, entry) in map {
                let label = format!("transforms.{key}");
                let spec = match entry {
                    Value::Object(obj) => object_spec(obj, Some(key), origin, &label, dropped),
                    scalar => coerce_path(scalar).map(|target| TransformSpec::file(key.clone(), target)),
                };
                push_spec(&mut specs, dropped, origin, &label, spec);
            }
        }
        _ => dropped.push(invalid(
            origin,
            "`transforms` must be a mapping, a list, or a single transform object".to_string(),
        )),
    }
    specs
}

fn push_spec(
    specs: &mut Vec<TransformSpec>,
    dropped: &mut Vec<RetemplateError>,
    origin: &Path,
    label: &str,
    spec: Option<TransformSpec>,
) {
    match spec {
        Some(spec) => specs.push(spec),
        None => dropped.push(invalid(
            origin,
            format!("{label}: missing a usable `source` or `target`"),
        )),
    }
}

/// A bare object is a single transform when both `source` and `target` are
/// scalars; otherwise it is read as a source-key map.
fn is_single_spec(obj: &Map<String, Value>) -> bool {
    let scalar = |k: &str| obj.get(k).is_some_and(|v| coerce_path(v).is_some());
    scalar("source") && scalar("target")
}

fn object_spec(
    obj: &Map<String, Value>,
    key: Option<&String>,
    origin: &Path,
    label: &str,
    dropped: &mut Vec<RetemplateError>,
) -> Option<TransformSpec> {
    // An explicit `source` wins over the map key.
    let source = obj
        .get("source")
        .and_then(coerce_path)
        .or_else(|| key.and_then(|k| coerce_path(&Value::String(k.clone()))))?;
    let target = obj.get("target").and_then(coerce_path)?;

    let recursive = match obj.get("recursive") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(other) => {
            dropped.push(invalid(
                origin,
                format!("{label}: ignoring non-boolean `recursive` ({other})"),
            ));
            None
        }
    };

    Some(TransformSpec {
        source,
        target,
        recursive,
    })
}

/// Strings pass through; numbers become their textual form. Blank strings
/// and every other type are unusable.
fn coerce_path(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn parse_error(path: &Path, message: impl ToString) -> RetemplateError {
    RetemplateError::ConfigParse {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn invalid(origin: &Path, message: String) -> RetemplateError {
    RetemplateError::InvalidTransformSpec {
        origin: origin.to_path_buf(),
        message,
    }
}
