#![allow(dead_code)]

use std::path::{Path, PathBuf};

use retemplate::config::VariableEnvironment;
use retemplate::transform::FileTransform;
use serde_json::{Value, json};

/// Builder for the JSON text of one config document.
#[derive(Debug, Default, Clone)]
pub struct ConfigDocBuilder {
    vars: VariableEnvironment,
    transforms: Vec<Value>,
}

impl ConfigDocBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn file(mut self, source: &str, target: &str) -> Self {
        self.transforms
            .push(json!({ "source": source, "target": target }));
        self
    }

    pub fn directory(mut self, source: &str, target: &str, recursive: bool) -> Self {
        self.transforms.push(json!({
            "source": source,
            "target": target,
            "recursive": recursive,
        }));
        self
    }

    pub fn to_json(&self) -> String {
        json!({ "vars": self.vars, "transforms": self.transforms }).to_string()
    }
}

/// A file transform with the source's directory as its only search path.
pub fn file_transform(source: impl AsRef<Path>, target: impl AsRef<Path>) -> FileTransform {
    let source = source.as_ref().to_path_buf();
    let target = target.as_ref().to_path_buf();
    let dir = source.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
    let lookup_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    FileTransform {
        description: format!("{} -> {}", source.display(), target.display()),
        source,
        target,
        search_paths: vec![dir],
        lookup_name,
    }
}
