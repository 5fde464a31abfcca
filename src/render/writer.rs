// src/render/writer.rs

use tracing::debug;

use crate::config::model::VariableEnvironment;
use crate::errors::{Result, RetemplateError};
use crate::fs::FileSystem;
use crate::render::TemplateRenderer;
use crate::transform::FileTransform;

/// What happened to the target of one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Target was missing or differed and has been replaced.
    Written,
    /// Rendered bytes matched the target exactly; nothing was written.
    Unchanged,
}

/// Render `transform` against `vars` and persist the output if it differs
/// from what the target currently holds.
///
/// On render failure the existing target is left untouched. Skipping
/// identical output means a re-render never produces a filesystem event of
/// its own.
pub fn render_and_write(
    fs: &dyn FileSystem,
    renderer: &dyn TemplateRenderer,
    transform: &FileTransform,
    vars: &VariableEnvironment,
) -> Result<WriteOutcome> {
    let output = renderer
        .render(&transform.lookup_name, &transform.search_paths, vars)
        .map_err(|message| RetemplateError::Render {
            template: transform.source.display().to_string(),
            message,
        })?;
    let bytes = output.into_bytes();

    if fs.is_file(&transform.target) {
        if let Ok(existing) = fs.read(&transform.target) {
            if existing == bytes {
                debug!(target_path = ?transform.target, "output unchanged; skipping write");
                return Ok(WriteOutcome::Unchanged);
            }
        }
    }

    fs.write_atomic(&transform.target, &bytes)
        .map_err(|e| RetemplateError::Write {
            path: transform.target.clone(),
            message: format!("{e:#}"),
        })?;
    debug!(target_path = ?transform.target, len = bytes.len(), "wrote rendered output");
    Ok(WriteOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::path::{Path, PathBuf};

    struct Echo;

    impl TemplateRenderer for Echo {
        fn render(
            &self,
            lookup_name: &str,
            _search_paths: &[PathBuf],
            vars: &VariableEnvironment,
        ) -> std::result::Result<String, String> {
            match vars.get("fail") {
                Some(_) => Err("boom".into()),
                None => Ok(format!("{lookup_name}:{}", vars.len())),
            }
        }
    }

    fn transform() -> FileTransform {
        FileTransform {
            source: PathBuf::from("/w/a.njk"),
            target: PathBuf::from("/w/out/a"),
            search_paths: vec![PathBuf::from("/w")],
            lookup_name: "a.njk".into(),
            description: "a.njk -> out/a".into(),
        }
    }

    #[test]
    fn second_identical_render_writes_nothing() {
        let fs = MockFileSystem::new();
        let vars = VariableEnvironment::new();

        assert_eq!(
            render_and_write(&fs, &Echo, &transform(), &vars).unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            render_and_write(&fs, &Echo, &transform(), &vars).unwrap(),
            WriteOutcome::Unchanged
        );
        assert_eq!(fs.writes(), vec![PathBuf::from("/w/out/a")]);
        assert_eq!(fs.contents("/w/out/a").as_deref(), Some("a.njk:0"));
        assert!(fs.is_dir(Path::new("/w/out")));
    }

    #[test]
    fn render_failure_leaves_target_alone() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/out/a", "old");
        let mut vars = VariableEnvironment::new();
        vars.insert("fail".into(), serde_json::Value::Bool(true));

        let err = render_and_write(&fs, &Echo, &transform(), &vars).unwrap_err();
        assert!(matches!(err, RetemplateError::Render { .. }));
        assert_eq!(fs.contents("/w/out/a").as_deref(), Some("old"));
        assert!(fs.writes().is_empty());
    }

    #[test]
    fn writing_over_a_directory_is_a_write_error() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w/out/a");
        let err = render_and_write(&fs, &Echo, &transform(), &VariableEnvironment::new())
            .unwrap_err();
        assert!(matches!(err, RetemplateError::Write { .. }));
    }
}
