#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use retemplate::config::{ConfigLocation, Settings, StaticSettings};
use retemplate::engine::{Engine, EngineDeps};
use retemplate::fs::FileSystem;
use retemplate::fs::mock::MockFileSystem;

use crate::builders::ConfigDocBuilder;
use crate::fakes::{
    FakeRenderer, GatedFileSystem, ReadDirGate, RecordingSink, RecordingWatchBackend,
    ScriptedConfigSource,
};

/// An [`Engine`] wired to in-memory collaborators, with handles to all of
/// them.
pub struct Harness {
    pub root: PathBuf,
    pub fs: MockFileSystem,
    pub settings: Arc<StaticSettings>,
    pub configs: Arc<ScriptedConfigSource>,
    pub renderer: Arc<FakeRenderer>,
    pub sink: Arc<RecordingSink>,
    pub source_watcher: Arc<RecordingWatchBackend>,
    pub tree_watcher: Arc<RecordingWatchBackend>,
    pub engine: Arc<Engine>,
}

impl Harness {
    /// Empty workspace at `root` with default settings.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_settings(root, Settings::default())
    }

    pub fn with_settings(root: impl AsRef<Path>, settings: Settings) -> Self {
        Self::build(root.as_ref(), settings, |fs| Arc::new(fs) as Arc<dyn FileSystem>)
    }

    /// Like [`Harness::new`], but the engine lists directories through the
    /// returned gate.
    pub fn gated(root: impl AsRef<Path>) -> (Self, Arc<ReadDirGate>) {
        let gate = Arc::new(ReadDirGate::new());
        let harness = Self::build(root.as_ref(), Settings::default(), |fs| {
            Arc::new(GatedFileSystem::new(fs, gate.clone())) as Arc<dyn FileSystem>
        });
        (harness, gate)
    }

    fn build(
        root: &Path,
        settings: Settings,
        engine_fs: impl FnOnce(MockFileSystem) -> Arc<dyn FileSystem>,
    ) -> Self {
        let root = root.to_path_buf();
        let fs = MockFileSystem::new();
        fs.add_dir(&root);

        let settings = Arc::new(StaticSettings::new(settings));
        let configs = Arc::new(ScriptedConfigSource::new(vec![root.clone()], Vec::new()));
        let renderer = Arc::new(FakeRenderer::new(fs.clone()));
        let sink = Arc::new(RecordingSink::new());
        let source_watcher = Arc::new(RecordingWatchBackend::new());
        let tree_watcher = Arc::new(RecordingWatchBackend::new());

        let engine = Engine::new(EngineDeps {
            fs: engine_fs(fs.clone()),
            settings: settings.clone(),
            configs: configs.clone(),
            renderer: renderer.clone(),
            source_watcher: source_watcher.clone(),
            tree_watcher: tree_watcher.clone(),
            sink: sink.clone(),
        });

        Self {
            root,
            fs,
            settings,
            configs,
            renderer,
            sink,
            source_watcher,
            tree_watcher,
            engine,
        }
    }

    /// Absolute path under the workspace root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Write a template file under the workspace root.
    pub fn template(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path(rel);
        self.fs.add_file(&path, text);
        path
    }

    /// Write a config document under the workspace root and make it
    /// discoverable.
    pub fn config(&self, rel: &str, doc: &ConfigDocBuilder) -> PathBuf {
        self.raw_config(rel, &doc.to_json())
    }

    pub fn raw_config(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path(rel);
        self.fs.add_file(&path, text);

        let mut locations: Vec<ConfigLocation> = self.configs.list_locations();
        if !locations.iter().any(|l| l.path == path) {
            locations.push(ConfigLocation::new(path.clone(), Some(self.root.clone())));
        }
        self.configs.set_locations(locations);
        path
    }
}
