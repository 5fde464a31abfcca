#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use retemplate::config::{ConfigLocation, ConfigSource, VariableEnvironment};
use retemplate::diagnostics::DiagnosticSink;
use retemplate::fs::FileSystem;
use retemplate::fs::mock::MockFileSystem;
use retemplate::paths::CanonicalPath;
use retemplate::render::TemplateRenderer;
use retemplate::types::WatchMode;
use retemplate::watch::WatchBackend;
use serde_json::Value;

/// Captures every diagnostics line and user notification.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn has_line(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    pub fn has_notice(&self, needle: &str) -> bool {
        self.notices().iter().any(|l| l.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn append(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// One step in the fake renderer's call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Started { call: usize, lookup_name: String },
    Finished { call: usize, lookup_name: String },
}

/// A renderer that reads templates from a [`MockFileSystem`] and replaces
/// `{{ name }}` placeholders with top-level variables.
///
/// Calls can be slowed down and scripted to fail; every start and finish is
/// logged in order.
#[derive(Debug)]
pub struct FakeRenderer {
    fs: MockFileSystem,
    delay: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    events: Mutex<Vec<RenderEvent>>,
    counter: AtomicUsize,
    fail_next: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            delay: Mutex::new(Duration::ZERO),
            failing: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_on(&self, lookup_name: &str) {
        self.failing.lock().unwrap().insert(lookup_name.to_string());
    }

    /// Fail the next `n` calls, whatever they render.
    pub fn fail_next_calls(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn take_scripted_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Lookup names in the order their renders started.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::Started { lookup_name, .. } => Some(lookup_name),
                RenderEvent::Finished { .. } => None,
            })
            .collect()
    }

    fn substitute(text: &str, vars: &VariableEnvironment) -> String {
        let mut out = text.to_string();
        for (key, value) in vars {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{{{ {key} }}}}"), &rendered);
        }
        out
    }
}

impl TemplateRenderer for FakeRenderer {
    fn render(
        &self,
        lookup_name: &str,
        search_paths: &[PathBuf],
        vars: &VariableEnvironment,
    ) -> Result<String, String> {
        let call = self.counter.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(RenderEvent::Started {
            call,
            lookup_name: lookup_name.to_string(),
        });

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let scripted = self.take_scripted_failure();
        let result = if scripted || self.failing.lock().unwrap().contains(lookup_name) {
            Err(format!("scripted failure for {lookup_name}"))
        } else {
            search_paths
                .iter()
                .find_map(|dir| self.fs.read_to_string(&dir.join(lookup_name)).ok())
                .map(|text| Self::substitute(&text, vars))
                .ok_or_else(|| format!("template not found: {lookup_name}"))
        };

        self.events.lock().unwrap().push(RenderEvent::Finished {
            call,
            lookup_name: lookup_name.to_string(),
        });
        result
    }
}

/// Remembers what is currently watched.
#[derive(Debug, Default)]
pub struct RecordingWatchBackend {
    watched: Mutex<Vec<(PathBuf, WatchMode)>>,
    watch_calls: AtomicUsize,
    unwatch_calls: AtomicUsize,
}

impl RecordingWatchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently watched paths, sorted.
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .watched
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn unwatch_calls(&self) -> usize {
        self.unwatch_calls.load(Ordering::SeqCst)
    }
}

impl WatchBackend for RecordingWatchBackend {
    fn watch(&self, path: &Path, mode: WatchMode) -> anyhow::Result<()> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let mut watched = self.watched.lock().unwrap();
        let key = CanonicalPath::new(path);
        watched.retain(|(p, _)| CanonicalPath::new(p) != key);
        watched.push((path.to_path_buf(), mode));
        Ok(())
    }

    fn unwatch(&self, path: &Path) -> anyhow::Result<()> {
        self.unwatch_calls.fetch_add(1, Ordering::SeqCst);
        let key = CanonicalPath::new(path);
        self.watched
            .lock()
            .unwrap()
            .retain(|(p, _)| CanonicalPath::new(p) != key);
        Ok(())
    }
}

/// A config source whose listing can be made to fail or stall.
#[derive(Debug)]
pub struct ScriptedConfigSource {
    locations: Mutex<Vec<ConfigLocation>>,
    roots: Vec<PathBuf>,
    failing: AtomicBool,
    delay: Mutex<Duration>,
    list_calls: AtomicUsize,
}

impl ScriptedConfigSource {
    pub fn new(roots: Vec<PathBuf>, locations: Vec<ConfigLocation>) -> Self {
        Self {
            locations: Mutex::new(locations),
            roots,
            failing: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Current locations, without counting as a listing.
    pub fn list_locations(&self) -> Vec<ConfigLocation> {
        self.locations.lock().unwrap().clone()
    }

    pub fn set_locations(&self, locations: Vec<ConfigLocation>) {
        *self.locations.lock().unwrap() = locations;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl ConfigSource for ScriptedConfigSource {
    fn list(&self) -> anyhow::Result<Vec<ConfigLocation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("scripted listing failure");
        }
        Ok(self.locations.lock().unwrap().clone())
    }

    fn is_config_path(&self, path: &Path) -> bool {
        let key = CanonicalPath::new(path);
        self.locations
            .lock()
            .unwrap()
            .iter()
            .any(|loc| CanonicalPath::new(&loc.path) == key)
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }
}

/// Holds `read_dir` on one directory open until released.
///
/// The listing is taken before the call blocks, so files added while it
/// waits are missing from the result.
#[derive(Debug, Default)]
pub struct ReadDirGate {
    armed: Mutex<GateState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    path: Option<PathBuf>,
    holding: bool,
}

impl ReadDirGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the next listings of `path`.
    pub fn arm(&self, path: impl AsRef<Path>) {
        let mut state = self.armed.lock().unwrap();
        state.path = Some(path.as_ref().to_path_buf());
        state.holding = false;
    }

    /// A caller is currently waiting inside `read_dir`.
    pub fn is_holding(&self) -> bool {
        self.armed.lock().unwrap().holding
    }

    pub fn release(&self) {
        let mut state = self.armed.lock().unwrap();
        state.path = None;
        state.holding = false;
        self.released.notify_all();
    }

    fn pass(&self, path: &Path) {
        let mut state = self.armed.lock().unwrap();
        while state.path.as_deref() == Some(path) {
            state.holding = true;
            state = self.released.wait(state).unwrap();
        }
    }
}

/// A [`MockFileSystem`] whose directory listings go through a
/// [`ReadDirGate`].
#[derive(Debug)]
pub struct GatedFileSystem {
    inner: MockFileSystem,
    gate: Arc<ReadDirGate>,
}

impl GatedFileSystem {
    pub fn new(inner: MockFileSystem, gate: Arc<ReadDirGate>) -> Self {
        Self { inner, gate }
    }
}

impl FileSystem for GatedFileSystem {
    fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn read_to_string(&self, path: &Path) -> anyhow::Result<String> {
        self.inner.read_to_string(path)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        self.inner.write_atomic(path, contents)
    }

    fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let listing = self.inner.read_dir(path);
        self.gate.pass(path);
        listing
    }
}
