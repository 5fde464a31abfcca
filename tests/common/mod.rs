// tests/common/mod.rs

#![allow(dead_code)]

use std::error::Error;

pub use retemplate_test_utils::{
    ConfigDocBuilder, FakeRenderer, Harness, ReadDirGate, RecordingSink, RecordingWatchBackend,
    RenderEvent, ScriptedConfigSource, file_transform, init_tracing, with_timeout,
};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Workspace root used by in-memory tests.
pub const ROOT: &str = "/w";

/// Poll `check` until it holds, giving up after the harness timeout.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    with_timeout(async {
        while !check() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
}
