// tests/reconfiguration.rs

mod common;
use crate::common::{
    ConfigDocBuilder, Harness, ROOT, ReadDirGate, TestResult, eventually, with_timeout,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use retemplate::types::FsEventKind;
use retemplate::watch::{FsEvent, WatchOrigin};

fn targets(h: &Harness) -> Vec<PathBuf> {
    h.engine
        .snapshot()
        .transforms
        .iter()
        .map(|t| t.target.clone())
        .collect()
}

fn directory_workspace() -> (Harness, Arc<ReadDirGate>) {
    let (h, gate) = Harness::gated(ROOT);
    h.template("templates/a.njk", "A");
    h.config(
        "site.json",
        &ConfigDocBuilder::new().directory("templates", "out", false),
    );
    (h, gate)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_during_a_rescan_has_the_last_word() -> TestResult {
    let (h, gate) = directory_workspace();
    h.engine.reload().await;
    assert_eq!(targets(&h), vec![h.path("out/a")]);

    h.config("site.json", &ConfigDocBuilder::new());
    gate.arm(h.path("templates"));
    let rescan = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.rescan_directories().await }
    });
    eventually(|| gate.is_holding()).await;

    let reload = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.reload().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.release();

    with_timeout(rescan).await?;
    let summary = with_timeout(reload).await?;
    assert_eq!(summary.active, 0);
    assert!(h.engine.directory_transforms().is_empty());
    assert!(targets(&h).is_empty());
    assert!(h.source_watcher.watched().is_empty());
    Ok(())
}

// Single-threaded on purpose: the template update has to wait for the
// reload without holding the only worker.
#[tokio::test]
async fn template_created_while_a_reload_scans_stays_active() -> TestResult {
    let (h, gate) = directory_workspace();
    h.engine.reload().await;

    gate.arm(h.path("templates"));
    let reload = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.reload().await }
    });
    eventually(|| gate.is_holding()).await;

    let created = h.template("templates/new.njk", "N");
    let event = tokio::spawn({
        let engine = h.engine.clone();
        let event = FsEvent::new(&created, FsEventKind::Created, WatchOrigin::Tree);
        async move { engine.handle_event(event).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.release();

    let summary = with_timeout(reload).await?;
    assert_eq!(summary.active, 1);
    with_timeout(event).await?;

    assert_eq!(targets(&h), vec![h.path("out/a"), h.path("out/new")]);
    let out = h.path("out/new");
    eventually(|| h.fs.contents(&out).is_some()).await;
    assert_eq!(h.fs.contents(&out).as_deref(), Some("N"));
    Ok(())
}

#[tokio::test]
async fn template_deleted_while_a_rescan_scans_stays_removed() -> TestResult {
    let (h, gate) = directory_workspace();
    h.template("templates/b.njk", "B");
    h.engine.reload().await;
    assert_eq!(targets(&h).len(), 2);

    gate.arm(h.path("templates"));
    let rescan = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.rescan_directories().await }
    });
    eventually(|| gate.is_holding()).await;

    // The rescan listed b.njk before it went away.
    let gone = h.path("templates/b.njk");
    h.fs.remove_file(&gone);
    let event = tokio::spawn({
        let engine = h.engine.clone();
        let event = FsEvent::new(&gone, FsEventKind::Deleted, WatchOrigin::Tree);
        async move { engine.handle_event(event).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.release();

    with_timeout(rescan).await?;
    with_timeout(event).await?;
    assert_eq!(targets(&h), vec![h.path("out/a")]);
    Ok(())
}
