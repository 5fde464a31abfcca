// tests/runtime_events.rs

mod common;
use crate::common::{ConfigDocBuilder, Harness, ROOT, TestResult, eventually, init_tracing, with_timeout};

use std::time::Duration;

use tokio::sync::mpsc;

use retemplate::engine::{Runtime, RuntimeEvent, RuntimeOptions, forward_fs_events};
use retemplate::paths::CanonicalPath;
use retemplate::types::FsEventKind;
use retemplate::watch::{FsEvent, WatchOrigin};

fn workspace() -> Harness {
    let h = Harness::new(ROOT);
    h.template("t.njk", "hello {{ who }}");
    h.config(
        "site.json",
        &ConfigDocBuilder::new()
            .var("who", "world")
            .file("t.njk", "out.txt"),
    );
    h
}

#[tokio::test]
async fn source_event_through_the_runtime_renders() -> TestResult {
    init_tracing();
    let h = workspace();
    h.engine.reload().await;

    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(h.engine.clone(), rx, RuntimeOptions::default());
    let handle = tokio::spawn(runtime.run());

    tx.send(RuntimeEvent::Fs(FsEvent::new(
        h.path("t.njk"),
        FsEventKind::Changed,
        WatchOrigin::Source,
    )))
    .await?;
    let out = h.path("out.txt");
    eventually(|| h.fs.contents(&out).is_some()).await;
    assert_eq!(h.fs.contents(&out).as_deref(), Some("hello world"));

    tx.send(RuntimeEvent::ShutdownRequested).await?;
    with_timeout(handle).await??;
    Ok(())
}

#[tokio::test]
async fn source_events_are_queued_before_the_next_event_is_read() -> TestResult {
    let h = workspace();
    h.engine.reload().await;

    let (tx, rx) = mpsc::channel(16);
    for kind in [FsEventKind::Changed, FsEventKind::Created] {
        tx.send(RuntimeEvent::Fs(FsEvent::new(
            h.path("t.njk"),
            kind,
            WatchOrigin::Source,
        )))
        .await?;
    }
    tx.send(RuntimeEvent::ShutdownRequested).await?;

    // Driven on this task: nothing else gets to run before `run` returns.
    Runtime::new(h.engine.clone(), rx, RuntimeOptions::default())
        .run()
        .await?;
    let key = CanonicalPath::new(&h.path("t.njk"));
    assert!(h.engine.scheduler().queues().contains(&key));

    eventually(|| h.renderer.calls() == 2).await;
    assert_eq!(h.fs.contents(h.path("out.txt")).as_deref(), Some("hello world"));
    Ok(())
}

#[tokio::test]
async fn reload_and_render_all_requests() -> TestResult {
    let h = workspace();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(Runtime::new(h.engine.clone(), rx, RuntimeOptions::default()).run());

    tx.send(RuntimeEvent::ReloadRequested).await?;
    eventually(|| h.engine.snapshot().transforms.len() == 1).await;

    tx.send(RuntimeEvent::RenderAllRequested).await?;
    eventually(|| h.sink.has_notice("rendered 1 transform(s)")).await;
    assert_eq!(h.fs.contents(h.path("out.txt")).as_deref(), Some("hello world"));

    drop(tx);
    // Closing every sender ends the loop too.
    with_timeout(handle).await??;
    Ok(())
}

#[tokio::test]
async fn idle_queues_are_reaped() -> TestResult {
    let h = workspace();
    h.engine.reload().await;

    let (tx, rx) = mpsc::channel(16);
    let options = RuntimeOptions {
        reap_interval: Duration::from_millis(20),
        stale_timeout: Duration::from_millis(10),
    };
    let handle = tokio::spawn(Runtime::new(h.engine.clone(), rx, options).run());

    let done = h
        .engine
        .scheduler()
        .on_source_event(&h.path("t.njk"), FsEventKind::Changed)
        .expect("queued");
    with_timeout(done).await?;
    assert_eq!(h.engine.scheduler().queues().len(), 1);

    eventually(|| h.engine.scheduler().queues().is_empty()).await;

    // A forgotten source still renders on its next event.
    h.fs.add_file(h.path("t.njk"), "bye {{ who }}");
    let done = h
        .engine
        .scheduler()
        .on_source_event(&h.path("t.njk"), FsEventKind::Changed)
        .expect("queued");
    let summary = with_timeout(done).await?;
    assert_eq!(summary.written, 1);

    tx.send(RuntimeEvent::ShutdownRequested).await?;
    with_timeout(handle).await??;
    Ok(())
}

#[tokio::test]
async fn watcher_events_are_forwarded() -> TestResult {
    let (fs_tx, fs_rx) = mpsc::unbounded_channel();
    let (rt_tx, mut rt_rx) = mpsc::channel(4);
    let forwarder = forward_fs_events(fs_rx, rt_tx);

    fs_tx.send(FsEvent::new("/w/x", FsEventKind::Created, WatchOrigin::Tree))?;
    let got = with_timeout(rt_rx.recv()).await;
    assert!(matches!(
        got,
        Some(RuntimeEvent::Fs(FsEvent { kind: FsEventKind::Created, origin: WatchOrigin::Tree, .. }))
    ));

    drop(fs_tx);
    with_timeout(forwarder).await?;
    Ok(())
}
