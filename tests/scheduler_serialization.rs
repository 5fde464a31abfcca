// tests/scheduler_serialization.rs

mod common;
use crate::common::{ConfigDocBuilder, Harness, ROOT, RenderEvent, TestResult, with_timeout};

use std::time::Duration;

use retemplate::types::FsEventKind;

fn single_source() -> Harness {
    let h = Harness::new(ROOT);
    h.template("t.njk", "body");
    h.config("site.json", &ConfigDocBuilder::new().file("t.njk", "out.txt"));
    h
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rapid_events_on_one_source_render_one_after_another() -> TestResult {
    let h = single_source();
    h.engine.reload().await;
    h.renderer.set_delay(Duration::from_millis(40));

    let source = h.path("t.njk");
    let scheduler = h.engine.scheduler();
    let first = scheduler
        .on_source_event(&source, FsEventKind::Changed)
        .expect("source is registered");
    let second = scheduler
        .on_source_event(&source, FsEventKind::Changed)
        .expect("source is registered");

    let first = with_timeout(first).await?;
    let second = with_timeout(second).await?;
    assert_eq!(first.written, 1);
    assert_eq!(second.unchanged, 1);

    let name = "t.njk".to_string();
    assert_eq!(
        h.renderer.events(),
        vec![
            RenderEvent::Started { call: 0, lookup_name: name.clone() },
            RenderEvent::Finished { call: 0, lookup_name: name.clone() },
            RenderEvent::Started { call: 1, lookup_name: name.clone() },
            RenderEvent::Finished { call: 1, lookup_name: name },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn a_failed_job_does_not_stall_the_queue() -> TestResult {
    let h = single_source();
    h.engine.reload().await;
    h.renderer.fail_next_calls(1);

    let source = h.path("t.njk");
    let scheduler = h.engine.scheduler();
    let first = scheduler.on_source_event(&source, FsEventKind::Changed);
    let second = scheduler.on_source_event(&source, FsEventKind::Created);

    let first = with_timeout(first.expect("queued")).await?;
    let second = with_timeout(second.expect("queued")).await?;
    assert_eq!(first.failed, 1);
    assert_eq!(second.written, 1);
    assert_eq!(h.fs.contents(h.path("out.txt")).as_deref(), Some("body"));
    Ok(())
}

#[tokio::test]
async fn shared_source_renders_every_transform_in_list_order() -> TestResult {
    let h = Harness::new(ROOT);
    h.template("t.njk", "body");
    h.config(
        "site.json",
        &ConfigDocBuilder::new()
            .file("t.njk", "z-first.txt")
            .file("t.njk", "a-second.txt"),
    );
    h.engine.reload().await;
    assert_eq!(h.source_watcher.watched(), vec![h.path("t.njk")]);

    let done = h
        .engine
        .scheduler()
        .on_source_event(&h.path("t.njk"), FsEventKind::Changed)
        .expect("queued");
    let summary = with_timeout(done).await?;

    assert_eq!(summary.written, 2);
    assert_eq!(
        h.fs.writes(),
        vec![h.path("z-first.txt"), h.path("a-second.txt")]
    );
    Ok(())
}

#[tokio::test]
async fn deletions_and_unknown_sources_queue_nothing() -> TestResult {
    let h = single_source();
    h.engine.reload().await;
    let scheduler = h.engine.scheduler();

    assert!(scheduler
        .on_source_event(&h.path("t.njk"), FsEventKind::Deleted)
        .is_none());
    assert!(scheduler
        .on_source_event(&h.path("other.njk"), FsEventKind::Changed)
        .is_none());
    assert!(scheduler.queues().is_empty());
    Ok(())
}

#[tokio::test]
async fn render_all_without_transforms_says_so() -> TestResult {
    let h = Harness::new(ROOT);
    h.engine.reload().await;

    let summary = h.engine.render_all().await;
    assert_eq!(summary.total(), 0);
    assert!(h.sink.has_notice("no transforms configured"));
    assert_eq!(h.renderer.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn queued_job_keeps_the_variables_it_was_queued_with() -> TestResult {
    let h = Harness::new(ROOT);
    h.template("t.njk", "v={{ v }}");
    h.config(
        "site.json",
        &ConfigDocBuilder::new().var("v", 1).file("t.njk", "out.txt"),
    );
    h.engine.reload().await;
    h.renderer.set_delay(Duration::from_millis(20));

    let done = h
        .engine
        .scheduler()
        .on_source_event(&h.path("t.njk"), FsEventKind::Changed)
        .expect("queued");
    h.config(
        "site.json",
        &ConfigDocBuilder::new().var("v", 2).file("t.njk", "out.txt"),
    );
    h.engine.reload().await;

    with_timeout(done).await?;
    assert_eq!(h.fs.contents(h.path("out.txt")).as_deref(), Some("v=1"));
    Ok(())
}
