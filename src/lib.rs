// src/lib.rs

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod paths;
pub mod render;
pub mod transform;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::discovery::{ConfigSource, GlobConfigSource};
use crate::config::settings::{SettingsProvider, TomlSettingsFile};
use crate::diagnostics::TerminalSink;
use crate::engine::{Engine, EngineDeps, Runtime, RuntimeEvent, RuntimeOptions, forward_fs_events};
use crate::fs::{FileSystem, RealFileSystem};
use crate::render::MiniJinjaRenderer;
use crate::watch::{NotifyBackend, NullWatchBackend, WatchBackend, WatchOrigin};

/// Settings file looked up in the first workspace root when `--settings`
/// is not given.
pub const SETTINGS_FILE_NAME: &str = "retemplate.toml";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings and config discovery
/// - the engine (controller + scheduler)
/// - the two file watchers (per-source and tree)
/// - the runtime loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let roots = workspace_roots(&args.workspaces)?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let settings_path = match (&args.settings, roots.first()) {
        (Some(path), _) => path.clone(),
        (None, Some(root)) => root.join(SETTINGS_FILE_NAME),
        (None, None) => PathBuf::from(SETTINGS_FILE_NAME),
    };
    let settings: Arc<dyn SettingsProvider> =
        Arc::new(TomlSettingsFile::new(settings_path, args.overrides()));
    let configs: Arc<dyn ConfigSource> = Arc::new(GlobConfigSource::new(
        Arc::clone(&fs),
        roots.clone(),
        &args.config_glob,
    )?);
    info!(?roots, glob = %args.config_glob, "workspace configured");

    if args.dry_run || args.once {
        let engine = Engine::new(EngineDeps {
            fs,
            settings,
            configs,
            renderer: Arc::new(MiniJinjaRenderer::new()),
            source_watcher: Arc::new(NullWatchBackend),
            tree_watcher: Arc::new(NullWatchBackend),
            sink: Arc::new(TerminalSink),
        });
        engine.reload().await;

        if args.dry_run {
            print_dry_run(&engine)?;
            return Ok(());
        }

        let summary = engine.render_all().await;
        if summary.failed > 0 {
            bail!("{} transform(s) failed to render", summary.failed);
        }
        return Ok(());
    }

    // Both watchers feed one channel; events carry their origin.
    let (fs_tx, fs_rx) = mpsc::unbounded_channel();
    let source_watcher: Arc<dyn WatchBackend> =
        Arc::new(NotifyBackend::new(WatchOrigin::Source, fs_tx.clone())?);
    let tree_watcher: Arc<dyn WatchBackend> =
        Arc::new(NotifyBackend::new(WatchOrigin::Tree, fs_tx)?);

    let engine = Engine::new(EngineDeps {
        fs,
        settings,
        configs,
        renderer: Arc::new(MiniJinjaRenderer::new()),
        source_watcher,
        tree_watcher,
        sink: Arc::new(TerminalSink),
    });

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);
    let _forwarder = forward_fs_events(fs_rx, rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let summary = engine.reload().await;
    debug!(?summary, "initial load finished");

    let runtime = Runtime::new(engine, rt_rx, RuntimeOptions::default());
    runtime.run().await?;
    Ok(())
}

/// Absolute workspace roots; the current directory when none were given.
fn workspace_roots(given: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let raw = if given.is_empty() {
        vec![cwd.clone()]
    } else {
        given.to_vec()
    };

    let roots = raw
        .into_iter()
        .map(|p| {
            let abs = if p.is_absolute() { p } else { cwd.join(p) };
            // Canonicalize where possible so watcher paths line up.
            abs.canonicalize()
                .unwrap_or_else(|_| paths::normalize(&abs))
        })
        .collect();
    Ok(paths::dedupe_paths::<Vec<PathBuf>>(roots))
}

/// Dry-run output: resolved transforms and merged variables.
fn print_dry_run(engine: &Engine) -> Result<()> {
    let snapshot = engine.snapshot();
    println!("retemplate dry-run");
    println!();

    println!("transforms ({}):", snapshot.transforms.len());
    for t in snapshot.transforms.iter() {
        println!("  - {t}");
        println!("      source: {}", t.source.display());
        println!("      target: {}", t.target.display());
        println!("      lookup: {}", t.lookup_name);
    }

    let dirs = engine.directory_transforms();
    if !dirs.is_empty() {
        println!();
        println!("directory transforms ({}):", dirs.len());
        for dt in &dirs {
            println!(
                "  - {dt} (recursive: {})",
                if dt.recursive { "yes" } else { "no" }
            );
        }
    }

    println!();
    println!(
        "vars:\n{}",
        serde_json::to_string_pretty(&*snapshot.vars).context("serializing variables")?
    );
    Ok(())
}
