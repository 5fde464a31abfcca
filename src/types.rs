use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// How much the diagnostics channel reports.
///
/// - `Silent`: nothing is appended to the diagnostics channel (user warnings
///   still surface).
/// - `Normal`: load summaries, per-transform results, removals and stale
///   sources.
/// - `Verbose`: additionally every skipped write, queue and watcher detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Silent,
    Normal,
    Verbose,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Normal
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "silent" | "off" => Ok(Verbosity::Silent),
            "normal" => Ok(Verbosity::Normal),
            "verbose" => Ok(Verbosity::Verbose),
            other => Err(format!(
                "invalid verbosity: {other} (expected \"silent\", \"normal\" or \"verbose\")"
            )),
        }
    }
}

/// Kind of filesystem notification delivered to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Changed,
    Deleted,
}

/// Whether a watch covers a single directory level or a whole subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    NonRecursive,
    Recursive,
}

impl From<bool> for WatchMode {
    fn from(recursive: bool) -> Self {
        if recursive {
            WatchMode::Recursive
        } else {
            WatchMode::NonRecursive
        }
    }
}
