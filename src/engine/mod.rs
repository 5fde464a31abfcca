// src/engine/mod.rs

//! Orchestration engine for retemplate.
//!
//! This module ties together:
//! - the reload / re-expansion controller ([`controller`])
//! - the render scheduler and its immutable snapshots ([`scheduler`],
//!   [`snapshot`])
//! - per-source FIFO queues with stale-entry reaping ([`queue`])
//! - collapsing of concurrent reloads and rescans ([`single_flight`])
//! - the main runtime event loop that reacts to:
//!   - source and tree filesystem events
//!   - reload and render-all requests
//!   - shutdown signals

pub mod controller;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod single_flight;
pub mod snapshot;

pub use controller::{Engine, EngineDeps, ReloadSummary};
pub use queue::{REAP_INTERVAL, STALE_TIMEOUT, SourceQueues};
pub use runtime::{Runtime, RuntimeEvent, RuntimeOptions, forward_fs_events};
pub use scheduler::{RenderScheduler, RenderSummary};
pub use single_flight::SingleFlight;
pub use snapshot::{Snapshot, WatchRegistration};
