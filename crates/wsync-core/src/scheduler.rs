use crate::workspace::Engine;
use crate::workspace_types::{RequestFlags, Response};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Condition under which queued background updates may run.
pub trait Gate: Send + Sync {
    fn is_open(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOpen;

impl Gate for AlwaysOpen {
    fn is_open(&self) -> bool {
        true
    }
}

/// Never opens; updates only run on explicit request.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClosedGate;

impl Gate for ClosedGate {
    fn is_open(&self) -> bool {
        false
    }
}

/// Open while the marker file exists. A session lock or idle hook creates
/// and deletes it.
#[derive(Clone, Debug)]
pub struct MarkerFileGate {
    path: PathBuf,
}

impl MarkerFileGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Gate for MarkerFileGate {
    fn is_open(&self) -> bool {
        self.path.exists()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DrainSummary {
    pub updated: usize,
    pub failed: usize,
    /// Items left in the queue because the drain was stopped.
    pub remaining: usize,
}

/// Updates each queued directory in order, waiting (without spinning)
/// whenever the gate is closed. Failures are logged and skipped.
pub fn drain_updates(
    engine: &Engine,
    queue: &[String],
    gate: &dyn Gate,
    poll: Duration,
    stop: &AtomicBool,
) -> DrainSummary {
    let mut summary = DrainSummary::default();
    for (index, key) in queue.iter().enumerate() {
        if !wait_for_gate(gate, poll, stop) {
            summary.remaining = queue.len() - index;
            info!(remaining = summary.remaining, "drain stopped");
            return summary;
        }
        let flags = RequestFlags {
            batch: true,
            background: true,
        };
        match engine.update_project(key, flags) {
            Response::Failed(failure) => {
                warn!(directory = %key, error = %failure.message, "queued update failed");
                summary.failed += 1;
            }
            _ => summary.updated += 1,
        }
    }
    info!(updated = summary.updated, failed = summary.failed, "update queue drained");
    summary
}

fn wait_for_gate(gate: &dyn Gate, poll: Duration, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        if gate.is_open() {
            return true;
        }
        debug!(poll_ms = poll.as_millis() as u64, "gate closed; waiting");
        thread::sleep(poll);
    }
}

pub fn clone_all(engine: &Engine, urls: &[String]) -> Vec<Response> {
    urls.iter()
        .map(|url| engine.clone_project(url, RequestFlags::batch(true)))
        .collect()
}

pub fn retire_all(engine: &Engine, keys: &[String]) -> Vec<Response> {
    keys.iter()
        .map(|key| engine.remove_project(key, RequestFlags::batch(true)))
        .collect()
}
