//! Filesystem change watcher.
//!
//! Raw `notify` events are reduced to directory keys under the root. Each
//! key is either quiet or pending since its latest event; a periodic tick
//! re-snapshots keys that have been pending for a full interval and
//! publishes only snapshots whose fingerprint changed.

use crate::clock::Clock;
use crate::paths::split_under_root;
use crate::workspace::Engine;
use crate::workspace_types::{ProjectStatus, RequestFlags, Response, StatusEvent, StatusKind};
use anyhow::Context;
use notify::{RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-key debounce state: absent means quiet, present means pending since
/// the stored instant.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: HashMap<String, Instant>,
    window: Duration,
}

impl ChangeTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Marks `key` pending as of `now`; later events push the stamp forward.
    pub fn record(&mut self, key: &str, now: Instant) {
        self.pending.insert(key.to_string(), now);
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Keys quiet for at least one window, returned to the quiet state.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        let window = self.window;
        let mut due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, stamp)| now.saturating_duration_since(**stamp) >= window)
            .map(|(key, _)| key.clone())
            .collect();
        due.sort();
        for key in &due {
            self.pending.remove(key);
        }
        due
    }
}

/// Whether a path inside a working directory is worth reacting to.
/// Version-control metadata only counts for the index and remote refs;
/// lock files never count.
pub fn is_relevant_change(inside: &Path) -> bool {
    if inside
        .file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(".lock"))
    {
        return false;
    }
    let mut components = inside.components();
    match components.next() {
        Some(Component::Normal(first)) if first == ".git" => {
            let rest = components.as_path();
            rest == Path::new("index") || rest.starts_with("refs/remotes")
        }
        _ => true,
    }
}

pub struct WorkspaceWatcher {
    engine: Arc<Engine>,
    clock: Arc<dyn Clock>,
    tracker: ChangeTracker,
    interval: Duration,
}

impl WorkspaceWatcher {
    pub fn new(engine: Arc<Engine>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            engine,
            clock,
            tracker: ChangeTracker::new(interval),
            interval,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.tracker.is_pending(key)
    }

    /// Feeds one raw event path through the filters.
    pub fn handle_path(&mut self, path: &Path) {
        let Some((key, inside)) = split_under_root(self.engine.root(), path) else {
            return;
        };
        if !is_relevant_change(&inside) {
            return;
        }
        if self.engine.ignore_set().is_guarded(&key) {
            debug!(directory = %key, path = %path.display(), "event under guard ignored");
            return;
        }
        self.tracker.record(&key, self.clock.now());
    }

    /// Processes every key whose debounce window elapsed and returns the
    /// events it published.
    pub fn tick(&mut self) -> Vec<StatusEvent> {
        let due = self.tracker.due(self.clock.now());
        due.into_iter()
            .filter_map(|key| self.process(&key))
            .collect()
    }

    /// Re-snapshots one due key. The guard is held from the build through
    /// the catalog write so an in-flight mutation can never be overwritten.
    fn process(&mut self, key: &str) -> Option<StatusEvent> {
        let _token = match self.engine.ignore_set().try_guard(key) {
            Ok(token) => token,
            Err(_) => {
                debug!(directory = %key, "mutation in flight; change left to it");
                return None;
            }
        };
        let path = self.engine.directory(key);
        if !path.is_dir() {
            return self.process_deleted(key);
        }

        let snapshot = match self.engine.builder().build(&path, key, false) {
            Ok(snapshot) if snapshot.is_known_project() => snapshot,
            Ok(_) => {
                debug!(directory = %key, "changed directory is not a project");
                return None;
            }
            Err(err) => {
                debug!(directory = %key, error = %err, "changed directory could not be snapshotted");
                return None;
            }
        };

        let (known, stored) = self.engine.with_catalog(|catalog| {
            let known = catalog.contains(key);
            (known, catalog.replace(snapshot))
        });
        if !self.engine.record_fingerprint(key, stored.fingerprint()) {
            debug!(directory = %key, "snapshot unchanged; notification suppressed");
            return None;
        }
        self.engine.persist();
        let kind = if known {
            debug!(directory = %key, "publishing changed snapshot");
            StatusKind::FileEvent
        } else {
            info!(directory = %key, "new project discovered");
            StatusKind::Discovered
        };
        let event = Response::Status(ProjectStatus {
            kind,
            directory_name: key.to_string(),
            snapshot: Some(stored),
            flags: RequestFlags {
                batch: false,
                background: true,
            },
        });
        self.engine.publish(&event);
        Some(event)
    }

    /// Announces a vanished directory only when the catalog still held it;
    /// removals the engine performed itself have already been published.
    fn process_deleted(&mut self, key: &str) -> Option<StatusEvent> {
        self.engine.with_catalog(|catalog| catalog.remove(key))?;
        self.engine.persist();
        info!(directory = %key, "project directory deleted");
        let event = Response::Status(ProjectStatus {
            kind: StatusKind::Deleted,
            directory_name: key.to_string(),
            snapshot: None,
            flags: RequestFlags {
                batch: false,
                background: true,
            },
        });
        self.engine.publish(&event);
        Some(event)
    }

    /// Watches the root until `stop` is set, ticking once per interval.
    pub fn run(mut self, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.send(event);
        })
        .context("create filesystem watcher")?;
        watcher
            .watch(self.engine.root(), RecursiveMode::Recursive)
            .with_context(|| format!("watch {}", self.engine.root().display()))?;
        info!(root = %self.engine.root().display(), "watching workspace");

        let mut last_tick = self.clock.now();
        while !stop.load(Ordering::Relaxed) {
            match rx.recv_timeout(self.interval) {
                Ok(Ok(event)) => {
                    for path in &event.paths {
                        self.handle_path(path);
                    }
                }
                Ok(Err(err)) => warn!(error = %err, "filesystem watcher error"),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            let now = self.clock.now();
            if now.saturating_duration_since(last_tick) >= self.interval {
                self.tick();
                last_tick = now;
            }
        }
        info!("workspace watcher stopped");
        Ok(())
    }
}
