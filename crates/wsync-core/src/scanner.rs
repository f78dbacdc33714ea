use crate::error::{BackendResult, SyncError, SyncResult};
use crate::model::RepositorySnapshot;
use crate::snapshot::SnapshotBuilder;
use crate::workspace::Engine;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use tracing::{debug, info, warn};

struct ScanItem {
    key: String,
    path: PathBuf,
}

enum ScanEvent {
    Finished {
        key: String,
        outcome: BackendResult<RepositorySnapshot>,
    },
}

impl Engine {
    /// Full-root enumeration: forgets vanished directories, snapshots every
    /// directory in parallel and keeps only the ones that are projects.
    pub fn scan(&self) -> SyncResult<Vec<RepositorySnapshot>> {
        let on_disk = list_directories(self.root())?;
        let forgotten = self.with_catalog(|catalog| {
            catalog.retain_keys(|key| on_disk.iter().any(|name| name == key))
        });
        for key in &forgotten {
            debug!(directory = %key, "directory gone; forgetting");
            self.forget_fingerprint(key);
        }

        let (known, new): (Vec<&String>, Vec<&String>) = self.with_catalog(|catalog| {
            on_disk.iter().partition(|name| catalog.contains(name))
        });
        info!(
            known = known.len(),
            new = new.len(),
            forgotten = forgotten.len(),
            "scanning workspace"
        );

        // Tokens stay held until each key's result is written back, so a
        // mutation cannot land between the build and the replace.
        let mut tokens = HashMap::new();
        let mut items = Vec::new();
        for key in known.into_iter().chain(new) {
            match self.ignore_set().try_guard(key) {
                Ok(token) => {
                    tokens.insert(key.clone(), token);
                    items.push(ScanItem {
                        key: key.clone(),
                        path: self.directory(key),
                    });
                }
                Err(_) => debug!(directory = %key, "guarded; skipped by scan"),
            }
        }

        let results = build_snapshots(self.builder(), items, self.scan_concurrency());

        let mut projects = Vec::new();
        for (key, outcome) in results {
            let token = tokens.remove(&key);
            match outcome {
                Ok(snapshot) if snapshot.is_known_project() => {
                    let stored = self.with_catalog(|catalog| catalog.replace(snapshot));
                    self.record_fingerprint(&key, stored.fingerprint());
                    projects.push(stored);
                }
                Ok(_) => {
                    debug!(directory = %key, "not a project");
                    self.with_catalog(|catalog| catalog.remove(&key));
                    self.forget_fingerprint(&key);
                }
                Err(err) => {
                    warn!(directory = %key, error = %err, "snapshot failed; skipped");
                }
            }
            drop(token);
        }
        self.persist();
        projects.sort_by(|a, b| a.directory_name.cmp(&b.directory_name));
        info!(projects = projects.len(), "scan complete");
        Ok(projects)
    }
}

/// Immediate subdirectories of `root`, hidden ones excluded.
pub fn list_directories(root: &Path) -> SyncResult<Vec<String>> {
    let entries =
        fs::read_dir(root).map_err(|err| SyncError::io("read workspace root", root, err))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SyncError::io("read workspace entry", root, err))?;
        let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dir && !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn build_snapshots(
    builder: &SnapshotBuilder,
    items: Vec<ScanItem>,
    jobs: usize,
) -> Vec<(String, BackendResult<RepositorySnapshot>)> {
    if jobs <= 1 || items.len() <= 1 {
        return items
            .into_iter()
            .map(|item| {
                let outcome = builder.build(&item.path, &item.key, false);
                (item.key, outcome)
            })
            .collect();
    }

    let workers = jobs.min(items.len());
    let queue = Arc::new(Mutex::new(items));
    let (tx, rx) = mpsc::channel::<ScanEvent>();
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let builder = builder.clone();
        std::thread::spawn(move || {
            loop {
                let next = {
                    let mut guard = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard.pop()
                };
                let Some(item) = next else {
                    break;
                };
                let outcome = builder.build(&item.path, &item.key, false);
                let _ = tx.send(ScanEvent::Finished {
                    key: item.key,
                    outcome,
                });
            }
        });
    }
    drop(tx);

    let mut results = Vec::new();
    while let Ok(event) = rx.recv() {
        match event {
            ScanEvent::Finished { key, outcome } => results.push((key, outcome)),
        }
    }
    results
}
