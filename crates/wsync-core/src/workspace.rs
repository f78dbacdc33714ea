use crate::backend::VcsBackend;
use crate::catalog::{Catalog, CatalogStore};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::IgnoreSet;
use crate::model::RepositorySnapshot;
use crate::paths::{UrlConvention, directory_path};
use crate::snapshot::SnapshotBuilder;
use crate::workspace_types::{
    OperationFailure, ProjectStatus, Request, RequestFlags, Response, StatusEvent, StatusKind,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub root: PathBuf,
    pub convention: UrlConvention,
    pub default_branch: String,
    pub scan_concurrency: usize,
    pub catalog_path: Option<PathBuf>,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig, catalog_path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self {
            root: config.require_root()?,
            convention: config.url_convention(),
            default_branch: config.default_branch.clone(),
            scan_concurrency: config.scan_concurrency.max(1),
            catalog_path,
        })
    }
}

/// Owns the catalog of one workspace root and runs every scan, mutation
/// and refresh against it.
pub struct Engine {
    root: PathBuf,
    builder: SnapshotBuilder,
    catalog: Mutex<Catalog>,
    store: CatalogStore,
    ignore: Arc<IgnoreSet>,
    published: Mutex<HashMap<String, String>>,
    subscribers: Mutex<Vec<Sender<StatusEvent>>>,
    scan_concurrency: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Engine {
    pub fn new(options: EngineOptions, backend: Arc<dyn VcsBackend>, clock: Arc<dyn Clock>) -> Self {
        let store = match options.catalog_path {
            Some(path) => CatalogStore::new(path),
            None => CatalogStore::in_memory(),
        };
        let catalog = store.load();
        info!(root = %options.root.display(), projects = catalog.len(), "engine ready");
        Self {
            builder: SnapshotBuilder::new(backend, options.convention, options.default_branch),
            root: options.root,
            catalog: Mutex::new(catalog),
            store,
            ignore: IgnoreSet::new(clock),
            published: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            scan_concurrency: options.scan_concurrency.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn builder(&self) -> &SnapshotBuilder {
        &self.builder
    }

    pub(crate) fn backend(&self) -> &dyn VcsBackend {
        self.builder.backend().as_ref()
    }

    pub fn ignore_set(&self) -> &Arc<IgnoreSet> {
        &self.ignore
    }

    pub fn default_branch(&self) -> &str {
        self.builder.default_branch()
    }

    pub(crate) fn scan_concurrency(&self) -> usize {
        self.scan_concurrency
    }

    pub fn catalog(&self) -> Catalog {
        lock(&self.catalog).clone()
    }

    pub fn snapshot(&self, key: &str) -> Option<RepositorySnapshot> {
        lock(&self.catalog).get(key).cloned()
    }

    pub(crate) fn directory(&self, key: &str) -> PathBuf {
        directory_path(&self.root, key)
    }

    pub(crate) fn with_catalog<R>(&self, f: impl FnOnce(&mut Catalog) -> R) -> R {
        f(&mut lock(&self.catalog))
    }

    pub(crate) fn persist(&self) {
        let catalog = self.catalog();
        self.store.persist(&catalog);
    }

    pub fn subscribe(&self) -> Receiver<StatusEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Sends `event` to every live subscriber and remembers the fingerprint
    /// of the snapshot it carries.
    pub(crate) fn publish(&self, event: &StatusEvent) {
        if let Some(key) = event.directory_name() {
            let mut published = lock(&self.published);
            match event.snapshot() {
                Some(snapshot) => {
                    published.insert(key.to_string(), snapshot.fingerprint());
                }
                None => {
                    published.remove(key);
                }
            }
        }
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Records `fingerprint` as the last one published for `key`. Returns
    /// false when it equals the previous one.
    pub(crate) fn record_fingerprint(&self, key: &str, fingerprint: String) -> bool {
        let mut published = lock(&self.published);
        if published.get(key) == Some(&fingerprint) {
            return false;
        }
        published.insert(key.to_string(), fingerprint);
        true
    }

    pub(crate) fn forget_fingerprint(&self, key: &str) {
        lock(&self.published).remove(key);
    }

    /// Re-derives the catalog entry for `key` from disk: replaced when the
    /// directory is still a project, removed otherwise. Persists.
    pub(crate) fn settle(&self, key: &str) -> Option<RepositorySnapshot> {
        let path = self.directory(key);
        let outcome = if path.is_dir() {
            match self.builder.build(&path, key, false) {
                Ok(snapshot) if snapshot.is_known_project() => Some(snapshot),
                Ok(_) => {
                    debug!(directory = %key, "not a project; dropping from catalog");
                    None
                }
                Err(err) => {
                    warn!(directory = %key, error = %err, "snapshot failed; dropping from catalog");
                    None
                }
            }
        } else {
            None
        };
        let stored = self.with_catalog(|catalog| match outcome {
            Some(snapshot) => Some(catalog.replace(snapshot)),
            None => {
                catalog.remove(key);
                None
            }
        });
        self.persist();
        stored
    }

    /// Guard, run `op`, release, settle, publish.
    pub(crate) fn run_guarded<F>(
        &self,
        kind: StatusKind,
        key: &str,
        flags: RequestFlags,
        op: F,
    ) -> Response
    where
        F: FnOnce(&Path) -> SyncResult<()>,
    {
        let outcome = match self.ignore.try_guard(key) {
            Ok(token) => {
                let path = self.directory(key);
                let outcome = op(&path);
                drop(token);
                outcome
            }
            Err(busy) => {
                let response = Response::Failed(OperationFailure::new(
                    kind,
                    key,
                    &busy,
                    self.snapshot(key),
                    flags,
                ));
                self.publish(&response);
                return response;
            }
        };
        let snapshot = self.settle(key);
        let response = match outcome {
            Ok(()) => Response::Status(ProjectStatus {
                kind,
                directory_name: key.to_string(),
                snapshot,
                flags,
            }),
            Err(err) => {
                warn!(directory = %key, kind = ?kind, error = %err, "operation failed");
                Response::Failed(OperationFailure::new(kind, key, &err, snapshot, flags))
            }
        };
        self.publish(&response);
        response
    }

    pub(crate) fn fail(
        &self,
        kind: StatusKind,
        key: &str,
        err: &SyncError,
        flags: RequestFlags,
    ) -> Response {
        warn!(directory = %key, kind = ?kind, error = %err, "request rejected");
        let response =
            Response::Failed(OperationFailure::new(kind, key, err, self.snapshot(key), flags));
        self.publish(&response);
        response
    }

    pub fn handle(&self, request: Request) -> Response {
        debug!(request = ?request, "handling request");
        match request {
            Request::RefreshAll => match self.scan() {
                Ok(projects) => Response::Catalog { projects },
                Err(err) => self.fail(
                    StatusKind::None,
                    &self.root.display().to_string(),
                    &err,
                    RequestFlags::default(),
                ),
            },
            Request::Status { directory } => self.refresh(&directory),
            Request::Select { directory, paths } => match self.select_paths(&directory, &paths) {
                Ok(snapshot) => {
                    let response = Response::Status(ProjectStatus {
                        kind: StatusKind::None,
                        directory_name: directory,
                        snapshot: Some(snapshot),
                        flags: RequestFlags::default(),
                    });
                    self.publish(&response);
                    response
                }
                Err(err) => self.fail(StatusKind::None, &directory, &err, RequestFlags::default()),
            },
            Request::Clone { url, all } => self.clone_project(&url, RequestFlags::batch(all)),
            Request::Update {
                directory,
                all,
                background,
            } => self.update_project(&directory, RequestFlags { batch: all, background }),
            Request::CheckoutDefault { directory } => self.checkout_default(&directory),
            Request::Discard { directory, paths } => self.discard_selected(&directory, &paths),
            Request::DeleteUntracked { directory } => self.delete_untracked(&directory),
            Request::Clean { directory } => self.clean_ignored(&directory),
            Request::Remove { directory, all } => {
                self.remove_project(&directory, RequestFlags::batch(all))
            }
        }
    }

    /// Re-snapshots one directory under a short-lived guard and publishes it.
    pub fn refresh(&self, key: &str) -> Response {
        let token = match self.ignore.try_guard(key) {
            Ok(token) => token,
            Err(busy) => return self.fail(StatusKind::None, key, &busy, RequestFlags::default()),
        };
        let snapshot = self.settle(key);
        drop(token);
        let response = match snapshot {
            Some(_) => Response::Status(ProjectStatus {
                kind: StatusKind::None,
                directory_name: key.to_string(),
                snapshot,
                flags: RequestFlags::default(),
            }),
            None => Response::Failed(OperationFailure::new(
                StatusKind::None,
                key,
                &SyncError::NotAProject {
                    directory: key.to_string(),
                },
                None,
                RequestFlags::default(),
            )),
        };
        self.publish(&response);
        response
    }

    /// Replaces the catalog entry with one whose selection is exactly `paths`.
    pub fn select_paths<S: AsRef<str>>(
        &self,
        key: &str,
        paths: &[S],
    ) -> SyncResult<RepositorySnapshot> {
        let selected = self.with_catalog(|catalog| {
            let current = catalog.get(key)?;
            let next = current.with_selection(paths);
            catalog.replace_exact(next.clone());
            Some(next)
        });
        let selected = selected.ok_or_else(|| SyncError::NotAProject {
            directory: key.to_string(),
        })?;
        self.persist();
        Ok(selected)
    }
}
