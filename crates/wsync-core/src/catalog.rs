use crate::model::RepositorySnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CATALOG_VERSION: u32 = 1;

/// All locally known projects keyed by directory name. Entries are only
/// ever replaced whole.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    entries: BTreeMap<String, RepositorySnapshot>,
}

impl Catalog {
    pub fn get(&self, key: &str) -> Option<&RepositorySnapshot> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &RepositorySnapshot> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the entry for the snapshot's key, carrying selection flags
    /// forward from the entry it replaces. Returns the stored snapshot.
    pub fn replace(&mut self, snapshot: RepositorySnapshot) -> RepositorySnapshot {
        let key = snapshot.directory_name.clone();
        let merged = match self.entries.get(&key) {
            Some(previous) => snapshot.merge_selection_from(previous),
            None => snapshot,
        };
        self.entries.insert(key, merged.clone());
        merged
    }

    /// Replaces the entry verbatim, selection included.
    pub fn replace_exact(&mut self, snapshot: RepositorySnapshot) {
        self.entries
            .insert(snapshot.directory_name.clone(), snapshot);
    }

    pub fn remove(&mut self, key: &str) -> Option<RepositorySnapshot> {
        self.entries.remove(key)
    }

    pub fn retain_keys(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|key, _| {
            let kept = keep(key);
            if !kept {
                removed.push(key.clone());
            }
            kept
        });
        removed
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    #[serde(default)]
    projects: BTreeMap<String, RepositorySnapshot>,
}

/// Durable copy of the catalog. The file is a cache: anything unreadable
/// loads as an empty catalog and write failures are only logged.
#[derive(Clone, Debug)]
pub struct CatalogStore {
    path: Option<PathBuf>,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Catalog {
        let Some(path) = self.path.as_deref() else {
            return Catalog::default();
        };
        match read_catalog(path) {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "catalog unreadable; starting empty");
                Catalog::default()
            }
        }
    }

    pub fn persist(&self, catalog: &Catalog) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        match write_catalog(path, catalog) {
            Ok(()) => debug!(path = %path.display(), projects = catalog.len(), "catalog persisted"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to persist catalog"),
        }
    }
}

fn read_catalog(path: &Path) -> anyhow::Result<Catalog> {
    if !path.exists() {
        return Ok(Catalog::default());
    }
    let data = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&data)?;
    match json.get("version").and_then(|value| value.as_u64()) {
        Some(1) => {
            let file: CatalogFile = serde_json::from_value(json)?;
            Ok(Catalog {
                entries: file.projects,
            })
        }
        other => anyhow::bail!("unsupported catalog version {other:?}"),
    }
}

fn write_catalog(path: &Path, catalog: &Catalog) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = CatalogFile {
        version: CATALOG_VERSION,
        projects: catalog.entries.clone(),
    };
    let data = serde_json::to_string_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
