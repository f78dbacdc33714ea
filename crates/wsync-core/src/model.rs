use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};

/// One changed path reported by the backend.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub in_index: bool,
    pub in_working_tree: bool,
    pub is_new: bool,
    pub is_modified: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub is_conflicted: bool,
    pub is_typechange: bool,
    #[serde(default)]
    pub is_submodule: bool,
    #[serde(default)]
    pub is_ahead_submodule: bool,
    /// Set by the presentation layer, never by the backend.
    #[serde(default)]
    pub selected: bool,
}

/// Remote urls of a working directory; at most one is normally set.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteUrls {
    pub http_url: Option<String>,
    pub ssh_url: Option<String>,
}

impl RemoteUrls {
    pub fn is_empty(&self) -> bool {
        self.http_url.is_none() && self.ssh_url.is_none()
    }
}

/// Point-in-time description of one working directory.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub directory_name: String,
    pub name: String,
    pub current_branch: String,
    pub head_commit_id: String,
    pub ahead: usize,
    pub behind: usize,
    pub file_statuses: Vec<FileStatus>,
    pub local_commit_ids: BTreeSet<String>,
    pub remote: RemoteUrls,
    #[serde(default)]
    pub last_known_remote_commit_id: Option<String>,
    /// Ignored (cleanable) files exist in the project or its submodules.
    pub dirty_flag: bool,
    #[serde(default)]
    pub scanned_at: u64,
}

impl RepositorySnapshot {
    /// A named project with at least one remote url; everything else is
    /// dropped from the catalog.
    pub fn is_known_project(&self) -> bool {
        !self.name.is_empty() && !self.remote.is_empty()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.file_statuses.is_empty()
    }

    pub fn contains_commit(&self, commit_id: &str) -> bool {
        self.local_commit_ids.contains(commit_id)
    }

    pub fn selected_paths(&self) -> Vec<&str> {
        self.file_statuses
            .iter()
            .filter(|status| status.selected)
            .map(|status| status.path.as_str())
            .collect()
    }

    /// New snapshot with `selected` set exactly on the given paths.
    pub fn with_selection<S: AsRef<str>>(&self, paths: &[S]) -> Self {
        let wanted: HashSet<&str> = paths.iter().map(AsRef::as_ref).collect();
        let mut next = self.clone();
        for status in &mut next.file_statuses {
            status.selected = wanted.contains(status.path.as_str());
        }
        next
    }

    /// Carries `selected` forward from `previous` for every path that is
    /// still changed.
    pub fn merge_selection_from(mut self, previous: &RepositorySnapshot) -> Self {
        let selected: HashSet<&str> = previous.selected_paths().into_iter().collect();
        if selected.is_empty() {
            return self;
        }
        for status in &mut self.file_statuses {
            if selected.contains(status.path.as_str()) {
                status.selected = true;
            }
        }
        self
    }

    /// Hash of the serialized content, ignoring the scan timestamp.
    pub fn fingerprint(&self) -> String {
        let mut normalized = self.clone();
        normalized.scanned_at = 0;
        let data = serde_json::to_vec(&normalized).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&data);
        hex::encode(hasher.finalize())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommit {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    /// Name suffix of the sub-project this commit was folded in from.
    #[serde(default)]
    pub from_subproject: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    pub http_url: String,
    pub ssh_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub last_commit: Option<RemoteCommit>,
}
