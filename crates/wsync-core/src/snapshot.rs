use crate::backend::VcsBackend;
use crate::error::BackendResult;
use crate::model::{FileStatus, RepositorySnapshot};
use crate::paths::UrlConvention;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Latest remote commit id per project, keyed by lowercase project name.
pub type RemoteCommitIndex = Arc<RwLock<HashMap<String, String>>>;

/// Builds [`RepositorySnapshot`]s; cheap to clone into worker threads.
#[derive(Clone)]
pub struct SnapshotBuilder {
    backend: Arc<dyn VcsBackend>,
    convention: UrlConvention,
    default_branch: String,
    remote_commits: RemoteCommitIndex,
}

impl SnapshotBuilder {
    pub fn new(
        backend: Arc<dyn VcsBackend>,
        convention: UrlConvention,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            convention,
            default_branch: default_branch.into(),
            remote_commits: RemoteCommitIndex::default(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn VcsBackend> {
        &self.backend
    }

    pub fn convention(&self) -> &UrlConvention {
        &self.convention
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn remote_commits(&self) -> &RemoteCommitIndex {
        &self.remote_commits
    }

    /// Describes the working directory at `path`. Reads only; callers
    /// decide whether the result enters the catalog.
    pub fn build(
        &self,
        path: &Path,
        directory_name: &str,
        is_submodule: bool,
    ) -> BackendResult<RepositorySnapshot> {
        let backend = self.backend.as_ref();
        backend.open(path)?;

        let current_branch = backend.current_branch(path)?;
        let head_commit_id = backend.resolve_commit(path, "HEAD")?.unwrap_or_default();
        let local_default =
            backend.resolve_commit(path, &format!("refs/heads/{}", self.default_branch))?;
        let upstream_default =
            backend.resolve_commit(path, &format!("refs/remotes/origin/{}", self.default_branch))?;

        let history_head = local_default
            .clone()
            .or_else(|| (!head_commit_id.is_empty()).then(|| head_commit_id.clone()));
        let local_commit_ids: BTreeSet<String> = match history_head.as_deref() {
            Some(head) => backend.commit_history(path, head)?.into_iter().collect(),
            None => BTreeSet::new(),
        };

        let (ahead, behind) = match (local_default.as_deref(), upstream_default.as_deref()) {
            (Some(local), Some(upstream)) => backend.ahead_behind(path, local, upstream)?,
            _ => (0, 0),
        };

        let mut file_statuses = Vec::new();
        let mut ignored = 0usize;
        for entry in backend.status(path, true)? {
            if entry.ignored {
                ignored += 1;
            } else {
                file_statuses.push(entry.file);
            }
        }
        let mut dirty_flag = ignored > 0;

        for name in backend.submodule_names(path)? {
            let info = backend.submodule_info(path, &name)?;
            let nested = match self.build(&path.join(&info.path), &name, true) {
                Ok(nested) => nested,
                Err(err) => {
                    debug!(path = %path.display(), submodule = %name, error = %err, "submodule not materialized");
                    continue;
                }
            };
            dirty_flag |= nested.dirty_flag;
            let is_ahead = info
                .recorded_commit
                .as_deref()
                .is_some_and(|recorded| recorded != nested.head_commit_id)
                && !nested.has_pending_changes();
            annotate_submodule(&mut file_statuses, &info.path, is_ahead, &nested);
        }

        let remote_url = backend.remote_url(path, "origin")?.unwrap_or_default();
        let remote = self.convention.classify(&remote_url);
        let name = self.convention.project_name(&remote_url);
        let last_known_remote_commit_id = if is_submodule || name.is_empty() {
            None
        } else {
            self.remote_commits
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&name.to_lowercase())
                .cloned()
        };

        Ok(RepositorySnapshot {
            directory_name: directory_name.to_string(),
            name,
            current_branch,
            head_commit_id,
            ahead,
            behind,
            file_statuses,
            local_commit_ids,
            remote,
            last_known_remote_commit_id,
            dirty_flag,
            scanned_at: current_timestamp_secs(),
        })
    }

    /// Records the latest remote commit per project for later snapshots.
    pub fn record_remote_commits<I>(&self, commits: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut index = self
            .remote_commits
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        index.clear();
        index.extend(commits.into_iter().map(|(name, id)| (name.to_lowercase(), id)));
    }
}

fn annotate_submodule(
    statuses: &mut Vec<FileStatus>,
    submodule_path: &str,
    is_ahead: bool,
    nested: &RepositorySnapshot,
) {
    let existing = statuses
        .iter_mut()
        .find(|status| status.path.trim_end_matches('/') == submodule_path);
    match existing {
        Some(status) => {
            status.is_submodule = true;
            status.is_ahead_submodule = is_ahead;
        }
        None if is_ahead || nested.has_pending_changes() => statuses.push(FileStatus {
            path: submodule_path.to_string(),
            in_working_tree: true,
            is_modified: true,
            is_submodule: true,
            is_ahead_submodule: is_ahead,
            ..FileStatus::default()
        }),
        None => {}
    }
}

pub(crate) fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SubmoduleInfo;
    use crate::error::BackendError;
    use crate::git_backend::GitBackend;
    use crate::git_backend::tests::{commit_file, init_on_master};
    use crate::testing::{ScriptedBackend, test_convention};
    use tempfile::TempDir;

    fn builder(backend: Arc<dyn VcsBackend>) -> SnapshotBuilder {
        SnapshotBuilder::new(backend, test_convention(), "master")
    }

    #[test]
    fn clean_project_is_named_from_its_remote() {
        let tmp = TempDir::new().unwrap();
        let repo = init_on_master(tmp.path());
        let head = commit_file(&repo, "a.txt", "a", Some("HEAD"));
        repo.remote("origin", "https://git.example.com/platform/Library.Core.git")
            .unwrap();
        repo.reference("refs/remotes/origin/master", head, true, "origin")
            .unwrap();

        let snap = builder(Arc::new(GitBackend::default()))
            .build(tmp.path(), "Library.Core", false)
            .unwrap();
        assert_eq!(snap.name, "Library.Core");
        assert!(snap.is_known_project());
        assert_eq!(snap.current_branch, "master");
        assert_eq!(snap.head_commit_id, head.to_string());
        assert!(snap.contains_commit(&head.to_string()));
        assert_eq!((snap.ahead, snap.behind), (0, 0));
        assert!(snap.file_statuses.is_empty());
        assert!(!snap.dirty_flag);
    }

    #[test]
    fn rescanning_unchanged_directory_is_equal_except_timestamp() {
        let tmp = TempDir::new().unwrap();
        let repo = init_on_master(tmp.path());
        commit_file(&repo, "a.txt", "a", Some("HEAD"));
        repo.remote("origin", "git@git.example.com:platform/Library.Core.git")
            .unwrap();
        std::fs::write(tmp.path().join("b.txt"), "pending").unwrap();

        let builder = builder(Arc::new(GitBackend::default()));
        let mut first = builder.build(tmp.path(), "Library.Core", false).unwrap();
        let mut second = builder.build(tmp.path(), "Library.Core", false).unwrap();
        first.scanned_at = 0;
        second.scanned_at = 0;
        assert_eq!(first, second);
        assert!(first.remote.ssh_url.is_some());
    }

    #[test]
    fn reports_behind_pending_and_cleanable_state() {
        let tmp = TempDir::new().unwrap();
        let repo = init_on_master(tmp.path());
        commit_file(&repo, ".gitignore", "bin/\n", Some("HEAD"));
        let remote_head = commit_file(&repo, "b.txt", "b", Some("refs/remotes/origin/master"));
        repo.remote("origin", "https://git.example.com/platform/Library.Core.git")
            .unwrap();
        std::fs::remove_file(tmp.path().join("b.txt")).unwrap();
        let mut index = repo.index().unwrap();
        index.remove_path(std::path::Path::new("b.txt")).unwrap();
        index.write().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        std::fs::write(tmp.path().join("bin/out.dll"), "x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "y").unwrap();

        let snap = builder(Arc::new(GitBackend::default()))
            .build(tmp.path(), "Library.Core", false)
            .unwrap();
        assert_eq!((snap.ahead, snap.behind), (0, 1));
        assert!(!snap.contains_commit(&remote_head.to_string()));
        assert!(snap.dirty_flag);
        assert_eq!(snap.file_statuses.len(), 1);
        assert_eq!(snap.file_statuses[0].path, "notes.txt");
    }

    #[test]
    fn missing_directory_is_a_backend_error() {
        let tmp = TempDir::new().unwrap();
        let err = builder(Arc::new(GitBackend::default()))
            .build(&tmp.path().join("absent"), "absent", false)
            .unwrap_err();
        assert_eq!(err.operation, "open repository");
    }

    #[test]
    fn remote_commit_index_feeds_last_known_commit() {
        let tmp = TempDir::new().unwrap();
        let repo = init_on_master(tmp.path());
        commit_file(&repo, "a.txt", "a", Some("HEAD"));
        repo.remote("origin", "https://git.example.com/platform/Library.Core.git")
            .unwrap();

        let builder = builder(Arc::new(GitBackend::default()));
        builder.record_remote_commits([("Library.Core".to_string(), "cafe".to_string())]);
        let snap = builder.build(tmp.path(), "Library.Core", false).unwrap();
        assert_eq!(snap.last_known_remote_commit_id.as_deref(), Some("cafe"));
    }

    #[test]
    fn clean_submodule_with_stale_pointer_is_ahead() {
        let tmp = TempDir::new().unwrap();
        let repo = init_on_master(tmp.path());
        commit_file(&repo, "a.txt", "a", Some("HEAD"));
        repo.remote("origin", "https://git.example.com/platform/App.git")
            .unwrap();
        let sub = init_on_master(&tmp.path().join("Shared"));
        commit_file(&sub, "s.txt", "s", Some("HEAD"));

        let scripted = ScriptedBackend::new();
        scripted.set_submodules(tmp.path(), vec![SubmoduleInfo {
            name: "Shared".into(),
            path: "Shared".into(),
            url: Some("git@git.example.com:platform/Shared.git".into()),
            recorded_commit: Some("0000000000000000000000000000000000000001".into()),
        }]);
        let snap = builder(Arc::new(scripted.clone()))
            .build(tmp.path(), "App", false)
            .unwrap();
        let entry = snap
            .file_statuses
            .iter()
            .find(|status| status.is_submodule)
            .unwrap();
        assert_eq!(entry.path.trim_end_matches('/'), "Shared");
        assert!(entry.is_ahead_submodule);

        std::fs::write(tmp.path().join("Shared/dirty.txt"), "d").unwrap();
        let snap = builder(Arc::new(scripted))
            .build(tmp.path(), "App", false)
            .unwrap();
        let entry = snap
            .file_statuses
            .iter()
            .find(|status| status.is_submodule)
            .unwrap();
        assert!(!entry.is_ahead_submodule);
    }

    #[test]
    fn backend_errors_propagate_unchanged() {
        let scripted = ScriptedBackend::new();
        scripted.fail("status", BackendError::new("status", "index corrupt"));
        let tmp = TempDir::new().unwrap();
        let repo = init_on_master(tmp.path());
        commit_file(&repo, "a.txt", "a", Some("HEAD"));

        let err = builder(Arc::new(scripted))
            .build(tmp.path(), "x", false)
            .unwrap_err();
        assert_eq!(err, BackendError::new("status", "index corrupt"));
    }
}
