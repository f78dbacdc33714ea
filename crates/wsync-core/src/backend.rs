use crate::error::BackendResult;
use crate::model::FileStatus;
use std::path::Path;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusEntry {
    pub file: FileStatus,
    pub ignored: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubmoduleInfo {
    pub name: String,
    /// Path of the submodule relative to the parent working directory.
    pub path: String,
    pub url: Option<String>,
    /// Commit recorded for the submodule in the parent's HEAD tree.
    pub recorded_commit: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MergeOutcome {
    UpToDate,
    FastForwarded,
}

/// Version-control primitives the engine needs. Every operation is
/// addressed by working-directory path; implementations open the
/// repository per call.
pub trait VcsBackend: Send + Sync {
    fn open(&self, path: &Path) -> BackendResult<()>;
    fn clone_repository(&self, url: &str, path: &Path) -> BackendResult<()>;
    fn fetch(&self, path: &Path, remote: &str) -> BackendResult<()>;
    /// Advances `branch` to `upstream` only when no merge commit is needed.
    fn merge_fast_forward_only(
        &self,
        path: &Path,
        branch: &str,
        upstream: &str,
    ) -> BackendResult<MergeOutcome>;
    fn checkout_branch(&self, path: &Path, branch: &str) -> BackendResult<()>;
    fn current_branch(&self, path: &Path) -> BackendResult<String>;
    /// Commit id a reference or revision resolves to, `None` when missing.
    fn resolve_commit(&self, path: &Path, reference: &str) -> BackendResult<Option<String>>;
    /// Restores the given paths to HEAD in both index and working tree.
    fn reset_hard(&self, path: &Path, paths: &[String]) -> BackendResult<()>;
    fn stage_paths(&self, path: &Path, paths: &[String]) -> BackendResult<()>;
    fn remove_from_index(&self, path: &Path, paths: &[String]) -> BackendResult<()>;
    fn stash_push(&self, path: &Path) -> BackendResult<()>;
    fn stash_pop(&self, path: &Path) -> BackendResult<()>;
    fn status(&self, path: &Path, include_ignored: bool) -> BackendResult<Vec<StatusEntry>>;
    fn ahead_behind(&self, path: &Path, local: &str, upstream: &str)
    -> BackendResult<(usize, usize)>;
    fn commit_history(&self, path: &Path, head: &str) -> BackendResult<Vec<String>>;
    fn submodule_names(&self, path: &Path) -> BackendResult<Vec<String>>;
    fn submodule_info(&self, path: &Path, name: &str) -> BackendResult<SubmoduleInfo>;
    fn submodule_set_url(&self, path: &Path, name: &str, url: &str) -> BackendResult<()>;
    fn submodule_sync_update(&self, path: &Path, name: &str) -> BackendResult<()>;
    fn remote_url(&self, path: &Path, remote: &str) -> BackendResult<Option<String>>;
}
