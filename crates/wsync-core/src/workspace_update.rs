use crate::backend::{MergeOutcome, VcsBackend};
use crate::error::{BackendError, SyncError, SyncResult};
use crate::paths::UrlConvention;
use crate::workspace::Engine;
use crate::workspace_mutations::materialize_submodules;
use crate::workspace_types::{RequestFlags, Response, StatusKind};
use std::path::Path;
use tracing::{debug, error, info, warn};

enum Stash {
    None,
    Pushed,
    /// Stash push failed and unstaged changes were hard reset instead.
    Recovered(BackendError),
}

impl Engine {
    /// Fast-forwards the default branch to its upstream, parking pending
    /// changes in a stash for the duration.
    pub fn update_project(&self, key: &str, flags: RequestFlags) -> Response {
        let backend = self.backend();
        let convention = self.builder().convention();
        let default_branch = self.default_branch().to_string();
        self.run_guarded(StatusKind::Updating, key, flags, |path| {
            update_directory(backend, convention, path, key, &default_branch)
        })
    }
}

fn update_directory(
    backend: &dyn VcsBackend,
    convention: &UrlConvention,
    path: &Path,
    key: &str,
    default_branch: &str,
) -> SyncResult<()> {
    let original_branch = backend.current_branch(path)?;
    let stash = park_changes(backend, path, key)?;

    let advanced = advance_default_branch(backend, convention, path, &original_branch, default_branch);

    let mut restore_error = None;
    if original_branch != default_branch && original_branch != "HEAD" {
        if let Err(err) = backend.checkout_branch(path, &original_branch) {
            warn!(directory = %key, branch = %original_branch, error = %err, "failed to restore original branch");
            restore_error = Some(err);
        }
    } else if original_branch == "HEAD" {
        warn!(directory = %key, "detached head left on default branch after update");
    }
    if matches!(stash, Stash::Pushed)
        && let Err(err) = backend.stash_pop(path)
    {
        error!(directory = %key, error = %err, "stash pop failed; changes remain in the stash");
        restore_error.get_or_insert(err);
    }

    let outcome = advanced?;
    if let Some(err) = restore_error {
        return Err(err.into());
    }
    match outcome {
        MergeOutcome::UpToDate => debug!(directory = %key, "already up to date"),
        MergeOutcome::FastForwarded => info!(directory = %key, "fast-forwarded"),
    }
    if let Stash::Recovered(source) = stash {
        return Err(SyncError::StashRecovery {
            directory: key.to_string(),
            source,
        });
    }
    Ok(())
}

fn park_changes(backend: &dyn VcsBackend, path: &Path, key: &str) -> SyncResult<Stash> {
    let statuses: Vec<_> = backend
        .status(path, false)?
        .into_iter()
        .map(|entry| entry.file)
        .filter(|file| !file.is_submodule)
        .collect();
    if statuses.is_empty() {
        return Ok(Stash::None);
    }
    let new_paths: Vec<String> = statuses
        .iter()
        .filter(|file| file.is_new && !file.in_index && !file.path.ends_with('/'))
        .map(|file| file.path.clone())
        .collect();
    let staged = if new_paths.is_empty() {
        Ok(false)
    } else {
        backend.stage_paths(path, &new_paths).map(|()| true)
    };
    let pushed = match staged {
        Ok(staged) => backend.stash_push(path).map_err(|err| (err, staged)),
        Err(err) => Err((err, false)),
    };
    match pushed {
        Ok(()) => {
            debug!(directory = %key, changes = statuses.len(), "pending changes stashed");
            Ok(Stash::Pushed)
        }
        Err((err, staged)) => {
            // New files were only staged to ride along in the stash.
            if staged && let Err(unstage) = backend.remove_from_index(path, &new_paths) {
                warn!(directory = %key, error = %unstage, "failed to unstage new files after stash failure");
            }
            let unstaged: Vec<String> = statuses
                .iter()
                .filter(|file| !file.in_index && !file.is_new)
                .map(|file| file.path.clone())
                .collect();
            error!(
                directory = %key,
                error = %err,
                reset = unstaged.len(),
                "stash failed; hard resetting unstaged changes (uncommitted work is lost)"
            );
            backend.reset_hard(path, &unstaged)?;
            Ok(Stash::Recovered(err))
        }
    }
}

fn advance_default_branch(
    backend: &dyn VcsBackend,
    convention: &UrlConvention,
    path: &Path,
    original_branch: &str,
    default_branch: &str,
) -> SyncResult<MergeOutcome> {
    if original_branch != default_branch {
        backend.checkout_branch(path, default_branch)?;
    }
    backend.fetch(path, "origin")?;
    let upstream = format!("refs/remotes/origin/{default_branch}");
    let outcome = backend.merge_fast_forward_only(path, default_branch, &upstream)?;
    materialize_submodules(backend, convention, path, true)?;
    Ok(outcome)
}
