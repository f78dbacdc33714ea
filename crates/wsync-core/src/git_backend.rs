use crate::backend::{MergeOutcome, StatusEntry, SubmoduleInfo, VcsBackend};
use crate::error::{BackendError, BackendResult};
use crate::model::FileStatus;
use git2::{
    Cred, CredentialType, FetchOptions, ObjectType, Oid, RemoteCallbacks, Repository,
    Signature, Status, StatusOptions, SubmoduleUpdateOptions,
    build::{CheckoutBuilder, RepoBuilder},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GitCredentials {
    pub username: String,
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
    #[serde(skip)]
    pub ssh_passphrase: Option<String>,
}

/// [`VcsBackend`] backed by libgit2.
#[derive(Clone, Debug, Default)]
pub struct GitBackend {
    credentials: GitCredentials,
}

impl GitBackend {
    pub fn new(credentials: GitCredentials) -> Self {
        Self { credentials }
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&self.credentials));
        fo
    }
}

fn open_repo(path: &Path) -> BackendResult<Repository> {
    Repository::open(path).map_err(|err| BackendError::from(("open repository", err)))
}

fn git<T>(operation: &'static str, result: Result<T, git2::Error>) -> BackendResult<T> {
    result.map_err(|err| BackendError::from((operation, err)))
}

fn parse_oid(operation: &'static str, id: &str) -> BackendResult<Oid> {
    git(operation, Oid::from_str(id))
}

impl VcsBackend for GitBackend {
    fn open(&self, path: &Path) -> BackendResult<()> {
        open_repo(path).map(|_| ())
    }

    fn clone_repository(&self, url: &str, path: &Path) -> BackendResult<()> {
        info!(path = %path.display(), url, "cloning repository");
        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        git("clone", builder.clone(url, path)).map(|_| ())
    }

    fn fetch(&self, path: &Path, remote: &str) -> BackendResult<()> {
        let repo = open_repo(path)?;
        let mut remote = git("find remote", repo.find_remote(remote))?;
        let mut fo = self.fetch_options();
        debug!(path = %path.display(), "fetching");
        git("fetch", remote.fetch(&[] as &[&str], Some(&mut fo), None))
    }

    fn merge_fast_forward_only(
        &self,
        path: &Path,
        branch: &str,
        upstream: &str,
    ) -> BackendResult<MergeOutcome> {
        let repo = open_repo(path)?;
        fast_forward_branch(&repo, branch, upstream)
    }

    fn checkout_branch(&self, path: &Path, branch: &str) -> BackendResult<()> {
        let repo = open_repo(path)?;
        checkout_local_branch(&repo, branch)
    }

    fn current_branch(&self, path: &Path) -> BackendResult<String> {
        let repo = open_repo(path)?;
        let head = git("read head", repo.head())?;
        if head.is_branch() {
            Ok(head.shorthand().unwrap_or_default().to_string())
        } else {
            Ok("HEAD".to_string())
        }
    }

    fn resolve_commit(&self, path: &Path, reference: &str) -> BackendResult<Option<String>> {
        let repo = open_repo(path)?;
        let object = match repo.revparse_single(reference) {
            Ok(object) => object,
            Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(err) => return Err(BackendError::from(("resolve reference", err))),
        };
        let commit = git("peel to commit", object.peel_to_commit())?;
        Ok(Some(commit.id().to_string()))
    }

    fn reset_hard(&self, path: &Path, paths: &[String]) -> BackendResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let repo = open_repo(path)?;
        let head = git("read head", repo.head())?;
        let target = git("peel head", head.peel(ObjectType::Commit))?;
        git("reset index paths", repo.reset_default(Some(&target), paths.iter().map(String::as_str)))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        for entry in paths {
            checkout.path(entry.as_str());
        }
        git("checkout paths", repo.checkout_head(Some(&mut checkout)))
    }

    fn stage_paths(&self, path: &Path, paths: &[String]) -> BackendResult<()> {
        let repo = open_repo(path)?;
        let mut index = git("read index", repo.index())?;
        for entry in paths {
            git("stage path", index.add_path(Path::new(entry)))?;
        }
        git("write index", index.write())
    }

    fn remove_from_index(&self, path: &Path, paths: &[String]) -> BackendResult<()> {
        let repo = open_repo(path)?;
        let mut index = git("read index", repo.index())?;
        for entry in paths {
            git("remove index path", index.remove_path(Path::new(entry)))?;
        }
        git("write index", index.write())
    }

    fn stash_push(&self, path: &Path) -> BackendResult<()> {
        let mut repo = open_repo(path)?;
        let signature = repo
            .signature()
            .or_else(|_| Signature::now("wsync", "wsync@localhost"));
        let signature = git("stash signature", signature)?;
        git("stash push", repo.stash_save(&signature, "wsync update", None)).map(|_| ())
    }

    fn stash_pop(&self, path: &Path) -> BackendResult<()> {
        let mut repo = open_repo(path)?;
        git("stash pop", repo.stash_pop(0, None))
    }

    fn status(&self, path: &Path, include_ignored: bool) -> BackendResult<Vec<StatusEntry>> {
        let repo = open_repo(path)?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(include_ignored)
            .recurse_ignored_dirs(false);
        let statuses = git("status", repo.statuses(Some(&mut options)))?;
        Ok(statuses
            .iter()
            .filter_map(|entry| {
                let path = entry.path()?.to_string();
                Some(convert_status(path, entry.status()))
            })
            .collect())
    }

    fn ahead_behind(
        &self,
        path: &Path,
        local: &str,
        upstream: &str,
    ) -> BackendResult<(usize, usize)> {
        let repo = open_repo(path)?;
        let local = parse_oid("parse local commit", local)?;
        let upstream = parse_oid("parse upstream commit", upstream)?;
        git("ahead behind", repo.graph_ahead_behind(local, upstream))
    }

    fn commit_history(&self, path: &Path, head: &str) -> BackendResult<Vec<String>> {
        let repo = open_repo(path)?;
        let mut walk = git("start revwalk", repo.revwalk())?;
        git("push revwalk head", walk.push(parse_oid("parse head commit", head)?))?;
        walk.map(|oid| git("walk history", oid).map(|oid| oid.to_string()))
            .collect()
    }

    fn submodule_names(&self, path: &Path) -> BackendResult<Vec<String>> {
        let repo = open_repo(path)?;
        let submodules = git("list submodules", repo.submodules())?;
        Ok(submodules
            .iter()
            .filter_map(|submodule| submodule.name().map(ToString::to_string))
            .collect())
    }

    fn submodule_info(&self, path: &Path, name: &str) -> BackendResult<SubmoduleInfo> {
        let repo = open_repo(path)?;
        let submodule = git("find submodule", repo.find_submodule(name))?;
        Ok(SubmoduleInfo {
            name: name.to_string(),
            path: submodule.path().to_string_lossy().into_owned(),
            url: submodule.url().map(ToString::to_string),
            recorded_commit: submodule.head_id().map(|oid| oid.to_string()),
        })
    }

    fn submodule_set_url(&self, path: &Path, name: &str, url: &str) -> BackendResult<()> {
        let mut repo = open_repo(path)?;
        git("set submodule url", repo.submodule_set_url(name, url))
    }

    fn submodule_sync_update(&self, path: &Path, name: &str) -> BackendResult<()> {
        let repo = open_repo(path)?;
        let mut submodule = git("find submodule", repo.find_submodule(name))?;
        git("sync submodule", submodule.sync())?;
        let mut options = SubmoduleUpdateOptions::new();
        options.fetch(self.fetch_options());
        git("update submodule", submodule.update(true, Some(&mut options)))
    }

    fn remote_url(&self, path: &Path, remote: &str) -> BackendResult<Option<String>> {
        let repo = open_repo(path)?;
        match repo.find_remote(remote) {
            Ok(remote) => Ok(remote.url().map(ToString::to_string)),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) => Err(BackendError::from(("find remote", err))),
        }
    }
}

fn convert_status(path: String, status: Status) -> StatusEntry {
    let file = FileStatus {
        path,
        in_index: status.intersects(
            Status::INDEX_NEW
                | Status::INDEX_MODIFIED
                | Status::INDEX_DELETED
                | Status::INDEX_RENAMED
                | Status::INDEX_TYPECHANGE,
        ),
        in_working_tree: status.intersects(
            Status::WT_NEW
                | Status::WT_MODIFIED
                | Status::WT_DELETED
                | Status::WT_RENAMED
                | Status::WT_TYPECHANGE,
        ),
        is_new: status.intersects(Status::INDEX_NEW | Status::WT_NEW),
        is_modified: status.intersects(Status::INDEX_MODIFIED | Status::WT_MODIFIED),
        is_deleted: status.intersects(Status::INDEX_DELETED | Status::WT_DELETED),
        is_renamed: status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED),
        is_conflicted: status.contains(Status::CONFLICTED),
        is_typechange: status.intersects(Status::INDEX_TYPECHANGE | Status::WT_TYPECHANGE),
        ..FileStatus::default()
    };
    StatusEntry {
        file,
        ignored: status.contains(Status::IGNORED),
    }
}

fn fast_forward_branch(
    repo: &Repository,
    branch: &str,
    upstream: &str,
) -> BackendResult<MergeOutcome> {
    let local_ref = format!("refs/heads/{branch}");
    let remote_oid = git("resolve upstream", repo.refname_to_id(upstream))?;

    let local_oid = match repo.refname_to_id(&local_ref) {
        Ok(oid) => oid,
        Err(_) => {
            warn!(branch, "branch missing locally; creating it at upstream");
            create_local_branch(repo, branch, remote_oid)?;
            return Ok(MergeOutcome::FastForwarded);
        }
    };

    let (ahead, behind) = git(
        "compare local and upstream",
        repo.graph_ahead_behind(local_oid, remote_oid),
    )?;
    if ahead > 0 {
        return Err(BackendError::new(
            "merge fast-forward only",
            format!("{branch} is {ahead} commit(s) ahead of {upstream}; a merge commit would be required"),
        ));
    }
    if behind == 0 {
        return Ok(MergeOutcome::UpToDate);
    }

    if is_head_on(repo, branch) {
        let target = git("find upstream commit", repo.find_object(remote_oid, None))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        git("checkout upstream tree", repo.checkout_tree(&target, Some(&mut checkout)))?;
    }
    let mut reference = git("find local ref", repo.find_reference(&local_ref))?;
    git("fast-forward ref", reference.set_target(remote_oid, "fast-forward")).map(|_| ())?;
    Ok(MergeOutcome::FastForwarded)
}

fn checkout_local_branch(repo: &Repository, branch: &str) -> BackendResult<()> {
    let local_ref = format!("refs/heads/{branch}");
    if repo.find_reference(&local_ref).is_err() {
        let remote_ref = format!("refs/remotes/origin/{branch}");
        let remote_oid = git("resolve remote branch", repo.refname_to_id(&remote_ref))?;
        create_local_branch(repo, branch, remote_oid)?;
    }
    let target = git("resolve branch", repo.revparse_single(&local_ref))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    git("checkout branch", repo.checkout_tree(&target, Some(&mut checkout)))?;
    git("set head", repo.set_head(&local_ref))
}

fn create_local_branch(repo: &Repository, branch: &str, target: Oid) -> BackendResult<()> {
    let commit = git("find commit", repo.find_commit(target))?;
    let mut created = git("create local branch", repo.branch(branch, &commit, false))?;
    if repo.find_reference(&format!("refs/remotes/origin/{branch}")).is_ok()
        && let Err(err) = created.set_upstream(Some(&format!("origin/{branch}")))
    {
        warn!(branch, error = %err.message(), "failed to set upstream for new branch");
    }
    Ok(())
}

fn is_head_on(repo: &Repository, branch: &str) -> bool {
    match repo.head() {
        Ok(head) => head.is_branch() && head.shorthand() == Some(branch),
        Err(_) => false,
    }
}

fn remote_callbacks(credentials: &GitCredentials) -> RemoteCallbacks<'static> {
    let credentials = credentials.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            let username = username_from_url.unwrap_or("git");
            return match credentials.ssh_key.as_deref() {
                Some(key) => {
                    Cred::ssh_key(username, None, key, credentials.ssh_passphrase.as_deref())
                }
                None => Cred::ssh_key_from_agent(username),
            };
        }
        match credentials.token.as_deref() {
            Some(token) if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) => {
                let username = if credentials.username.is_empty() {
                    username_from_url.unwrap_or("oauth2")
                } else {
                    credentials.username.as_str()
                };
                Cred::userpass_plaintext(username, token)
            }
            _ => Cred::default(),
        }
    });
    callbacks
}
