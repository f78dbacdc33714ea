use crate::backend::VcsBackend;
use crate::error::{SyncError, SyncResult};
use crate::model::FileStatus;
use crate::paths::{UrlConvention, directory_name_for_project};
use crate::workspace::Engine;
use crate::workspace_types::{RequestFlags, Response, StatusKind};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

impl Engine {
    /// Clones `url` into the directory named after its project. A failed
    /// clone leaves no directory behind and answers with no snapshot.
    pub fn clone_project(&self, url: &str, flags: RequestFlags) -> Response {
        let name = self.builder().convention().project_name(url);
        if name.is_empty() {
            let err = SyncError::NotAProject {
                directory: url.to_string(),
            };
            return self.fail(StatusKind::Cloning, url, &err, flags);
        }
        let key = directory_name_for_project(&name);
        let backend = self.backend();
        let convention = self.builder().convention();
        self.run_guarded(StatusKind::Cloning, &key, flags, |path| {
            if path.exists() {
                return Err(SyncError::io(
                    "clone destination exists",
                    path,
                    io::Error::from(io::ErrorKind::AlreadyExists),
                ));
            }
            let cloned = clone_into(backend, convention, url, path);
            if cloned.is_err() {
                remove_partial_clone(path);
            }
            cloned
        })
    }

    pub fn checkout_default(&self, key: &str) -> Response {
        let backend = self.backend();
        let branch = self.default_branch().to_string();
        self.run_guarded(StatusKind::None, key, RequestFlags::default(), |path| {
            backend.checkout_branch(path, &branch)?;
            Ok(())
        })
    }

    /// Discards the changes selected in the catalog entry. Explicit `paths`
    /// become the selection first.
    pub fn discard_selected(&self, key: &str, paths: &[String]) -> Response {
        let flags = RequestFlags::default();
        if !paths.is_empty()
            && let Err(err) = self.select_paths(key, paths)
        {
            return self.fail(StatusKind::None, key, &err, flags);
        }
        let Some(current) = self.snapshot(key) else {
            let err = SyncError::NotAProject {
                directory: key.to_string(),
            };
            return self.fail(StatusKind::None, key, &err, flags);
        };
        let selected: Vec<FileStatus> = current
            .file_statuses
            .into_iter()
            .filter(|status| status.selected)
            .collect();
        let backend = self.backend();
        self.run_guarded(StatusKind::None, key, flags, |path| {
            discard_statuses(backend, path, &selected)
        })
    }

    /// Deletes every untracked path from disk.
    pub fn delete_untracked(&self, key: &str) -> Response {
        let backend = self.backend();
        self.run_guarded(StatusKind::None, key, RequestFlags::default(), |path| {
            let untracked: Vec<FileStatus> = backend
                .status(path, false)?
                .into_iter()
                .map(|entry| entry.file)
                .filter(|file| file.is_new && !file.in_index && !file.is_submodule)
                .collect();
            for file in &untracked {
                delete_path(path, &file.path)?;
            }
            Ok(())
        })
    }

    pub fn clean_ignored(&self, key: &str) -> Response {
        let backend = self.backend();
        self.run_guarded(StatusKind::Cleaning, key, RequestFlags::default(), |path| {
            clean_directory(backend, path)
        })
    }

    /// Deletes the working directory. Deletion failures are logged only.
    pub fn remove_project(&self, key: &str, flags: RequestFlags) -> Response {
        self.run_guarded(StatusKind::Removing, key, flags, |path| {
            match fs::remove_dir_all(path) {
                Ok(()) => info!(path = %path.display(), "removed working directory"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    error!(path = %path.display(), error = %err, "failed to remove working directory")
                }
            }
            Ok(())
        })
    }
}

/// Clone plus the steps that make the new working directory usable. Any
/// error leaves `path` for the caller to remove.
fn clone_into(
    backend: &dyn VcsBackend,
    convention: &UrlConvention,
    url: &str,
    path: &Path,
) -> SyncResult<()> {
    backend.clone_repository(url, path)?;
    materialize_submodules(backend, convention, path, false)?;
    let leftovers: Vec<FileStatus> = backend
        .status(path, false)?
        .into_iter()
        .map(|entry| entry.file)
        .collect();
    if !leftovers.is_empty() {
        debug!(path = %path.display(), count = leftovers.len(), "discarding changes left by clone");
        discard_statuses(backend, path, &leftovers)?;
    }
    info!(path = %path.display(), "clone complete");
    Ok(())
}

fn remove_partial_clone(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => warn!(path = %path.display(), "removed partially cloned directory"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to remove partially cloned directory")
        }
    }
}

/// Brings submodules in line with the commits the parent records. With
/// `only_stale` set, submodules already at their recorded commit are left
/// alone. Ssh urls are rewritten to http before syncing.
pub(crate) fn materialize_submodules(
    backend: &dyn VcsBackend,
    convention: &UrlConvention,
    path: &Path,
    only_stale: bool,
) -> SyncResult<()> {
    for name in backend.submodule_names(path)? {
        let info = backend.submodule_info(path, &name)?;
        let sub_path = path.join(&info.path);
        if only_stale && !submodule_is_stale(backend, &sub_path, info.recorded_commit.as_deref())
        {
            continue;
        }
        if let Some(url) = info.url.as_deref() {
            let http_url = convention.to_http_url(url);
            if http_url != url {
                debug!(submodule = %name, url = %http_url, "rewriting submodule url");
                backend.submodule_set_url(path, &name, &http_url)?;
            }
        }
        backend.submodule_sync_update(path, &name)?;
        if sub_path.is_dir() {
            materialize_submodules(backend, convention, &sub_path, only_stale)?;
        }
    }
    Ok(())
}

fn submodule_is_stale(backend: &dyn VcsBackend, sub_path: &Path, recorded: Option<&str>) -> bool {
    if !sub_path.join(".git").exists() {
        return true;
    }
    match backend.resolve_commit(sub_path, "HEAD") {
        Ok(head) => head.as_deref() != recorded,
        Err(_) => true,
    }
}

/// Tracked paths are reset to HEAD; new paths are dropped from the index
/// and deleted from disk.
pub(crate) fn discard_statuses(
    backend: &dyn VcsBackend,
    path: &Path,
    statuses: &[FileStatus],
) -> SyncResult<()> {
    let mut tracked = Vec::new();
    let mut staged_new = Vec::new();
    let mut new = Vec::new();
    for status in statuses {
        if status.is_submodule {
            debug!(path = %path.display(), submodule = %status.path, "submodule left untouched by discard");
            continue;
        }
        if status.is_new {
            if status.in_index {
                staged_new.push(status.path.clone());
            }
            new.push(status.path.clone());
        } else {
            tracked.push(status.path.clone());
        }
    }
    backend.reset_hard(path, &tracked)?;
    if !staged_new.is_empty() {
        backend.remove_from_index(path, &staged_new)?;
    }
    for relative in &new {
        delete_path(path, relative)?;
    }
    Ok(())
}

fn clean_directory(backend: &dyn VcsBackend, path: &Path) -> SyncResult<()> {
    let new_paths: Vec<String> = backend
        .status(path, false)?
        .into_iter()
        .filter(|entry| entry.file.is_new && !entry.file.in_index && !entry.file.path.ends_with('/'))
        .map(|entry| entry.file.path)
        .collect();
    if !new_paths.is_empty() {
        backend.stage_paths(path, &new_paths)?;
    }
    let ignored: Vec<String> = backend
        .status(path, true)?
        .into_iter()
        .filter(|entry| entry.ignored)
        .map(|entry| entry.file.path)
        .collect();
    for relative in &ignored {
        delete_path(path, relative)?;
    }
    debug!(path = %path.display(), removed = ignored.len(), "ignored paths cleaned");
    for name in backend.submodule_names(path)? {
        let info = backend.submodule_info(path, &name)?;
        let sub_path = path.join(&info.path);
        if sub_path.join(".git").exists() {
            clean_directory(backend, &sub_path)?;
        }
    }
    Ok(())
}

fn delete_path(root: &Path, relative: &str) -> SyncResult<()> {
    let target = root.join(relative.trim_end_matches('/'));
    let result = match fs::symlink_metadata(&target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&target),
        Ok(_) => fs::remove_file(&target),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SyncError::io("delete path", target, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SubmoduleInfo;
    use crate::error::{BackendError, ErrorKind};
    use crate::git_backend::GitBackend;
    use crate::git_backend::tests::commit_file;
    use crate::testing::ScriptedBackend;
    use crate::workspace::tests::Fixture;
    use std::sync::{Arc, Mutex};

    fn upstream(fixture: &Fixture, name: &str) -> String {
        let path = fixture.tmp.path().join("remotes").join(name);
        let repo = crate::git_backend::tests::init_on_master(&path);
        commit_file(&repo, "README.md", "hello", Some("HEAD"));
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn failed_clone_leaves_no_directory_and_no_project() {
        let fixture = Fixture::new();
        let scripted = ScriptedBackend::new();
        scripted.fail("clone", BackendError::new("clone", "connection reset"));
        let engine = fixture.engine(Arc::new(scripted));
        let events = engine.subscribe();

        let response = engine.clone_project(
            "https://git.example.com/platform/Library.Core.git",
            RequestFlags::batch(true),
        );
        let Response::Failed(failure) = &response else {
            panic!("expected failure, got {response:?}");
        };
        assert_eq!(failure.error_kind, ErrorKind::Backend);
        assert!(failure.snapshot.is_none());
        assert!(failure.flags.batch);
        assert!(!fixture.root().join("Library.Core").exists());
        assert!(engine.catalog().is_empty());
        assert!(engine.ignore_set().is_empty());
        assert_eq!(events.try_recv().unwrap(), response);
    }

    #[test]
    fn clone_rejects_urls_outside_the_convention() {
        let fixture = Fixture::new();
        let engine = fixture.engine(Arc::new(GitBackend::default()));
        let response = engine.clone_project("https://elsewhere.org/x.git", RequestFlags::default());
        let Response::Failed(failure) = response else {
            panic!("expected failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::NotAProject);
    }

    #[test]
    fn clone_does_not_touch_existing_directory() {
        let fixture = Fixture::new();
        fixture.project("A", "A");
        let engine = fixture.engine(Arc::new(GitBackend::default()));
        let response =
            engine.clone_project("https://git.example.com/platform/A.git", RequestFlags::default());
        assert!(response.is_failure());
        assert!(fixture.root().join("A/README.md").exists());
    }

    #[test]
    fn guard_is_held_during_mutation_and_released_after() {
        let fixture = Fixture::new();
        fixture.project("A", "A");
        let scripted = ScriptedBackend::new();
        let engine = Arc::new(fixture.engine(Arc::new(scripted.clone())));
        let observed = Arc::new(Mutex::new(Vec::new()));
        {
            let engine = Arc::downgrade(&engine);
            let observed = Arc::clone(&observed);
            scripted.on_call(move |operation, _| {
                if operation == "checkout"
                    && let Some(engine) = engine.upgrade()
                {
                    observed.lock().unwrap().push(engine.ignore_set().is_guarded("A"));
                }
            });
        }
        scripted.fail("checkout", BackendError::new("checkout", "locked"));

        let response = engine.checkout_default("A");
        assert!(response.is_failure());
        assert_eq!(*observed.lock().unwrap(), vec![true]);
        assert!(!engine.ignore_set().is_guarded("A"));
        assert!(response.snapshot().is_some());
    }

    #[test]
    fn second_mutation_on_guarded_key_is_busy() {
        let fixture = Fixture::new();
        fixture.project("A", "A");
        let engine = fixture.engine(Arc::new(GitBackend::default()));
        let _token = engine.ignore_set().try_guard("A").unwrap();
        let Response::Failed(failure) = engine.clean_ignored("A") else {
            panic!("expected busy");
        };
        assert_eq!(failure.error_kind, ErrorKind::Busy);
        assert!(fixture.root().join("A").exists());
    }

    #[test]
    fn discard_resets_tracked_and_deletes_new_selected_paths() {
        let fixture = Fixture::new();
        let repo = fixture.project("A", "A");
        commit_file(&repo, "tracked.txt", "original", Some("HEAD"));
        let root = fixture.root().join("A");
        std::fs::write(root.join("tracked.txt"), "edited").unwrap();
        std::fs::write(root.join("new.txt"), "new").unwrap();
        std::fs::write(root.join("staged.txt"), "staged").unwrap();
        std::fs::write(root.join("keep.txt"), "keep").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("staged.txt")).unwrap();
        index.write().unwrap();

        let engine = fixture.engine(Arc::new(GitBackend::default()));
        engine.scan().unwrap();
        let paths = vec![
            "tracked.txt".to_string(),
            "new.txt".to_string(),
            "staged.txt".to_string(),
        ];
        let response = engine.discard_selected("A", &paths);
        assert!(!response.is_failure(), "{response:?}");

        assert_eq!(std::fs::read_to_string(root.join("tracked.txt")).unwrap(), "original");
        assert!(!root.join("new.txt").exists());
        assert!(!root.join("staged.txt").exists());
        let snapshot = response.snapshot().unwrap();
        let remaining: Vec<_> = snapshot.file_statuses.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(remaining, vec!["keep.txt"]);
    }

    #[test]
    fn delete_untracked_keeps_tracked_edits() {
        let fixture = Fixture::new();
        fixture.project("A", "A");
        let root = fixture.root().join("A");
        std::fs::write(root.join("README.md"), "edited").unwrap();
        std::fs::create_dir_all(root.join("tmp")).unwrap();
        std::fs::write(root.join("tmp/scratch.txt"), "x").unwrap();

        let engine = fixture.engine(Arc::new(GitBackend::default()));
        let response = engine.delete_untracked("A");
        assert!(!response.is_failure());
        assert!(!root.join("tmp/scratch.txt").exists());
        assert_eq!(std::fs::read_to_string(root.join("README.md")).unwrap(), "edited");
    }

    #[test]
    fn clean_stages_new_files_and_deletes_ignored() {
        let fixture = Fixture::new();
        let repo = fixture.project("A", "A");
        commit_file(&repo, ".gitignore", "bin/\n*.log\n", Some("HEAD"));
        let root = fixture.root().join("A");
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin/app.dll"), "x").unwrap();
        std::fs::write(root.join("trace.log"), "x").unwrap();
        std::fs::write(root.join("fresh.txt"), "x").unwrap();

        let engine = fixture.engine(Arc::new(GitBackend::default()));
        let response = engine.clean_ignored("A");
        assert!(!response.is_failure(), "{response:?}");
        assert!(!root.join("bin").exists());
        assert!(!root.join("trace.log").exists());
        assert!(root.join("fresh.txt").exists());

        let snapshot = response.snapshot().unwrap();
        assert!(!snapshot.dirty_flag);
        assert!(snapshot.file_statuses[0].in_index);
    }

    #[test]
    fn remove_deletes_directory_and_catalog_entry() {
        let fixture = Fixture::new();
        fixture.project("A", "A");
        let engine = fixture.engine(Arc::new(GitBackend::default()));
        engine.scan().unwrap();

        let response = engine.remove_project("A", RequestFlags::batch(true));
        let Response::Status(status) = response else {
            panic!("expected status");
        };
        assert_eq!(status.kind, StatusKind::Removing);
        assert!(status.snapshot.is_none());
        assert!(!fixture.root().join("A").exists());
        assert!(!engine.catalog().contains("A"));

        let again = engine.remove_project("A", RequestFlags::default());
        assert!(!again.is_failure());
    }

    /// Engine whose http prefix points at the local upstream directory.
    fn local_engine(fixture: &Fixture, backend: Arc<dyn VcsBackend>) -> Engine {
        let convention = UrlConvention {
            http_prefix: format!("{}/", fixture.tmp.path().join("remotes").display()),
            ssh_prefix: "git@git.example.com:platform/".into(),
            suffix: String::new(),
        };
        let options = crate::workspace::EngineOptions {
            root: fixture.root(),
            convention,
            default_branch: "master".into(),
            scan_concurrency: 2,
            catalog_path: None,
        };
        Engine::new(options, backend, fixture.clock.clone())
    }

    #[test]
    fn clone_materializes_project_from_local_upstream() {
        let fixture = Fixture::new();
        let source = upstream(&fixture, "Library.Core");
        let engine = local_engine(&fixture, Arc::new(GitBackend::default()));

        let response = engine.clone_project(&source, RequestFlags::default());
        let snapshot = response.snapshot().unwrap();
        assert_eq!(snapshot.directory_name, "Library.Core");
        assert!(snapshot.file_statuses.is_empty());
        assert_eq!(snapshot.current_branch, "master");
        assert!(engine.catalog().contains("Library.Core"));
    }

    #[test]
    fn submodule_failure_after_clone_removes_directory() {
        let fixture = Fixture::new();
        let source = upstream(&fixture, "Library.Core");
        let scripted = ScriptedBackend::new();
        scripted.set_submodules(
            &fixture.root().join("Library.Core"),
            vec![SubmoduleInfo {
                name: "Shared".into(),
                path: "Shared".into(),
                url: Some("https://git.example.com/platform/Shared.git".into()),
                recorded_commit: None,
            }],
        );
        scripted.fail(
            "submodule_update",
            BackendError::new("submodule update", "authentication required"),
        );
        let engine = local_engine(&fixture, Arc::new(scripted.clone()));

        let Response::Failed(failure) = engine.clone_project(&source, RequestFlags::default())
        else {
            panic!("expected failure");
        };
        assert!(scripted.calls().iter().any(|call| call == "clone"));
        assert!(failure.snapshot.is_none());
        assert!(!fixture.root().join("Library.Core").exists());
        assert!(!engine.catalog().contains("Library.Core"));
        assert!(!engine.ignore_set().is_guarded("Library.Core"));
    }

    #[test]
    fn submodule_ssh_urls_are_rewritten_before_update() {
        let fixture = Fixture::new();
        fixture.project("App", "App");
        let path = fixture.root().join("App");
        let scripted = ScriptedBackend::new();
        scripted.set_submodules(
            &path,
            vec![SubmoduleInfo {
                name: "Shared".into(),
                path: "Shared".into(),
                url: Some("git@git.example.com:platform/Shared.git".into()),
                recorded_commit: None,
            }],
        );
        materialize_submodules(&scripted, &crate::testing::test_convention(), &path, false)
            .unwrap();
        assert_eq!(scripted.calls(), vec!["submodule_set_url", "submodule_update"]);
        assert_eq!(
            scripted.submodule_info(&path, "Shared").unwrap().url.as_deref(),
            Some("https://git.example.com/platform/Shared.git")
        );
    }
}
