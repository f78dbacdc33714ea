//! Test doubles shared by the engine tests.

use crate::backend::{MergeOutcome, StatusEntry, SubmoduleInfo, VcsBackend};
use crate::error::{BackendError, BackendResult};
use crate::git_backend::GitBackend;
use crate::paths::UrlConvention;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) fn test_convention() -> UrlConvention {
    UrlConvention {
        http_prefix: "https://git.example.com/platform/".into(),
        ssh_prefix: "git@git.example.com:platform/".into(),
        suffix: ".git".into(),
    }
}

type CallHook = Arc<dyn Fn(&str, &Path) + Send + Sync>;

#[derive(Default)]
struct Script {
    failures: HashMap<&'static str, BackendError>,
    submodules: HashMap<PathBuf, Vec<SubmoduleInfo>>,
    calls: Vec<String>,
    hook: Option<CallHook>,
}

/// Real git backend with scripted failures, scripted submodules and a call
/// log. A scripted clone failure leaves a partial directory behind first.
#[derive(Clone, Default)]
pub(crate) struct ScriptedBackend {
    inner: GitBackend,
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail(&self, operation: &'static str, error: BackendError) {
        self.script.lock().unwrap().failures.insert(operation, error);
    }

    pub(crate) fn set_submodules(&self, parent: &Path, submodules: Vec<SubmoduleInfo>) {
        self.script
            .lock()
            .unwrap()
            .submodules
            .insert(parent.to_path_buf(), submodules);
    }

    pub(crate) fn on_call(&self, hook: impl Fn(&str, &Path) + Send + Sync + 'static) {
        self.script.lock().unwrap().hook = Some(Arc::new(hook));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    fn check(&self, operation: &'static str, path: &Path) -> BackendResult<()> {
        let (hook, failure) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(operation.to_string());
            (script.hook.clone(), script.failures.get(operation).cloned())
        };
        if let Some(hook) = hook {
            hook(operation, path);
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn scripted_submodule(&self, path: &Path, name: &str) -> Option<SubmoduleInfo> {
        let script = self.script.lock().unwrap();
        script
            .submodules
            .get(path)?
            .iter()
            .find(|info| info.name == name)
            .cloned()
    }
}

impl VcsBackend for ScriptedBackend {
    fn open(&self, path: &Path) -> BackendResult<()> {
        self.check("open", path)?;
        self.inner.open(path)
    }

    fn clone_repository(&self, url: &str, path: &Path) -> BackendResult<()> {
        if let Err(err) = self.check("clone", path) {
            std::fs::create_dir_all(path.join(".git")).unwrap();
            std::fs::write(path.join("partial.pack"), "x").unwrap();
            return Err(err);
        }
        self.inner.clone_repository(url, path)
    }

    fn fetch(&self, path: &Path, remote: &str) -> BackendResult<()> {
        self.check("fetch", path)?;
        self.inner.fetch(path, remote)
    }

    fn merge_fast_forward_only(
        &self,
        path: &Path,
        branch: &str,
        upstream: &str,
    ) -> BackendResult<MergeOutcome> {
        self.check("merge", path)?;
        self.inner.merge_fast_forward_only(path, branch, upstream)
    }

    fn checkout_branch(&self, path: &Path, branch: &str) -> BackendResult<()> {
        self.check("checkout", path)?;
        self.inner.checkout_branch(path, branch)
    }

    fn current_branch(&self, path: &Path) -> BackendResult<String> {
        self.inner.current_branch(path)
    }

    fn resolve_commit(&self, path: &Path, reference: &str) -> BackendResult<Option<String>> {
        self.inner.resolve_commit(path, reference)
    }

    fn reset_hard(&self, path: &Path, paths: &[String]) -> BackendResult<()> {
        self.check("reset", path)?;
        self.inner.reset_hard(path, paths)
    }

    fn stage_paths(&self, path: &Path, paths: &[String]) -> BackendResult<()> {
        self.check("stage", path)?;
        self.inner.stage_paths(path, paths)
    }

    fn remove_from_index(&self, path: &Path, paths: &[String]) -> BackendResult<()> {
        self.check("unstage", path)?;
        self.inner.remove_from_index(path, paths)
    }

    fn stash_push(&self, path: &Path) -> BackendResult<()> {
        self.check("stash_push", path)?;
        self.inner.stash_push(path)
    }

    fn stash_pop(&self, path: &Path) -> BackendResult<()> {
        self.check("stash_pop", path)?;
        self.inner.stash_pop(path)
    }

    fn status(&self, path: &Path, include_ignored: bool) -> BackendResult<Vec<StatusEntry>> {
        self.check("status", path)?;
        self.inner.status(path, include_ignored)
    }

    fn ahead_behind(
        &self,
        path: &Path,
        local: &str,
        upstream: &str,
    ) -> BackendResult<(usize, usize)> {
        self.inner.ahead_behind(path, local, upstream)
    }

    fn commit_history(&self, path: &Path, head: &str) -> BackendResult<Vec<String>> {
        self.inner.commit_history(path, head)
    }

    fn submodule_names(&self, path: &Path) -> BackendResult<Vec<String>> {
        let scripted = self
            .script
            .lock()
            .unwrap()
            .submodules
            .get(path)
            .map(|infos| infos.iter().map(|info| info.name.clone()).collect());
        match scripted {
            Some(names) => Ok(names),
            None => self.inner.submodule_names(path),
        }
    }

    fn submodule_info(&self, path: &Path, name: &str) -> BackendResult<SubmoduleInfo> {
        match self.scripted_submodule(path, name) {
            Some(info) => Ok(info),
            None => self.inner.submodule_info(path, name),
        }
    }

    fn submodule_set_url(&self, path: &Path, name: &str, url: &str) -> BackendResult<()> {
        self.check("submodule_set_url", path)?;
        if self.scripted_submodule(path, name).is_some() {
            let mut script = self.script.lock().unwrap();
            if let Some(info) = script
                .submodules
                .get_mut(path)
                .and_then(|infos| infos.iter_mut().find(|info| info.name == name))
            {
                info.url = Some(url.to_string());
            }
            return Ok(());
        }
        self.inner.submodule_set_url(path, name, url)
    }

    fn submodule_sync_update(&self, path: &Path, name: &str) -> BackendResult<()> {
        self.check("submodule_update", path)?;
        if self.scripted_submodule(path, name).is_some() {
            return Ok(());
        }
        self.inner.submodule_sync_update(path, name)
    }

    fn remote_url(&self, path: &Path, remote: &str) -> BackendResult<Option<String>> {
        self.inner.remote_url(path, remote)
    }
}
