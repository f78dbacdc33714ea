use crate::catalog::Catalog;
use crate::model::{RemoteProject, RepositorySnapshot};
use crate::workspace::Engine;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Work derived from one reconciliation pass; always recomputed whole.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct WorkQueues {
    /// Directory keys whose remote moved past the local default branch.
    pub to_update: Vec<String>,
    /// Clone urls of remote projects with no local directory.
    pub to_clone: Vec<String>,
    /// Directory keys of local projects the remote no longer lists.
    pub to_retire: Vec<String>,
}

impl WorkQueues {
    pub fn is_empty(&self) -> bool {
        self.to_update.is_empty() && self.to_clone.is_empty() && self.to_retire.is_empty()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct WorkspaceReport {
    #[serde(flatten)]
    pub queues: WorkQueues,
    pub dirty: Vec<String>,
    pub off_default_branch: Vec<String>,
    pub unpushed: Vec<String>,
    pub cleanable: Vec<String>,
}

pub fn reconcile(
    catalog: &Catalog,
    remote: &[RemoteProject],
    default_branch: &str,
    excluded: &[String],
) -> WorkspaceReport {
    let excluded: HashSet<String> = excluded.iter().map(|name| name.to_lowercase()).collect();
    let remote_by_name: HashMap<String, &RemoteProject> = remote
        .iter()
        .filter(|project| !excluded.contains(&project.name.to_lowercase()))
        .map(|project| (project.name.to_lowercase(), project))
        .collect();

    let mut local: Vec<&RepositorySnapshot> = catalog.snapshots().collect();
    local.sort_by_key(|snapshot| snapshot.name.to_lowercase());
    let local_names: HashSet<String> = local.iter().map(|s| s.name.to_lowercase()).collect();

    let mut report = WorkspaceReport::default();
    for snapshot in &local {
        let name = snapshot.name.to_lowercase();
        let key = snapshot.directory_name.clone();
        if snapshot.has_pending_changes() {
            report.dirty.push(key.clone());
        } else if snapshot.current_branch != default_branch {
            report.off_default_branch.push(key.clone());
        }
        if snapshot.ahead > 0 {
            report.unpushed.push(key.clone());
        }
        if snapshot.dirty_flag {
            report.cleanable.push(key.clone());
        }

        if excluded.contains(&name) {
            continue;
        }
        match remote_by_name.get(&name) {
            None => report.queues.to_retire.push(key),
            Some(project) => {
                let moved = project
                    .last_commit
                    .as_ref()
                    .is_some_and(|commit| !snapshot.contains_commit(&commit.id));
                if moved && !snapshot.has_pending_changes() {
                    report.queues.to_update.push(key);
                }
            }
        }
    }

    let mut missing: Vec<&RemoteProject> = remote_by_name
        .iter()
        .filter(|(name, _)| !local_names.contains(*name))
        .map(|(_, project)| *project)
        .collect();
    missing.sort_by_key(|project| project.name.to_lowercase());
    report.queues.to_clone = missing
        .into_iter()
        .map(|project| project.http_url.clone())
        .collect();
    report
}

impl Engine {
    /// Reconciles the current catalog and remembers each remote project's
    /// latest commit for later snapshots.
    pub fn reconcile(&self, remote: &[RemoteProject], excluded: &[String]) -> WorkspaceReport {
        self.builder().record_remote_commits(remote.iter().filter_map(|project| {
            project
                .last_commit
                .as_ref()
                .map(|commit| (project.name.clone(), commit.id.clone()))
        }));
        let report = reconcile(&self.catalog(), remote, self.default_branch(), excluded);
        info!(
            update = report.queues.to_update.len(),
            clone = report.queues.to_clone.len(),
            retire = report.queues.to_retire.len(),
            "reconciled workspace"
        );
        report
    }
}
