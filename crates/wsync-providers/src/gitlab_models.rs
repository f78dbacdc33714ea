use serde::Deserialize;
use wsync_core::model::{RemoteCommit, RemoteProject};

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectItem {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) http_url_to_repo: String,
    #[serde(default)]
    pub(crate) ssh_url_to_repo: String,
    pub(crate) default_branch: Option<String>,
    pub(crate) archived: Option<bool>,
}

impl ProjectItem {
    pub(crate) fn into_project(self) -> RemoteProject {
        RemoteProject {
            id: self.id.to_string(),
            name: self.name,
            http_url: self.http_url_to_repo,
            ssh_url: self.ssh_url_to_repo,
            default_branch: self.default_branch,
            last_commit: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitItem {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) created_at: String,
}

impl From<CommitItem> for RemoteCommit {
    fn from(item: CommitItem) -> Self {
        RemoteCommit {
            id: item.id,
            title: item.title,
            created_at: item.created_at,
            from_subproject: None,
        }
    }
}
