use crate::gitlab_models::{CommitItem, ProjectItem};
use crate::gitlab_scope::{encode_group, normalize_branch};
use crate::http::send_with_retry;
use crate::provider_paging::{next_page, total_pages};
use crate::subprojects::fold_subprojects;
use anyhow::Context;
use futures::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder};
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, info, warn};
use wsync_core::config::AppConfig;
use wsync_core::model::{RemoteCommit, RemoteProject};
use wsync_core::provider::{CatalogFuture, RemoteCatalog};

const PAGE_SIZE: u32 = 100;
const COMMIT_LOOKUPS: usize = 5;

/// Remote catalog backed by the projects of one GitLab group.
pub struct GitLabCatalog {
    client: Client,
    api_url: String,
    group: String,
    token: Option<String>,
    excluded: HashSet<String>,
    subproject_suffixes: Vec<String>,
}

impl GitLabCatalog {
    pub fn new(api_url: &str, group: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("wsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            group: encode_group(group)?,
            token,
            excluded: HashSet::new(),
            subproject_suffixes: Vec::new(),
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            &config.gitlab.api_url,
            &config.gitlab.group,
            config.gitlab_token(),
        )?
        .with_excluded(&config.excluded_projects)
        .with_subproject_suffixes(&config.subproject_suffixes))
    }

    pub fn with_excluded(mut self, names: &[String]) -> Self {
        self.excluded = names.iter().map(|name| name.to_lowercase()).collect();
        self
    }

    pub fn with_subproject_suffixes(mut self, suffixes: &[String]) -> Self {
        self.subproject_suffixes = suffixes
            .iter()
            .filter(|suffix| !suffix.is_empty())
            .cloned()
            .collect();
        self
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token.as_str()),
            None => request,
        }
    }

    fn projects_url(&self, page: u32) -> String {
        format!(
            "{}/groups/{}/projects?archived=false&include_subgroups=true&per_page={PAGE_SIZE}&page={page}",
            self.api_url, self.group
        )
    }

    fn commits_url(&self, project_id: &str) -> String {
        format!(
            "{}/projects/{project_id}/repository/commits?per_page=1",
            self.api_url
        )
    }

    async fn list_group(&self) -> anyhow::Result<Vec<ProjectItem>> {
        let mut page = 1;
        let mut items = Vec::new();
        loop {
            let url = self.projects_url(page);
            let response = send_with_retry(|| self.get(&url))
                .await
                .context("list gitlab projects")?;
            let next = next_page(response.headers());
            debug!(
                page,
                total = total_pages(response.headers()).unwrap_or(0),
                "listed gitlab page"
            );
            let payload: Vec<ProjectItem> = response
                .json()
                .await
                .context("decode gitlab projects")?;
            if payload.is_empty() {
                break;
            }
            items.extend(payload);
            match next {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(items)
    }

    async fn fetch_commit(&self, project_id: &str) -> anyhow::Result<Option<RemoteCommit>> {
        let url = self.commits_url(project_id);
        let response = send_with_retry(|| self.get(&url))
            .await
            .with_context(|| format!("list commits of project {project_id}"))?;
        let commits: Vec<CommitItem> = response
            .json()
            .await
            .context("decode gitlab commits")?;
        Ok(commits.into_iter().next().map(RemoteCommit::from))
    }
}

impl RemoteCatalog for GitLabCatalog {
    fn list_projects<'a>(&'a self) -> CatalogFuture<'a, Vec<RemoteProject>> {
        Box::pin(async move {
            info!(group = %self.group, "listing remote catalog");
            let items = self.list_group().await?;
            let projects = select_projects(items, &self.excluded);
            let projects = attach_commits(projects, |id| async move {
                self.most_recent_commit(&id).await
            })
            .await;
            let projects = fold_subprojects(projects, &self.subproject_suffixes);
            info!(projects = projects.len(), "remote catalog listed");
            Ok(projects)
        })
    }

    fn most_recent_commit<'a>(
        &'a self,
        project_id: &'a str,
    ) -> CatalogFuture<'a, Option<RemoteCommit>> {
        Box::pin(self.fetch_commit(project_id))
    }
}

/// Drops archived, duplicate, and excluded entries; keeps listing order.
fn select_projects(items: Vec<ProjectItem>, excluded: &HashSet<String>) -> Vec<RemoteProject> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.archived.unwrap_or(false))
        .filter(|item| seen.insert(item.id))
        .filter(|item| {
            let keep = !excluded.contains(&item.name.to_lowercase());
            if !keep {
                debug!(project = %item.name, "project excluded");
            }
            keep
        })
        .map(|mut item| {
            item.default_branch = normalize_branch(item.default_branch.take());
            item.into_project()
        })
        .collect()
}

/// Looks up the latest commit of every project, a few at a time. A failed
/// lookup leaves `last_commit` empty so the project is never queued for
/// update on stale information.
async fn attach_commits<F, Fut>(projects: Vec<RemoteProject>, lookup: F) -> Vec<RemoteProject>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<RemoteCommit>>>,
{
    let lookup = &lookup;
    let mut resolved: Vec<(usize, RemoteProject)> = stream::iter(projects.into_iter().enumerate())
        .map(|(position, mut project)| async move {
            match lookup(project.id.clone()).await {
                Ok(commit) => project.last_commit = commit,
                Err(err) => {
                    warn!(project = %project.name, error = %err, "commit lookup failed");
                }
            }
            (position, project)
        })
        .buffer_unordered(COMMIT_LOOKUPS)
        .collect()
        .await;
    resolved.sort_by_key(|(position, _)| *position);
    resolved.into_iter().map(|(_, project)| project).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(value: serde_json::Value) -> Vec<ProjectItem> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn select_projects_dedups_and_excludes() {
        let listing = items(json!([
            { "id": 1, "name": "Portal", "http_url_to_repo": "https://h/p/Portal.git",
              "default_branch": "refs/heads/master" },
            { "id": 1, "name": "Portal", "http_url_to_repo": "https://h/p/Portal.git" },
            { "id": 2, "name": "Legacy", "http_url_to_repo": "https://h/p/Legacy.git" },
            { "id": 3, "name": "Frozen", "http_url_to_repo": "https://h/p/Frozen.git",
              "archived": true },
        ]));
        let excluded: HashSet<String> = ["legacy".to_string()].into_iter().collect();
        let projects = select_projects(listing, &excluded);
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Portal");
        assert_eq!(projects[0].default_branch.as_deref(), Some("master"));
    }

    #[test]
    fn urls_follow_gitlab_layout() {
        let catalog = GitLabCatalog::new("https://git.example.com/api/v4/", "platform/tools", None)
            .unwrap();
        assert_eq!(
            catalog.projects_url(2),
            "https://git.example.com/api/v4/groups/platform%2Ftools/projects?archived=false&include_subgroups=true&per_page=100&page=2"
        );
        assert_eq!(
            catalog.commits_url("17"),
            "https://git.example.com/api/v4/projects/17/repository/commits?per_page=1"
        );
    }

    #[test]
    fn missing_group_is_rejected() {
        assert!(GitLabCatalog::new("https://git.example.com/api/v4", "", None).is_err());
    }

    #[tokio::test]
    async fn attach_commits_keeps_order_and_tolerates_failures() {
        let listing = items(json!([
            { "id": 1, "name": "A", "http_url_to_repo": "https://h/p/A.git" },
            { "id": 2, "name": "B", "http_url_to_repo": "https://h/p/B.git" },
            { "id": 3, "name": "C", "http_url_to_repo": "https://h/p/C.git" },
        ]));
        let projects = select_projects(listing, &HashSet::new());
        let calls = AtomicUsize::new(0);
        let projects = attach_commits(projects, |id| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if id == "2" {
                    return Err(anyhow::anyhow!("boom"));
                }
                Ok::<_, anyhow::Error>(Some(RemoteCommit {
                    id: format!("c{id}"),
                    title: String::new(),
                    created_at: String::new(),
                    from_subproject: None,
                }))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(projects[0].last_commit.as_ref().unwrap().id, "c1");
        assert!(projects[1].last_commit.is_none());
        assert_eq!(projects[2].last_commit.as_ref().unwrap().id, "c3");
    }
}
