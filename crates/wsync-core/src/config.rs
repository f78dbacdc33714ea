use crate::git_backend::GitCredentials;
use crate::paths::UrlConvention;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GITLAB_TOKEN_ENV: &str = "WSYNC_GITLAB_TOKEN";
pub const GIT_TOKEN_ENV: &str = "WSYNC_GIT_TOKEN";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root: Option<PathBuf>,
    pub http_url_prefix: String,
    pub ssh_url_prefix: String,
    pub url_suffix: String,
    pub default_branch: String,
    pub scan_concurrency: usize,
    pub watch_interval_ms: u64,
    pub drain_poll_secs: u64,
    pub excluded_projects: Vec<String>,
    pub subproject_suffixes: Vec<String>,
    pub gitlab: GitLabSettings,
    pub git_username: String,
    pub ssh_key: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabSettings {
    pub api_url: String,
    pub group: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let convention = UrlConvention::default();
        Self {
            root: None,
            http_url_prefix: convention.http_prefix,
            ssh_url_prefix: convention.ssh_prefix,
            url_suffix: convention.suffix,
            default_branch: "master".to_string(),
            scan_concurrency: 20,
            watch_interval_ms: 500,
            drain_poll_secs: 5,
            excluded_projects: Vec::new(),
            subproject_suffixes: Vec::new(),
            gitlab: GitLabSettings {
                api_url: "https://gitlab.com/api/v4".to_string(),
                group: String::new(),
            },
            git_username: String::new(),
            ssh_key: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).context("read config")?;
        let config = serde_json::from_str(&data).context("parse config")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create config directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, data).context("write config")?;
        Ok(())
    }

    pub fn url_convention(&self) -> UrlConvention {
        UrlConvention {
            http_prefix: self.http_url_prefix.clone(),
            ssh_prefix: self.ssh_url_prefix.clone(),
            suffix: self.url_suffix.clone(),
        }
    }

    pub fn require_root(&self) -> anyhow::Result<PathBuf> {
        self.root
            .clone()
            .context("workspace root not configured; run `wsync config init --root <path>`")
    }

    pub fn git_credentials(&self) -> GitCredentials {
        GitCredentials {
            username: self.git_username.clone(),
            token: std::env::var(GIT_TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            ssh_key: self.ssh_key.clone(),
            ssh_passphrase: None,
        }
    }

    pub fn gitlab_token(&self) -> Option<String> {
        std::env::var(GITLAB_TOKEN_ENV).ok().filter(|t| !t.is_empty())
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_projects
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(name))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_secs(self.drain_poll_secs.max(1))
    }
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("com", "wsync", "wsync").context("resolve project dirs")
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

pub fn default_catalog_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.cache_dir().join("catalog.json"))
}

pub fn default_lock_path() -> anyhow::Result<PathBuf> {
    let project = project_dirs()?;
    Ok(project
        .runtime_dir()
        .unwrap_or(project.cache_dir())
        .join("wsync.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(config.default_branch, "master");
        assert_eq!(config.scan_concurrency, 20);
        assert_eq!(config.watch_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"root": "/work", "excluded_projects": ["Legacy.Tool"], "gitlab": {"group": "platform"}}"#,
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/work")));
        assert!(config.is_excluded("legacy.tool"));
        assert_eq!(config.gitlab.group, "platform");
        assert_eq!(config.drain_poll_secs, 5);
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.json");
        let config = AppConfig {
            root: Some(PathBuf::from("/work")),
            subproject_suffixes: vec![".Contract".into()],
            ..AppConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.subproject_suffixes, vec![".Contract".to_string()]);
        assert_eq!(loaded.url_convention(), config.url_convention());
    }

    #[test]
    fn parse_error_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("parse config"));
    }
}
