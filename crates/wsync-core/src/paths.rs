use crate::model::RemoteUrls;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// How project names are encoded in remote urls:
/// `<prefix><name><suffix>` for both the http and the ssh form.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UrlConvention {
    pub http_prefix: String,
    pub ssh_prefix: String,
    pub suffix: String,
}

impl Default for UrlConvention {
    fn default() -> Self {
        Self {
            http_prefix: "https://gitlab.com/".to_string(),
            ssh_prefix: "git@gitlab.com:".to_string(),
            suffix: ".git".to_string(),
        }
    }
}

impl UrlConvention {
    pub fn project_name(&self, url: &str) -> String {
        self.strip(url, &self.http_prefix)
            .or_else(|| self.strip(url, &self.ssh_prefix))
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn classify(&self, url: &str) -> RemoteUrls {
        let mut urls = RemoteUrls::default();
        if self.strip(url, &self.http_prefix).is_some() {
            urls.http_url = Some(url.to_string());
        } else if self.strip(url, &self.ssh_prefix).is_some() {
            urls.ssh_url = Some(url.to_string());
        }
        urls
    }

    /// Rewrites an ssh url to its http form; other urls pass through.
    pub fn to_http_url(&self, url: &str) -> String {
        match url.strip_prefix(self.ssh_prefix.as_str()) {
            Some(rest) if !self.ssh_prefix.is_empty() => format!("{}{rest}", self.http_prefix),
            _ => url.to_string(),
        }
    }

    fn strip<'a>(&self, url: &'a str, prefix: &str) -> Option<&'a str> {
        if prefix.is_empty() {
            return None;
        }
        let name = url.strip_prefix(prefix)?.strip_suffix(self.suffix.as_str())?;
        if name.is_empty() { None } else { Some(name) }
    }
}

pub fn directory_path(root: &Path, directory_name: &str) -> PathBuf {
    root.join(directory_name)
}

/// Directory name a freshly cloned project lands in.
pub fn directory_name_for_project(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }
    sanitized
}

/// Splits a path under `root` into its top-level directory key and the
/// remainder inside that directory.
pub fn split_under_root(root: &Path, path: &Path) -> Option<(String, PathBuf)> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let key = match components.next()? {
        Component::Normal(name) => name.to_string_lossy().into_owned(),
        _ => return None,
    };
    Some((key, components.as_path().to_path_buf()))
}
