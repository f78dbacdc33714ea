pub mod gitlab;
mod gitlab_models;
mod gitlab_scope;
mod http;
mod provider_paging;
mod subprojects;

pub use gitlab::GitLabCatalog;
