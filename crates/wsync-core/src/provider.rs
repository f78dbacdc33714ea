use crate::model::{RemoteCommit, RemoteProject};
use std::future::Future;
use std::pin::Pin;

pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// The remote project catalog. Paging and authentication stay behind this
/// trait; callers only see fully materialized results.
pub trait RemoteCatalog: Send + Sync {
    fn list_projects<'a>(&'a self) -> CatalogFuture<'a, Vec<RemoteProject>>;

    fn most_recent_commit<'a>(
        &'a self,
        project_id: &'a str,
    ) -> CatalogFuture<'a, Option<RemoteCommit>>;
}
