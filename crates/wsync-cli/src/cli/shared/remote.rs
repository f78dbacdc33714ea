use super::*;
use wsync_core::daemon::retry_startup_async;
use wsync_core::model::RemoteProject;
use wsync_core::provider::RemoteCatalog;

pub(in crate::cli) async fn list_remote_with_retry(
    catalog: &dyn RemoteCatalog,
) -> anyhow::Result<Vec<RemoteProject>> {
    retry_startup_async("remote listing", || catalog.list_projects()).await
}
