use super::shared::{initial_scan, list_remote_with_retry, open_engine, print_json_line, spawn_event_printer};
use super::watch_cmd::spawn_watcher;
use super::*;
use tokio::task::JoinHandle;
use wsync_core::daemon::acquire_instance;
use wsync_core::model::RemoteProject;
use wsync_core::provider::RemoteCatalog;
use wsync_core::scheduler::{DrainSummary, Gate, drain_updates};
use wsync_providers::GitLabCatalog;

/// Long-running mode: one instance per machine, a watcher thread, and a
/// periodic reconciliation whose update queue drains while the gate is open.
pub(super) async fn handle_daemon(args: DaemonArgs, paths: &CliPaths) -> anyhow::Result<()> {
    let lock_path = match args.lock {
        Some(path) => path,
        None => default_lock_path()?,
    };
    let _lock = acquire_instance(&lock_path)?;
    info!(lock = %lock_path.display(), "daemon lock acquired");

    let gate = args.gate.build(args.marker.as_deref())?;
    let (config, engine) = open_engine(paths)?;
    initial_scan(&engine).await?;
    let _printer = spawn_event_printer(&engine);

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = spawn_watcher(&engine, config.watch_interval(), stop.clone());

    let remote_catalog = GitLabCatalog::from_config(&config)?;
    let interval = Duration::from_secs(args.reconcile_interval_seconds.max(1));
    let mut remote = Some(list_remote_with_retry(&remote_catalog).await?);
    let mut drain: Option<JoinHandle<DrainSummary>> = None;

    loop {
        if let Some(projects) = remote.take() {
            let report = engine.reconcile(&projects, &config.excluded_projects);
            print_json_line(&report)?;
            if drain.as_ref().is_some_and(|handle| !handle.is_finished()) {
                debug!("previous drain still running; queue left for next pass");
            } else if !report.queues.to_update.is_empty() {
                drain = Some(spawn_drain(
                    &engine,
                    report.queues.to_update,
                    gate.clone(),
                    config.drain_poll(),
                    stop.clone(),
                ));
            }
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("wait for ctrl-c")?;
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        remote = refresh_remote(&remote_catalog).await;
    }

    info!("daemon stopping");
    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = drain {
        let summary = handle.await.context("join drain")?;
        print_json_line(&summary)?;
    }
    watcher.await.context("join watcher")?
}

async fn refresh_remote(catalog: &dyn RemoteCatalog) -> Option<Vec<RemoteProject>> {
    match catalog.list_projects().await {
        Ok(projects) => Some(projects),
        Err(err) => {
            warn!(error = %err, "remote listing failed; retrying next interval");
            None
        }
    }
}

fn spawn_drain(
    engine: &Arc<Engine>,
    queue: Vec<String>,
    gate: Arc<dyn Gate>,
    poll: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<DrainSummary> {
    let engine = engine.clone();
    info!(queued = queue.len(), "draining update queue");
    tokio::task::spawn_blocking(move || drain_updates(&engine, &queue, gate.as_ref(), poll, &stop))
}
