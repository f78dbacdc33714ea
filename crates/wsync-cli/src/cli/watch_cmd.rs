use super::shared::{initial_scan, open_engine, spawn_event_printer};
use super::*;
use wsync_core::clock::SystemClock;
use wsync_core::watcher::WorkspaceWatcher;

pub(super) async fn handle_watch(paths: &CliPaths) -> anyhow::Result<()> {
    let (config, engine) = open_engine(paths)?;
    initial_scan(&engine).await?;
    let _printer = spawn_event_printer(&engine);

    let stop = Arc::new(AtomicBool::new(false));
    let mut watcher = spawn_watcher(&engine, config.watch_interval(), stop.clone());
    tokio::select! {
        result = &mut watcher => return result.context("join watcher")?,
        signal = tokio::signal::ctrl_c() => signal.context("wait for ctrl-c")?,
    }
    info!("stopping watcher");
    stop.store(true, Ordering::Relaxed);
    watcher.await.context("join watcher")?
}

pub(super) fn spawn_watcher(
    engine: &Arc<Engine>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    let watcher = WorkspaceWatcher::new(engine.clone(), Arc::new(SystemClock), interval);
    tokio::task::spawn_blocking(move || watcher.run(stop))
}
