use super::*;
use wsync_core::clock::SystemClock;
use wsync_core::daemon::retry_startup;
use wsync_core::git_backend::GitBackend;
use wsync_core::EngineOptions;

/// Files the CLI reads and writes, resolved once per invocation.
#[derive(Clone, Debug)]
pub(in crate::cli) struct CliPaths {
    pub(in crate::cli) config: PathBuf,
    pub(in crate::cli) catalog: PathBuf,
}

impl CliPaths {
    pub(in crate::cli) fn resolve(
        config: Option<PathBuf>,
        catalog: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config: match config {
                Some(path) => path,
                None => default_config_path()?,
            },
            catalog: match catalog {
                Some(path) => path,
                None => default_catalog_path()?,
            },
        })
    }
}

pub(in crate::cli) fn open_engine(paths: &CliPaths) -> anyhow::Result<(AppConfig, Arc<Engine>)> {
    let config = AppConfig::load(&paths.config)
        .with_context(|| format!("load config {}", paths.config.display()))?;
    let options = EngineOptions::from_config(&config, Some(paths.catalog.clone()))?;
    let backend = Arc::new(GitBackend::new(config.git_credentials()));
    let engine = Engine::new(options, backend, Arc::new(SystemClock));
    Ok((config, Arc::new(engine)))
}

/// Startup scan on a blocking thread, retried before giving up.
pub(in crate::cli) async fn initial_scan(engine: &Arc<Engine>) -> anyhow::Result<usize> {
    let engine = engine.clone();
    let projects = tokio::task::spawn_blocking(move || {
        retry_startup("initial scan", || engine.scan())
    })
    .await
    .context("join initial scan")??;
    info!(projects = projects.len(), "initial scan complete");
    Ok(projects.len())
}

/// Prints every published event as a JSON line until the engine is gone.
pub(in crate::cli) fn spawn_event_printer(engine: &Engine) -> std::thread::JoinHandle<()> {
    let events = engine.subscribe();
    std::thread::spawn(move || {
        for event in events {
            if let Err(err) = print_json_line(&event) {
                warn!(error = %err, "stop printing events");
                break;
            }
        }
    })
}
