use super::shared::{finish_responses, initial_scan, list_remote_with_retry, open_engine, print_json_line};
use super::*;
use wsync_core::scheduler::{AlwaysOpen, clone_all, drain_updates, retire_all};
use wsync_providers::GitLabCatalog;

pub(super) async fn handle_reconcile(args: ReconcileArgs, paths: &CliPaths) -> anyhow::Result<()> {
    let (config, engine) = open_engine(paths)?;
    initial_scan(&engine).await?;

    let remote_catalog = GitLabCatalog::from_config(&config)?;
    let remote = list_remote_with_retry(&remote_catalog).await?;
    let report = engine.reconcile(&remote, &config.excluded_projects);
    print_json_line(&report)?;

    if !(args.apply_clone || args.apply_retire || args.apply_update) {
        return Ok(());
    }

    let poll = config.drain_poll();
    let queues = report.queues;
    let (responses, summary) = tokio::task::spawn_blocking(move || {
        let mut responses = Vec::new();
        if args.apply_retire {
            responses.extend(retire_all(&engine, &queues.to_retire));
        }
        if args.apply_clone {
            responses.extend(clone_all(&engine, &queues.to_clone));
        }
        let summary = args.apply_update.then(|| {
            let stop = AtomicBool::new(false);
            drain_updates(&engine, &queues.to_update, &AlwaysOpen, poll, &stop)
        });
        (responses, summary)
    })
    .await
    .context("join reconcile work")?;

    if let Some(summary) = summary {
        print_json_line(&summary)?;
        if summary.failed > 0 {
            warn!(failed = summary.failed, "some queued updates failed");
        }
    }
    finish_responses(&responses)
}
