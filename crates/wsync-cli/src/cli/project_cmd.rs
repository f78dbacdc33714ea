use super::shared::{finish_responses, open_engine, print_json_line};
use super::*;

pub(super) fn handle_scan(paths: &CliPaths) -> anyhow::Result<()> {
    let (_, engine) = open_engine(paths)?;
    finish_responses(&[engine.handle(Request::RefreshAll)])
}

pub(super) fn handle_status(args: StatusArgs, paths: &CliPaths) -> anyhow::Result<()> {
    let (_, engine) = open_engine(paths)?;
    if args.directories.is_empty() {
        for snapshot in engine.catalog().snapshots() {
            print_json_line(snapshot)?;
        }
        return Ok(());
    }
    let responses: Vec<Response> = args
        .directories
        .into_iter()
        .map(|directory| engine.handle(Request::Status { directory }))
        .collect();
    finish_responses(&responses)
}

/// Translates a project subcommand into engine requests and runs them in
/// order. Multi-target commands are flagged as a batch.
pub(super) fn handle_project(command: Commands, paths: &CliPaths) -> anyhow::Result<()> {
    let requests = requests_for(command)?;
    let (_, engine) = open_engine(paths)?;
    let responses: Vec<Response> = requests
        .into_iter()
        .map(|request| engine.handle(request))
        .collect();
    finish_responses(&responses)
}

pub(super) fn requests_for(command: Commands) -> anyhow::Result<Vec<Request>> {
    Ok(match command {
        Commands::Select(args) => vec![Request::Select {
            directory: args.directory,
            paths: args.paths,
        }],
        Commands::Clone(args) => {
            let all = args.urls.len() > 1;
            args.urls
                .into_iter()
                .map(|url| Request::Clone { url, all })
                .collect()
        }
        Commands::Update(args) => {
            let all = args.directories.len() > 1;
            args.directories
                .into_iter()
                .map(|directory| Request::Update {
                    directory,
                    all,
                    background: false,
                })
                .collect()
        }
        Commands::CheckoutDefault(args) => vec![Request::CheckoutDefault {
            directory: args.directory,
        }],
        Commands::Discard(args) => vec![Request::Discard {
            directory: args.directory,
            paths: args.paths,
        }],
        Commands::DeleteUntracked(args) => vec![Request::DeleteUntracked {
            directory: args.directory,
        }],
        Commands::Clean(args) => vec![Request::Clean {
            directory: args.directory,
        }],
        Commands::Remove(args) => {
            let all = args.directories.len() > 1;
            args.directories
                .into_iter()
                .map(|directory| Request::Remove { directory, all })
                .collect()
        }
        other => anyhow::bail!("`{}` is not a project command", super::app::command_label(&other)),
    })
}
