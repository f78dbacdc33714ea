use super::*;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_file.as_deref())?;
    info!(command = command_label(&cli.command), "running command");

    let paths = CliPaths::resolve(cli.config, cli.catalog)?;
    let result = match cli.command {
        Commands::Config(args) => handle_config(args, &paths),
        Commands::Scan => handle_scan(&paths),
        Commands::Status(args) => handle_status(args, &paths),
        Commands::Watch => handle_watch(&paths).await,
        Commands::Reconcile(args) => handle_reconcile(args, &paths).await,
        Commands::Daemon(args) => handle_daemon(args, &paths).await,
        command => handle_project(command, &paths),
    };

    if let Err(err) = &result {
        warn!(error = %err, "command failed");
    }
    result
}

pub(super) fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Config(_) => "config",
        Commands::Scan => "scan",
        Commands::Status(_) => "status",
        Commands::Select(_) => "select",
        Commands::Clone(_) => "clone",
        Commands::Update(_) => "update",
        Commands::CheckoutDefault(_) => "checkout-default",
        Commands::Discard(_) => "discard",
        Commands::DeleteUntracked(_) => "delete-untracked",
        Commands::Clean(_) => "clean",
        Commands::Remove(_) => "remove",
        Commands::Reconcile(_) => "reconcile",
        Commands::Watch => "watch",
        Commands::Daemon(_) => "daemon",
    }
}
