use super::*;
use wsync_core::scheduler::{AlwaysOpen, ClosedGate, Gate, MarkerFileGate};

#[derive(Parser)]
#[command(author, version, about = "Keep a workspace of git projects in sync with a GitLab group")]
pub(super) struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to the user config dir)")]
    pub(super) config: Option<PathBuf>,
    #[arg(long, global = true, help = "Catalog file (defaults to the user cache dir)")]
    pub(super) catalog: Option<PathBuf>,
    #[arg(long, global = true, help = "Append logs to this file instead of stderr")]
    pub(super) log_file: Option<PathBuf>,
    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Manage config")]
    Config(ConfigArgs),
    #[command(about = "Scan the workspace root and rebuild the catalog")]
    Scan,
    #[command(about = "Print catalog entries, refreshing the named directories")]
    Status(StatusArgs),
    #[command(about = "Mark paths of a project as selected")]
    Select(SelectArgs),
    #[command(about = "Clone projects into the workspace")]
    Clone(CloneArgs),
    #[command(about = "Fast-forward projects to their remote default branch")]
    Update(DirectoriesArgs),
    #[command(about = "Check out the default branch")]
    CheckoutDefault(DirectoryArgs),
    #[command(about = "Discard selected changes")]
    Discard(DiscardArgs),
    #[command(about = "Delete untracked files")]
    DeleteUntracked(DirectoryArgs),
    #[command(about = "Delete ignored files")]
    Clean(DirectoryArgs),
    #[command(about = "Remove project directories")]
    Remove(DirectoriesArgs),
    #[command(about = "Compare the workspace with the remote catalog")]
    Reconcile(ReconcileArgs),
    #[command(about = "Watch the workspace and print change events")]
    Watch,
    #[command(about = "Watch, reconcile periodically and drain updates while the gate is open")]
    Daemon(DaemonArgs),
}

#[derive(Parser)]
pub(super) struct ConfigArgs {
    #[command(subcommand)]
    pub(super) command: ConfigCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum ConfigCommands {
    #[command(about = "Initialize config with a workspace root")]
    Init(InitArgs),
    #[command(about = "Print the effective config")]
    Show,
}

#[derive(Parser)]
pub(super) struct InitArgs {
    #[arg(long)]
    pub(super) root: PathBuf,
    #[arg(long, help = "GitLab group whose projects make up the remote catalog")]
    pub(super) group: Option<String>,
    #[arg(long)]
    pub(super) api_url: Option<String>,
    #[arg(long, help = "Http url prefix, e.g. https://gitlab.com/group/")]
    pub(super) http_prefix: Option<String>,
    #[arg(long, help = "Ssh url prefix, e.g. git@gitlab.com:group/")]
    pub(super) ssh_prefix: Option<String>,
    #[arg(long)]
    pub(super) default_branch: Option<String>,
}

#[derive(Parser)]
pub(super) struct StatusArgs {
    pub(super) directories: Vec<String>,
}

#[derive(Parser)]
pub(super) struct SelectArgs {
    pub(super) directory: String,
    #[arg(required = true)]
    pub(super) paths: Vec<String>,
}

#[derive(Parser)]
pub(super) struct CloneArgs {
    #[arg(required = true)]
    pub(super) urls: Vec<String>,
}

#[derive(Parser)]
pub(super) struct DirectoryArgs {
    pub(super) directory: String,
}

#[derive(Parser)]
pub(super) struct DirectoriesArgs {
    #[arg(required = true)]
    pub(super) directories: Vec<String>,
}

#[derive(Parser)]
pub(super) struct DiscardArgs {
    pub(super) directory: String,
    #[arg(help = "Paths to select before discarding; defaults to the current selection")]
    pub(super) paths: Vec<String>,
}

#[derive(Parser)]
pub(super) struct ReconcileArgs {
    #[arg(long, help = "Clone remote projects missing locally")]
    pub(super) apply_clone: bool,
    #[arg(long, help = "Remove local projects the remote no longer lists")]
    pub(super) apply_retire: bool,
    #[arg(long, help = "Update clean projects the remote moved past")]
    pub(super) apply_update: bool,
}

#[derive(Parser)]
pub(super) struct DaemonArgs {
    #[arg(long)]
    pub(super) lock: Option<PathBuf>,
    #[arg(long, default_value_t = 900)]
    pub(super) reconcile_interval_seconds: u64,
    #[arg(long, value_enum, default_value_t = GateValue::Always)]
    pub(super) gate: GateValue,
    #[arg(long, help = "Marker file that opens the gate while it exists")]
    pub(super) marker: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(super) enum GateValue {
    Always,
    Marker,
    Closed,
}

impl GateValue {
    pub(super) fn build(self, marker: Option<&Path>) -> anyhow::Result<Arc<dyn Gate>> {
        Ok(match self {
            GateValue::Always => Arc::new(AlwaysOpen),
            GateValue::Closed => Arc::new(ClosedGate),
            GateValue::Marker => {
                let marker = marker.context("--gate marker requires --marker <path>")?;
                Arc::new(MarkerFileGate::new(marker))
            }
        })
    }
}
