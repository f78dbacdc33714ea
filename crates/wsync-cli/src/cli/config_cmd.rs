use super::shared::print_json_line;
use super::*;

pub(super) fn handle_config(args: ConfigArgs, paths: &CliPaths) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Init(args) => handle_init(args, &paths.config),
        ConfigCommands::Show => {
            let config = AppConfig::load(&paths.config)?;
            print_json_line(&config)
        }
    }
}

pub(super) fn handle_init(args: InitArgs, config_path: &Path) -> anyhow::Result<()> {
    let mut config = AppConfig::load(config_path)?;
    apply_init(&mut config, args);
    config.save(config_path)?;
    info!(path = %config_path.display(), "config saved");
    println!("Config saved to {}", config_path.display());
    Ok(())
}

fn apply_init(config: &mut AppConfig, args: InitArgs) {
    config.root = Some(args.root);
    if let Some(group) = args.group {
        config.gitlab.group = group;
    }
    if let Some(api_url) = args.api_url {
        config.gitlab.api_url = api_url;
    }
    if let Some(prefix) = args.http_prefix {
        config.http_url_prefix = prefix;
    }
    if let Some(prefix) = args.ssh_prefix {
        config.ssh_url_prefix = prefix;
    }
    if let Some(branch) = args.default_branch {
        config.default_branch = branch;
    }
}
