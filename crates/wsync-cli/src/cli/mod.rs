use crate::logging;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use wsync_core::config::{AppConfig, default_catalog_path, default_config_path, default_lock_path};
use wsync_core::workspace_types::{Request, Response};
use wsync_core::Engine;

mod app;
mod args;
mod config_cmd;
mod daemon_cmd;
mod project_cmd;
mod reconcile_cmd;
mod shared;
mod watch_cmd;

use args::*;

use config_cmd::handle_config;
use daemon_cmd::handle_daemon;
use project_cmd::{handle_project, handle_scan, handle_status};
use reconcile_cmd::handle_reconcile;
use shared::CliPaths;
use watch_cmd::handle_watch;

pub async fn run() -> anyhow::Result<()> {
    app::run().await
}
