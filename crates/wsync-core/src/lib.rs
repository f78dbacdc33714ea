pub mod backend;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod git_backend;
pub mod guard;
pub mod lockfile;
pub mod model;
pub mod paths;
pub mod provider;
pub mod reconcile;
pub mod scanner;
pub mod scheduler;
pub mod snapshot;
pub mod watcher;
pub mod workspace;
mod workspace_mutations;
pub mod workspace_types;
mod workspace_update;

#[cfg(test)]
mod testing;

pub use error::{BackendError, SyncError, SyncResult};
pub use workspace::{Engine, EngineOptions};
