use crate::lockfile::{InstanceLock, lock_holder};
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use tracing::{error, warn};

/// Attempts granted to each startup action before it is reported as failed.
pub const STARTUP_ATTEMPTS: u32 = 3;

/// Runs a startup action up to [`STARTUP_ATTEMPTS`] times back to back.
pub fn retry_startup<T, E, F>(action: &str, mut run: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match run() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < STARTUP_ATTEMPTS => {
                warn!(action, attempt, error = %err, "startup action failed; retrying");
                attempt += 1;
            }
            Err(err) => {
                error!(action, attempts = attempt, error = %err, "startup action failed");
                return Err(err);
            }
        }
    }
}

pub async fn retry_startup_async<T, E, F, Fut>(action: &str, mut run: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match run().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < STARTUP_ATTEMPTS => {
                warn!(action, attempt, error = %err, "startup action failed; retrying");
                attempt += 1;
            }
            Err(err) => {
                error!(action, attempts = attempt, error = %err, "startup action failed");
                return Err(err);
            }
        }
    }
}

/// Takes the instance lock or explains who holds it.
pub fn acquire_instance(lock_path: &Path) -> anyhow::Result<InstanceLock> {
    match InstanceLock::try_acquire(lock_path)? {
        Some(lock) => Ok(lock),
        None => match lock_holder(lock_path) {
            Some(pid) => anyhow::bail!(
                "another wsync instance (pid {pid}) holds {}",
                lock_path.display()
            ),
            None => anyhow::bail!("another wsync instance holds {}", lock_path.display()),
        },
    }
}
