use std::path::PathBuf;

/// A version-control primitive failed. The core never inspects the cause
/// beyond the message.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

impl From<(&'static str, git2::Error)> for BackendError {
    fn from((operation, err): (&'static str, git2::Error)) -> Self {
        Self::new(operation, err.message())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{directory} has no recognizable remote url")]
    NotAProject { directory: String },
    #[error("stash failed for {directory}; unstaged changes were hard reset: {source}")]
    StashRecovery {
        directory: String,
        #[source]
        source: BackendError,
    },
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{directory} already has a mutation in flight")]
    Busy { directory: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Backend(_) => ErrorKind::Backend,
            SyncError::NotAProject { .. } => ErrorKind::NotAProject,
            SyncError::StashRecovery { .. } => ErrorKind::StashRecovery,
            SyncError::Io { .. } => ErrorKind::Io,
            SyncError::Busy { .. } => ErrorKind::Busy,
            SyncError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Serializable tag for [`SyncError`], carried in failure responses.
#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Backend,
    NotAProject,
    StashRecovery,
    Io,
    Busy,
    Config,
}

pub type SyncResult<T> = Result<T, SyncError>;
