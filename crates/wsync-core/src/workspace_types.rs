use crate::error::{ErrorKind, SyncError};
use crate::model::RepositorySnapshot;
use serde::{Deserialize, Serialize};

/// What produced a status notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    None,
    Cloning,
    Removing,
    Updating,
    Cleaning,
    Deleted,
    FileEvent,
    Discovered,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    RefreshAll,
    Status {
        directory: String,
    },
    Select {
        directory: String,
        paths: Vec<String>,
    },
    Clone {
        url: String,
        #[serde(default)]
        all: bool,
    },
    Update {
        directory: String,
        #[serde(default)]
        all: bool,
        #[serde(default)]
        background: bool,
    },
    CheckoutDefault {
        directory: String,
    },
    Discard {
        directory: String,
        #[serde(default)]
        paths: Vec<String>,
    },
    DeleteUntracked {
        directory: String,
    },
    Clean {
        directory: String,
    },
    Remove {
        directory: String,
        #[serde(default)]
        all: bool,
    },
}

/// Batch context a request was issued in, echoed on its response.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestFlags {
    pub batch: bool,
    pub background: bool,
}

impl RequestFlags {
    pub fn batch(batch: bool) -> Self {
        Self {
            batch,
            background: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub kind: StatusKind,
    pub directory_name: String,
    /// Absent once the directory is gone or no longer a project.
    pub snapshot: Option<RepositorySnapshot>,
    #[serde(flatten)]
    pub flags: RequestFlags,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: StatusKind,
    pub directory_name: String,
    pub error_kind: ErrorKind,
    pub message: String,
    /// Whatever state is known after the failure.
    pub snapshot: Option<RepositorySnapshot>,
    #[serde(flatten)]
    pub flags: RequestFlags,
}

impl OperationFailure {
    pub fn new(
        kind: StatusKind,
        directory_name: impl Into<String>,
        error: &SyncError,
        snapshot: Option<RepositorySnapshot>,
        flags: RequestFlags,
    ) -> Self {
        Self {
            kind,
            directory_name: directory_name.into(),
            error_kind: error.kind(),
            message: error.to_string(),
            snapshot,
            flags,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Response {
    Status(ProjectStatus),
    Failed(OperationFailure),
    Catalog { projects: Vec<RepositorySnapshot> },
}

/// Every response is also delivered to subscribers as an event.
pub type StatusEvent = Response;

impl Response {
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Failed(_))
    }

    pub fn snapshot(&self) -> Option<&RepositorySnapshot> {
        match self {
            Response::Status(status) => status.snapshot.as_ref(),
            Response::Failed(failure) => failure.snapshot.as_ref(),
            Response::Catalog { .. } => None,
        }
    }

    pub fn directory_name(&self) -> Option<&str> {
        match self {
            Response::Status(status) => Some(&status.directory_name),
            Response::Failed(failure) => Some(&failure.directory_name),
            Response::Catalog { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_decode_from_tagged_json() {
        let request: Request =
            serde_json::from_str(r#"{"type": "update", "directory": "A", "background": true}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::Update {
                directory: "A".into(),
                all: false,
                background: true
            }
        );
    }

    #[test]
    fn failure_serializes_kind_and_flags() {
        let failure = OperationFailure::new(
            StatusKind::Cloning,
            "A",
            &SyncError::Busy {
                directory: "A".into(),
            },
            None,
            RequestFlags::batch(true),
        );
        let json = serde_json::to_value(Response::Failed(failure)).unwrap();
        assert_eq!(json["response"], "failed");
        assert_eq!(json["kind"], "cloning");
        assert_eq!(json["error_kind"], "busy");
        assert_eq!(json["batch"], true);
    }
}
