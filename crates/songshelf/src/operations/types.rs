//! Types for mutation operations: errors, per-item outcomes and the summary returned to callers.

use crate::metadata::MetadataError;
use crate::tree::MirrorError;
use crate::validation::ValidationError;
use crate::volume::VolumeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Operation bookkeeping
// ============================================================================

/// Kind of mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Move,
    Copy,
    Delete,
    Rename,
}

/// Outcome of one sub-item of an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Pending,
    Succeeded,
    Failed,
    Skipped,
}

/// Why a sub-item didn't complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureCause {
    /// Vanished between validation and apply
    NotFound,
    PermissionDenied,
    /// A folder still had entries when deleted
    NotEmpty,
    /// Something is in the way on disk that the mirror didn't know about
    AlreadyExists,
    Io { message: String },
}

impl From<&VolumeError> for FailureCause {
    fn from(err: &VolumeError) -> Self {
        match err {
            VolumeError::NotFound(_) => Self::NotFound,
            VolumeError::PermissionDenied(_) => Self::PermissionDenied,
            VolumeError::NotEmpty(_) => Self::NotEmpty,
            VolumeError::AlreadyExists(_) => Self::AlreadyExists,
            VolumeError::NotSupported | VolumeError::CrossesDevices(_) => Self::Io {
                message: err.to_string(),
            },
            VolumeError::IoError(message) => Self::Io {
                message: message.clone(),
            },
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::NotEmpty => write!(f, "folder not empty"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Io { message } => write!(f, "{}", message),
        }
    }
}

/// One sub-item that didn't complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub path: String,
    pub cause: FailureCause,
}

impl FailedItem {
    pub fn new(path: &Path, cause: FailureCause) -> Self {
        Self {
            path: path.display().to_string(),
            cause,
        }
    }
}

/// What a finished operation did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    /// Unique id, also used in log lines
    pub operation_id: String,
    pub kind: OperationKind,
    pub source: PathBuf,
    /// Where the item ended up. `None` for deletes and for skipped moves and copies.
    pub result_path: Option<PathBuf>,
    /// Sub-items applied on disk and in the mirror
    pub succeeded: usize,
    /// Sub-items left alone because of a `Skip` decision
    pub skipped: usize,
}

impl OperationSummary {
    /// True when a `Skip` decision meant nothing was done at all.
    pub fn was_skipped(&self) -> bool {
        self.succeeded == 0 && self.skipped > 0
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from mutation calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationError {
    /// Rejected before anything happened
    Validation { error: ValidationError },
    /// The resolver cancelled. Nodes a copy already applied are kept.
    CollisionUnresolved { path: String },
    /// Some sub-items didn't complete (vanished, permission denied, ...). Everything that did
    /// is reflected in the mirror.
    PartialFailure {
        operation_id: String,
        failures: Vec<FailedItem>,
    },
    /// Tag read or write failed
    Metadata { error: MetadataError },
    /// Disk changed but the mirror refused the matching edit. A rescan fixes it.
    Inconsistent { path: String, message: String },
    /// The background task running the call panicked or was cancelled
    TaskFailed { message: String },
}

impl MutationError {
    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            MutationError::Validation { error } => error.to_string(),
            MutationError::CollisionUnresolved { path } => {
                format!("Cancelled: \"{}\" already exists at the destination.", path)
            }
            MutationError::PartialFailure { failures, .. } => {
                let mut message = match failures.len() {
                    1 => "1 item couldn't be processed:".to_string(),
                    n => format!("{} items couldn't be processed:", n),
                };
                for failure in failures {
                    message.push_str(&format!("\n  {} ({})", failure.path, failure.cause));
                }
                message
            }
            MutationError::Metadata { error } => error.to_string(),
            MutationError::Inconsistent { path, .. } => {
                format!(
                    "The library view of \"{}\" is out of date. Rescan the library to refresh it.",
                    path
                )
            }
            MutationError::TaskFailed { message } => format!("The operation stopped unexpectedly: {}", message),
        }
    }

    pub(crate) fn inconsistent(path: &Path, err: MirrorError) -> Self {
        MutationError::Inconsistent {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for MutationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { error } => write!(f, "{}", error),
            Self::CollisionUnresolved { path } => write!(f, "Collision not resolved: {}", path),
            Self::PartialFailure { failures, .. } => write!(f, "{} items failed", failures.len()),
            Self::Metadata { error } => write!(f, "{}", error),
            Self::Inconsistent { path, message } => write!(f, "Mirror out of sync at {}: {}", path, message),
            Self::TaskFailed { message } => write!(f, "Task failed: {}", message),
        }
    }
}

impl std::error::Error for MutationError {}

impl From<ValidationError> for MutationError {
    fn from(error: ValidationError) -> Self {
        MutationError::Validation { error }
    }
}

impl From<MetadataError> for MutationError {
    fn from(error: MetadataError) -> Self {
        MutationError::Metadata { error }
    }
}
