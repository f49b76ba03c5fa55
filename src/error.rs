use serde::Serialize;
use thiserror::Error;

use crate::models::{StagedFileId, UploadStatus};
use crate::utils::validation::ValidationError;

/// Why a staged file ended up `Failed`. Stored on the item, never returned to
/// the submit caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadError {
    #[error("File '{file_name}' has a type that is not allowed. Allowed types: {}", .allowed.join(", "))]
    InvalidFileType {
        file_name: String,
        allowed: Vec<String>,
    },

    #[error("File size {size} bytes exceeds maximum allowed {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid file name: {message}")]
    InvalidFileName { message: String },

    #[error("Upload failed: {message}")]
    Transport { message: String },

    #[error("{message}")]
    RejectedByServer { status: Option<u16>, message: String },
}

impl UploadError {
    /// True for failures detected locally, before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            UploadError::InvalidFileType { .. }
                | UploadError::FileTooLarge { .. }
                | UploadError::InvalidFileName { .. }
        )
    }
}

impl From<ValidationError> for UploadError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidFileType { file_name, allowed } => {
                UploadError::InvalidFileType { file_name, allowed }
            }
            ValidationError::FileTooLarge { size, max } => UploadError::FileTooLarge { size, max },
            ValidationError::InvalidFileName(message) => UploadError::InvalidFileName { message },
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected { status, message } => UploadError::RejectedByServer {
                status: Some(status),
                message,
            },
            StoreError::NotFound => UploadError::RejectedByServer {
                status: Some(404),
                message: "Temporary storage endpoint not found".to_string(),
            },
            other => UploadError::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Errors from a `TempObjectStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Temporary object not found")]
    NotFound,

    #[error("Temporary storage rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Temporary storage unreachable: {0}")]
    Transport(String),

    #[error("Temporary storage request timed out")]
    Timeout,

    #[error("Unexpected response from temporary storage: {0}")]
    InvalidResponse(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Errors from a `CommitBackend` implementation.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Commit timed out")]
    Timeout,

    #[error("Unexpected response from backend: {0}")]
    InvalidResponse(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal upload transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: UploadStatus,
    pub to: UploadStatus,
}

/// Errors returned by `StagedUploadController` operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No staged file with id {0}")]
    UnknownItem(StagedFileId),

    #[error("Staged file {id} cannot be retried while {status:?}")]
    NotRetryable {
        id: StagedFileId,
        status: UploadStatus,
    },

    #[error("An upload for staged file {0} is already in flight")]
    UploadInFlight(StagedFileId),

    #[error("Staged file {id} already used {attempts} upload attempts")]
    RetryLimitReached { id: StagedFileId, attempts: u32 },

    #[error("Staged file {0} has no staged object yet")]
    NotStaged(StagedFileId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
