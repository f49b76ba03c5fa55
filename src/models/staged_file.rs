use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::UploadError;

/// Locally generated identifier of a staged file. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagedFileId(Uuid);

impl StagedFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StagedFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StagedFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque server-issued handle for an object in temporary storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempToken(String);

impl TempToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Idle,
    Uploading,
    Staged,
    Failed,
}

/// Upload state of one staged file. The token only exists in `Staged` and the
/// error only in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Uploading,
    Staged { token: TempToken },
    Failed { error: UploadError },
}

impl UploadState {
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadState::Idle => UploadStatus::Idle,
            UploadState::Uploading => UploadStatus::Uploading,
            UploadState::Staged { .. } => UploadStatus::Staged,
            UploadState::Failed { .. } => UploadStatus::Failed,
        }
    }

    pub fn token(&self) -> Option<&TempToken> {
        match self {
            UploadState::Staged { token } => Some(token),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UploadError> {
        match self {
            UploadState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Staged or failed; nothing left to wait for.
    pub fn is_settled(&self) -> bool {
        matches!(self, UploadState::Staged { .. } | UploadState::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Title,
    Description,
}

/// Read-only snapshot of one file attached to the draft.
#[derive(Debug, Clone, Serialize)]
pub struct StagedFile {
    pub id: StagedFileId,
    pub title: String,
    pub description: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    #[serde(flatten)]
    pub state: UploadState,
    /// Id of the durable record once this file has been committed.
    pub remote_id: Option<i64>,
    pub upload_attempts: u32,
    pub selected_at: DateTime<Utc>,
}

impl StagedFile {
    pub fn status(&self) -> UploadStatus {
        self.state.status()
    }

    pub fn token(&self) -> Option<&TempToken> {
        self.state.token()
    }

    pub fn error_message(&self) -> Option<String> {
        self.state.error().map(|e| e.to_string())
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.remote_id.is_some()
    }
}
