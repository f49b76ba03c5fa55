use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{StagedFileId, TempToken};

/// Payload of one create call against the commit endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecordRequest {
    pub parent_refs: BTreeMap<String, String>,
    pub title: String,
    pub description: String,
    pub token: TempToken,
    pub mime_type: String,
    pub size_bytes: u64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub staged_file_id: StagedFileId,
    pub success: bool,
    pub remote_id: Option<i64>,
    pub error_message: Option<String>,
}

impl CommitOutcome {
    pub fn committed(staged_file_id: StagedFileId, remote_id: i64) -> Self {
        Self {
            staged_file_id,
            success: true,
            remote_id: Some(remote_id),
            error_message: None,
        }
    }

    pub fn failed(staged_file_id: StagedFileId, message: impl Into<String>) -> Self {
        Self {
            staged_file_id,
            success: false,
            remote_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// Aggregate of one submit. Full success, partial failure and total failure
/// are all just values of this type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<CommitOutcome>,
    pub committed: Vec<CommitOutcome>,
}

impl BatchResult {
    pub fn from_outcomes(outcomes: Vec<CommitOutcome>) -> Self {
        let attempted = outcomes.len();
        let (committed, failed): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|o| o.success);
        Self {
            attempted,
            succeeded: committed.len(),
            failed,
            committed,
        }
    }

    /// Everything attempted was saved; the session can be closed.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.attempted
    }

    pub fn is_partial(&self) -> bool {
        self.succeeded > 0 && self.succeeded < self.attempted
    }

    pub fn is_total_failure(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }

    pub fn failed_ids(&self) -> Vec<StagedFileId> {
        self.failed.iter().map(|o| o.staged_file_id).collect()
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempted == 0 {
            return f.write_str("Nothing to save");
        }
        if self.is_complete() {
            return write!(f, "{} of {} files saved", self.succeeded, self.attempted);
        }
        write!(
            f,
            "{} of {} files saved, {} failed",
            self.succeeded,
            self.attempted,
            self.failed.len()
        )
    }
}
