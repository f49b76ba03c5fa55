use futures::{StreamExt, stream};
use std::sync::Arc;
use thiserror::Error;

use crate::config::CommitConfig;
use crate::error::CommitError;
use crate::models::{BatchResult, ChildRecordRequest, CommitOutcome, ParentDraft, StagedFileId};
use crate::services::commit_backend::CommitBackend;
use crate::services::upload_controller::StagedUploadController;
use crate::services::validation_gate::{Eligibility, IneligibleReason, ValidationGate};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{0}")]
    Ineligible(#[from] IneligibleReason),

    #[error("A save is already in progress")]
    CommitInProgress,
}

/// Saves a session's staged files as child records, one create call per file.
///
/// Files are committed independently: a failure is recorded and the next file
/// is still attempted. Committed files keep their remote id and are skipped by
/// later submits, so re-submitting after a partial failure only retries the
/// files that failed, reusing their staged objects.
/// A file removed from the session before its turn is skipped and does not
/// appear in the result.
pub struct BatchCommitOrchestrator {
    backend: Arc<dyn CommitBackend>,
    config: CommitConfig,
}

impl BatchCommitOrchestrator {
    pub fn new(backend: Arc<dyn CommitBackend>, config: CommitConfig) -> Self {
        Self { backend, config }
    }

    pub async fn submit(
        &self,
        controller: &StagedUploadController,
    ) -> Result<BatchResult, SubmitError> {
        let _guard = controller
            .begin_commit()
            .ok_or(SubmitError::CommitInProgress)?;

        let (parent, items) = controller.commit_snapshot();
        if let Eligibility::Ineligible(reason) = ValidationGate::check(&parent, &items) {
            tracing::info!("Submit blocked: {}", reason);
            return Err(reason.into());
        }

        let pending: Vec<StagedFileId> = items
            .iter()
            .filter(|i| !i.is_committed())
            .map(|i| i.id)
            .collect();
        tracing::info!("Committing {} staged files", pending.len());

        // `buffered` keeps outcomes in batch order whatever the concurrency
        let parent = &parent;
        let outcomes: Vec<Option<CommitOutcome>> = stream::iter(pending)
            .map(|id| self.commit_one(controller, parent, id))
            .buffered(self.config.commit_concurrency.max(1))
            .collect()
            .await;

        let result = BatchResult::from_outcomes(outcomes.into_iter().flatten().collect());
        if result.is_complete() {
            tracing::info!("{}", result);
        } else {
            tracing::warn!("{}", result);
        }
        Ok(result)
    }

    async fn commit_one(
        &self,
        controller: &StagedUploadController,
        parent: &ParentDraft,
        id: StagedFileId,
    ) -> Option<CommitOutcome> {
        // Files removed while earlier ones were saving are not committed
        let Some(item) = controller.claim_for_commit(id) else {
            tracing::info!("Skipping {}: no longer in the session", id);
            return None;
        };
        let Some(token) = item.token().cloned() else {
            return Some(CommitOutcome::failed(item.id, "File has not been uploaded"));
        };

        let request = ChildRecordRequest {
            parent_refs: parent.refs().clone(),
            title: item.title.trim().to_string(),
            description: item.description.clone(),
            token,
            mime_type: item.mime_type.clone(),
            size_bytes: item.size_bytes,
            is_active: true,
        };

        let result = tokio::time::timeout(
            self.config.commit_timeout,
            self.backend.create_child_record(&request),
        )
        .await
        .unwrap_or(Err(CommitError::Timeout));

        let outcome = match result {
            Ok(remote_id) => {
                controller.record_commit(item.id, remote_id);
                tracing::info!("Committed '{}' as record {}", item.original_name, remote_id);
                CommitOutcome::committed(item.id, remote_id)
            }
            Err(e) => {
                tracing::warn!("Failed to commit '{}': {}", item.original_name, e);
                CommitOutcome::failed(item.id, e.to_string())
            }
        };
        Some(outcome)
    }
}
