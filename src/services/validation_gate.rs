use thiserror::Error;

use crate::models::{ParentDraft, StagedFile, StagedFileId, UploadStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    #[error("Please add at least one file")]
    EmptyBatch,

    #[error("Field '{0}' is required")]
    MissingParentField(String),

    #[error("File '{file_name}' is still uploading")]
    ItemStillUploading {
        id: StagedFileId,
        file_name: String,
    },

    #[error("File '{file_name}' has not been uploaded successfully")]
    ItemNotStaged {
        id: StagedFileId,
        file_name: String,
    },

    #[error("File '{file_name}' needs a title")]
    ItemMissingTitle {
        id: StagedFileId,
        file_name: String,
    },
}

impl IneligibleReason {
    /// Staged file the reason points at, if any.
    pub fn item_id(&self) -> Option<StagedFileId> {
        match self {
            IneligibleReason::ItemStillUploading { id, .. }
            | IneligibleReason::ItemNotStaged { id, .. }
            | IneligibleReason::ItemMissingTitle { id, .. } => Some(*id),
            IneligibleReason::EmptyBatch | IneligibleReason::MissingParentField(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Decides whether a draft and its files may be submitted.
pub struct ValidationGate;

impl ValidationGate {
    pub fn check(parent: &ParentDraft, items: &[StagedFile]) -> Eligibility {
        match Self::first_problem(parent, items) {
            Some(reason) => Eligibility::Ineligible(reason),
            None => Eligibility::Eligible,
        }
    }

    fn first_problem(parent: &ParentDraft, items: &[StagedFile]) -> Option<IneligibleReason> {
        if items.is_empty() {
            return Some(IneligibleReason::EmptyBatch);
        }

        if let Some(field) = parent.first_missing_field() {
            return Some(IneligibleReason::MissingParentField(field.to_string()));
        }

        items.iter().find_map(|item| {
            let id = item.id;
            let file_name = item.original_name.clone();
            match item.status() {
                UploadStatus::Uploading => {
                    return Some(IneligibleReason::ItemStillUploading { id, file_name });
                }
                UploadStatus::Idle | UploadStatus::Failed => {
                    return Some(IneligibleReason::ItemNotStaged { id, file_name });
                }
                UploadStatus::Staged => {}
            }
            if item.token().is_none() {
                return Some(IneligibleReason::ItemNotStaged { id, file_name });
            }
            if !item.has_title() {
                return Some(IneligibleReason::ItemMissingTitle { id, file_name });
            }
            None
        })
    }
}
