use tokio::sync::watch;

use crate::error::{TransitionError, UploadError};
use crate::models::{TempToken, UploadState, UploadStatus};

/// Upload state machine of a single staged file.
///
/// ```text
/// Idle ──► Uploading ──► Staged
///   │          │
///   └──► Failed ◄┘
///          │
///          └──► Uploading (retry)
/// ```
///
/// Every change is published on a watch channel, so each file can be observed
/// on its own.
#[derive(Debug)]
pub struct UploadStatusTracker {
    state: watch::Sender<UploadState>,
}

impl Default for UploadStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadStatusTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self { state }
    }

    /// `Idle -> Uploading` or, on retry, `Failed -> Uploading`. A retry clears
    /// the previous error.
    pub fn begin_upload(&self) -> Result<(), TransitionError> {
        self.transition(UploadState::Uploading)
    }

    pub fn mark_staged(&self, token: TempToken) -> Result<(), TransitionError> {
        self.transition(UploadState::Staged { token })
    }

    /// `Uploading -> Failed`, or `Idle -> Failed` when the local check fails.
    pub fn mark_failed(&self, error: UploadError) -> Result<(), TransitionError> {
        self.transition(UploadState::Failed { error })
    }

    pub fn current(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> UploadStatus {
        self.state.borrow().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    fn transition(&self, next: UploadState) -> Result<(), TransitionError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            let from = state.status();
            let to = next.status();
            if is_allowed(from, to) {
                *state = next;
                true
            } else {
                result = Err(TransitionError { from, to });
                false
            }
        });
        result
    }
}

fn is_allowed(from: UploadStatus, to: UploadStatus) -> bool {
    use UploadStatus::*;
    matches!(
        (from, to),
        (Idle, Uploading) | (Idle, Failed) | (Uploading, Staged) | (Uploading, Failed) | (Failed, Uploading)
    )
}
