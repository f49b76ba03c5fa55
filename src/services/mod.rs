pub mod batch_commit;
pub mod commit_backend;
pub mod temp_store;
pub mod tracker;
pub mod upload_controller;
pub mod validation_gate;
pub mod worker;

pub use batch_commit::{BatchCommitOrchestrator, SubmitError};
pub use commit_backend::{CommitBackend, HttpCommitBackend};
pub use temp_store::{HttpTempObjectStore, TempObjectStore};
pub use tracker::UploadStatusTracker;
pub use upload_controller::StagedUploadController;
pub use validation_gate::{Eligibility, IneligibleReason, ValidationGate};
