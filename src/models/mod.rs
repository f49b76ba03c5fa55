mod batch;
mod draft;
mod local_file;
mod object;
mod staged_file;

pub use batch::{BatchResult, ChildRecordRequest, CommitOutcome};
pub use draft::ParentDraft;
pub use local_file::LocalFile;
pub use object::{Download, Preview, StoredObject};
pub use staged_file::{MetadataField, StagedFile, StagedFileId, TempToken, UploadState, UploadStatus};
