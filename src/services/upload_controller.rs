use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Semaphore, watch};

use crate::config::UploadConfig;
use crate::error::{SessionError, StoreError, UploadError};
use crate::models::{
    Download, LocalFile, MetadataField, ParentDraft, Preview, StagedFile, StagedFileId, TempToken,
    UploadState, UploadStatus,
};
use crate::services::temp_store::TempObjectStore;
use crate::services::tracker::UploadStatusTracker;
use crate::services::validation_gate::{Eligibility, ValidationGate};
use crate::utils::filename::{is_previewable, strip_staging_prefix};
use crate::utils::in_flight::{InFlightUploads, UploadTicket};
use crate::utils::validation::{FileRules, validate_local_file};

/// One file in the session together with the bytes kept for retries.
struct Entry {
    id: StagedFileId,
    title: String,
    description: String,
    original_name: String,
    size_bytes: u64,
    mime_type: String,
    remote_id: Option<i64>,
    upload_attempts: u32,
    selected_at: DateTime<Utc>,
    local: LocalFile,
    tracker: UploadStatusTracker,
}

impl Entry {
    fn snapshot(&self) -> StagedFile {
        StagedFile {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            original_name: self.original_name.clone(),
            size_bytes: self.size_bytes,
            mime_type: self.mime_type.clone(),
            state: self.tracker.current(),
            remote_id: self.remote_id,
            upload_attempts: self.upload_attempts,
            selected_at: self.selected_at,
        }
    }

    /// Token of a staged object nobody has claimed yet.
    fn uncommitted_token(&self) -> Option<TempToken> {
        if self.remote_id.is_some() {
            return None;
        }
        self.tracker.current().token().cloned()
    }
}

#[derive(Default)]
struct Session {
    parent: ParentDraft,
    entries: Vec<Entry>,
    committing: bool,
}

impl Session {
    fn entry(&self, id: StagedFileId) -> Result<&Entry, SessionError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(SessionError::UnknownItem(id))
    }

    fn entry_mut(&mut self, id: StagedFileId) -> Result<&mut Entry, SessionError> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(SessionError::UnknownItem(id))
    }
}

/// Work handed to a spawned upload task.
struct UploadJob {
    ticket: UploadTicket,
    file: LocalFile,
}

/// Owns one create/edit session: the parent draft and the files attached to
/// it. Each file is pushed to temporary storage in its own task as soon as it
/// is added.
///
/// Cloning is cheap and every clone drives the same session. Methods that
/// start uploads must be called from inside a Tokio runtime.
#[derive(Clone)]
pub struct StagedUploadController {
    store: Arc<dyn TempObjectStore>,
    config: Arc<UploadConfig>,
    rules: Arc<FileRules>,
    session: Arc<Mutex<Session>>,
    in_flight: InFlightUploads,
    permits: Option<Arc<Semaphore>>,
}

impl StagedUploadController {
    pub fn new(store: Arc<dyn TempObjectStore>, config: UploadConfig, parent: ParentDraft) -> Self {
        let permits = config
            .max_concurrent_uploads
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            store,
            rules: Arc::new(config.rules()),
            config: Arc::new(config),
            session: Arc::new(Mutex::new(Session {
                parent,
                ..Session::default()
            })),
            in_flight: InFlightUploads::new(),
            permits,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_upload_attempts.max(1)
    }

    /// Attaches a file and starts uploading it. A file that fails the local
    /// size/type check is kept as `Failed` without any network call.
    pub fn add_file(&self, file: LocalFile) -> StagedFile {
        let id = StagedFileId::new();
        let size_bytes = file.size();
        let mime_type = file.mime_type();
        let tracker = UploadStatusTracker::new();

        let checked = validate_local_file(&file.name, size_bytes, &self.rules);
        let local = match &checked {
            Ok(sanitized) => LocalFile {
                name: sanitized.clone(),
                ..file.clone()
            },
            Err(_) => file.clone(),
        };
        if let Err(err) = checked {
            tracing::warn!("Rejected '{}' before upload: {}", file.name, err);
            if let Err(e) = tracker.mark_failed(err.into()) {
                tracing::error!("Upload state rejected local failure: {}", e);
            }
        }

        let mut entry = Entry {
            id,
            title: String::new(),
            description: String::new(),
            original_name: file.name,
            size_bytes,
            mime_type,
            remote_id: None,
            upload_attempts: 0,
            selected_at: Utc::now(),
            local,
            tracker,
        };

        let job = if entry.tracker.status() == UploadStatus::Idle {
            match self.prepare_upload(&mut entry) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::error!("Could not start upload for {}: {}", id, e);
                    None
                }
            }
        } else {
            None
        };

        let snapshot = entry.snapshot();
        self.session().entries.push(entry);

        if let Some(job) = job {
            tracing::info!("Uploading '{}' as {}", snapshot.original_name, id);
            self.spawn_upload(job);
        }
        snapshot
    }

    /// Uploads a failed file again from the bytes kept at selection time.
    ///
    /// Only network failures are retryable. A file rejected by the local
    /// size/type check returns `NotRetryable`, since the same bytes would fail
    /// again; remove it and add a different file instead.
    pub fn retry(&self, id: StagedFileId) -> Result<StagedFile, SessionError> {
        let (snapshot, job) = {
            let mut session = self.session();
            let entry = session.entry_mut(id)?;

            if self.in_flight.is_busy(id) {
                return Err(SessionError::UploadInFlight(id));
            }
            let state = entry.tracker.current();
            match state.error() {
                Some(error) if !error.is_local() => {}
                _ => {
                    return Err(SessionError::NotRetryable {
                        id,
                        status: state.status(),
                    });
                }
            }
            if entry.upload_attempts >= self.max_attempts() {
                return Err(SessionError::RetryLimitReached {
                    id,
                    attempts: entry.upload_attempts,
                });
            }

            let job = self.prepare_upload(entry)?;
            (entry.snapshot(), job)
        };

        tracing::info!("Retrying upload of {} (attempt {})", id, snapshot.upload_attempts);
        self.spawn_upload(job);
        Ok(snapshot)
    }

    /// Takes the file out of the session. An uploading file has its request
    /// cancelled; a staged, uncommitted object is deleted on a best-effort basis.
    pub async fn remove(&self, id: StagedFileId) -> Result<StagedFile, SessionError> {
        let (removed, token) = {
            let mut session = self.session();
            let position = session
                .entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(SessionError::UnknownItem(id))?;
            let entry = session.entries.remove(position);
            if self.in_flight.cancel(id) {
                tracing::debug!("Cancelled in-flight upload of {}", id);
            }
            (entry.snapshot(), entry.uncommitted_token())
        };

        if let Some(token) = token {
            self.discard_object(&token).await;
        }
        Ok(removed)
    }

    pub fn update_metadata(
        &self,
        id: StagedFileId,
        field: MetadataField,
        value: impl Into<String>,
    ) -> Result<StagedFile, SessionError> {
        let mut session = self.session();
        let entry = session.entry_mut(id)?;
        match field {
            MetadataField::Title => entry.title = value.into(),
            MetadataField::Description => entry.description = value.into(),
        }
        Ok(entry.snapshot())
    }

    /// Snapshot of every file, in the order they were added.
    pub fn list_batch(&self) -> Vec<StagedFile> {
        self.session().entries.iter().map(Entry::snapshot).collect()
    }

    pub fn get(&self, id: StagedFileId) -> Option<StagedFile> {
        self.session().entry(id).ok().map(Entry::snapshot)
    }

    pub fn subscribe(&self, id: StagedFileId) -> Result<watch::Receiver<UploadState>, SessionError> {
        Ok(self.session().entry(id)?.tracker.subscribe())
    }

    /// Waits until the file is staged or failed.
    pub async fn wait_settled(&self, id: StagedFileId) -> Result<StagedFile, SessionError> {
        let mut rx = self.subscribe(id)?;
        // The sender lives in the entry, so removal ends the wait with an error
        if rx.wait_for(UploadState::is_settled).await.is_err() {
            return Err(SessionError::UnknownItem(id));
        }
        self.get(id).ok_or(SessionError::UnknownItem(id))
    }

    pub async fn wait_all_settled(&self) -> Vec<StagedFile> {
        let ids: Vec<StagedFileId> = self.session().entries.iter().map(|e| e.id).collect();
        for id in ids {
            // Files removed meanwhile are simply skipped
            let _ = self.wait_settled(id).await;
        }
        self.list_batch()
    }

    /// Fetches the staged object for inline display. Types that cannot be
    /// shown inline come back as `Preview::Unsupported` without a download.
    pub async fn preview(&self, id: StagedFileId) -> Result<Preview, SessionError> {
        let (token, mime_type) = self.staged_token(id)?;
        if mime_type != mime::APPLICATION_OCTET_STREAM.essence_str() && !is_previewable(&mime_type) {
            return Ok(Preview::Unsupported {
                content_type: mime_type,
            });
        }
        let object = self.store.preview(&token).await?;

        let content_type = if object.content_type == mime::APPLICATION_OCTET_STREAM.essence_str() {
            mime_type
        } else {
            object.content_type
        };
        if is_previewable(&content_type) {
            Ok(Preview::Inline {
                content_type,
                bytes: object.bytes,
            })
        } else {
            Ok(Preview::Unsupported { content_type })
        }
    }

    pub async fn download(&self, id: StagedFileId) -> Result<Download, SessionError> {
        let (token, _) = self.staged_token(id)?;
        let object = self.store.download(&token).await?;
        let original_name = self.get(id).map(|f| f.original_name);

        let file_name = object
            .suggested_name
            .as_deref()
            .map(strip_staging_prefix)
            .map(str::to_string)
            .or(original_name)
            .unwrap_or_else(|| token.to_string());

        Ok(Download {
            file_name,
            content_type: object.content_type,
            bytes: object.bytes,
        })
    }

    pub fn set_parent_field(&self, name: impl Into<String>, value: impl Into<String>) {
        self.session().parent.set(name, value);
    }

    pub fn parent_draft(&self) -> ParentDraft {
        self.session().parent.clone()
    }

    /// Runs the submit gate against the current state of the session.
    pub fn check(&self) -> Eligibility {
        let session = self.session();
        let items: Vec<StagedFile> = session.entries.iter().map(Entry::snapshot).collect();
        ValidationGate::check(&session.parent, &items)
    }

    /// Ends the session: running uploads are cancelled, uncommitted staged
    /// objects deleted and the draft emptied.
    pub async fn clear(&self) {
        let tokens: Vec<TempToken> = {
            let mut session = self.session();
            self.in_flight.cancel_all();
            session.parent.clear_values();
            session
                .entries
                .drain(..)
                .filter_map(|e| e.uncommitted_token())
                .collect()
        };

        tracing::info!("Clearing upload session ({} staged objects to discard)", tokens.len());
        for token in tokens {
            self.discard_object(&token).await;
        }
    }

    pub(crate) fn begin_commit(&self) -> Option<CommitGuard> {
        let mut session = self.session();
        if session.committing {
            return None;
        }
        session.committing = true;
        Some(CommitGuard {
            session: Arc::clone(&self.session),
        })
    }

    pub(crate) fn commit_snapshot(&self) -> (ParentDraft, Vec<StagedFile>) {
        let session = self.session();
        let items = session.entries.iter().map(Entry::snapshot).collect();
        (session.parent.clone(), items)
    }

    /// Current snapshot of a file that is still in the session and not yet
    /// committed. Called right before its create request.
    pub(crate) fn claim_for_commit(&self, id: StagedFileId) -> Option<StagedFile> {
        let session = self.session();
        session
            .entry(id)
            .ok()
            .filter(|e| e.remote_id.is_none())
            .map(Entry::snapshot)
    }

    /// Marks the file as committed so later submits skip it.
    pub(crate) fn record_commit(&self, id: StagedFileId, remote_id: i64) {
        match self.session().entry_mut(id) {
            Ok(entry) => entry.remote_id = Some(remote_id),
            Err(_) => tracing::warn!("Committed file {} is no longer in the session", id),
        }
    }

    fn staged_token(&self, id: StagedFileId) -> Result<(TempToken, String), SessionError> {
        let session = self.session();
        let entry = session.entry(id)?;
        let token = entry
            .tracker
            .current()
            .token()
            .cloned()
            .ok_or(SessionError::NotStaged(id))?;
        Ok((token, entry.mime_type.clone()))
    }

    /// Registers the attempt and moves the file to `Uploading`.
    fn prepare_upload(&self, entry: &mut Entry) -> Result<UploadJob, SessionError> {
        let ticket = self
            .in_flight
            .try_begin(entry.id)
            .ok_or(SessionError::UploadInFlight(entry.id))?;

        if let Err(e) = entry.tracker.begin_upload() {
            self.in_flight.finish(&ticket);
            return Err(e.into());
        }
        entry.upload_attempts += 1;

        Ok(UploadJob {
            ticket,
            file: entry.local.clone(),
        })
    }

    fn spawn_upload(&self, job: UploadJob) {
        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = controller.run_upload(&job).await;
            controller.complete_upload(job.ticket, outcome).await;
        });
    }

    /// `None` when the attempt was cancelled before the store answered.
    async fn run_upload(&self, job: &UploadJob) -> Option<Result<TempToken, StoreError>> {
        let cancel = &job.ticket.cancel;

        let _permit = match &self.permits {
            Some(permits) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                permit = Arc::clone(permits).acquire_owned() => permit.ok(),
            },
            None => None,
        };

        tracing::debug!("Uploading {} ({} bytes)", job.file.name, job.file.size());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(self.config.upload_timeout, self.store.upload(&job.file)) => {
                Some(result.unwrap_or(Err(StoreError::Timeout)))
            }
        }
    }

    async fn complete_upload(
        &self,
        ticket: UploadTicket,
        outcome: Option<Result<TempToken, StoreError>>,
    ) {
        let Some(outcome) = outcome else {
            tracing::debug!("Upload of {} cancelled", ticket.id);
            return;
        };

        let orphan = {
            let session = self.session();
            let current = self.in_flight.finish(&ticket);
            match (current, session.entry(ticket.id)) {
                (true, Ok(entry)) => {
                    let applied = match outcome {
                        Ok(token) => {
                            tracing::info!("Staged {} as {}", entry.original_name, token);
                            entry.tracker.mark_staged(token)
                        }
                        Err(err) => {
                            tracing::warn!("Upload of {} failed: {}", entry.original_name, err);
                            entry.tracker.mark_failed(UploadError::from(err))
                        }
                    };
                    if let Err(e) = applied {
                        tracing::error!("Dropped upload result for {}: {}", ticket.id, e);
                    }
                    None
                }
                _ => {
                    tracing::debug!(
                        "Discarding stale response for {} (attempt {})",
                        ticket.id,
                        ticket.attempt
                    );
                    outcome.ok()
                }
            }
        };

        if let Some(token) = orphan {
            self.discard_object(&token).await;
        }
    }

    async fn discard_object(&self, token: &TempToken) {
        if let Err(e) = self.store.delete(token).await {
            tracing::warn!("Failed to delete temporary object {}: {}", token, e);
        }
    }
}

/// Holds the session's commit flag; released on drop.
pub(crate) struct CommitGuard {
    session: Arc<Mutex<Session>>,
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .committing = false;
    }
}
