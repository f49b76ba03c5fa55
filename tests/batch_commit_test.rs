use async_trait::async_trait;
use staged_upload::config::{CommitConfig, UploadConfig};
use staged_upload::error::{CommitError, StoreError};
use staged_upload::infrastructure::{InMemoryRecordStore, InMemoryTempStore};
use staged_upload::models::{
    ChildRecordRequest, LocalFile, MetadataField, ParentDraft, StagedFile, StagedFileId,
    StoredObject, TempToken, UploadStatus,
};
use staged_upload::services::{
    BatchCommitOrchestrator, CommitBackend, Eligibility, IneligibleReason, StagedUploadController,
    SubmitError, TempObjectStore,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Temp store that counts uploads, backed by the in-memory store.
struct CountingTempStore {
    inner: InMemoryTempStore,
    uploads: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl CountingTempStore {
    fn new() -> Self {
        Self {
            inner: InMemoryTempStore::new(),
            uploads: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TempObjectStore for CountingTempStore {
    async fn upload(&self, file: &LocalFile) -> Result<TempToken, StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.inner.upload(file).await
    }

    async fn preview(&self, token: &TempToken) -> Result<StoredObject, StoreError> {
        self.inner.preview(token).await
    }

    async fn download(&self, token: &TempToken) -> Result<StoredObject, StoreError> {
        self.inner.download(token).await
    }

    async fn delete(&self, token: &TempToken) -> Result<(), StoreError> {
        self.inner.delete(token).await
    }
}

struct MockBackend {
    requests: Mutex<Vec<ChildRecordRequest>>,
    rejected_titles: Mutex<HashSet<String>>,
    next_id: AtomicI64,
    gate: Option<Arc<Semaphore>>,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            rejected_titles: Mutex::new(HashSet::new()),
            next_id: AtomicI64::new(100),
            gate: None,
        }
    }

    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (backend, gate)
    }

    fn reject_title(&self, title: &str) {
        self.rejected_titles.lock().unwrap().insert(title.to_string());
    }

    fn accept_title(&self, title: &str) {
        self.rejected_titles.lock().unwrap().remove(title);
    }

    fn requests(&self) -> Vec<ChildRecordRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn titles(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.title).collect()
    }
}

#[async_trait]
impl CommitBackend for MockBackend {
    async fn create_child_record(&self, request: &ChildRecordRequest) -> Result<i64, CommitError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.rejected_titles.lock().unwrap().contains(&request.title) {
            return Err(CommitError::Rejected {
                status: 409,
                message: format!("Title '{}' already used", request.title),
            });
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn pdf(name: &str) -> LocalFile {
    LocalFile::new(name, b"%PDF-1.7 body".to_vec()).with_mime_type("application/pdf")
}

fn new_controller(store: Arc<dyn TempObjectStore>) -> StagedUploadController {
    let controller = StagedUploadController::new(
        store,
        UploadConfig::default(),
        ParentDraft::new(["category", "owner_id"]),
    );
    controller.set_parent_field("category", "employee-file");
    controller.set_parent_field("owner_id", "42");
    controller
}

/// Adds titled files and waits until all of them are staged.
async fn staged_batch(controller: &StagedUploadController, titles: &[&str]) -> Vec<StagedFile> {
    for title in titles {
        let added = controller.add_file(pdf(&format!("{title}.pdf")));
        controller
            .update_metadata(added.id, MetadataField::Title, *title)
            .unwrap();
    }
    let batch = tokio::time::timeout(Duration::from_secs(5), controller.wait_all_settled())
        .await
        .unwrap();
    assert!(batch.iter().all(|f| f.status() == UploadStatus::Staged));
    batch
}

fn orchestrator(backend: Arc<dyn CommitBackend>) -> BatchCommitOrchestrator {
    BatchCommitOrchestrator::new(backend, CommitConfig::default())
}

#[tokio::test]
async fn test_partial_failure_continues_past_failed_item() {
    let backend = Arc::new(MockBackend::new());
    backend.reject_title("B");
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    let batch = staged_batch(&controller, &["A", "B", "C"]).await;

    let result = orchestrator(backend.clone())
        .submit(&controller)
        .await
        .unwrap();

    assert_eq!(result.attempted, 3);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed_ids(), vec![batch[1].id]);
    assert!(result.is_partial());
    assert_eq!(result.to_string(), "2 of 3 files saved, 1 failed");
    assert_eq!(
        result.failed[0].error_message.as_deref(),
        Some("Title 'B' already used")
    );

    // C is still attempted after B fails
    assert_eq!(backend.titles(), vec!["A", "B", "C"]);

    let after = controller.list_batch();
    assert!(after[0].is_committed());
    assert!(!after[1].is_committed());
    assert_eq!(after[1].status(), UploadStatus::Staged);
    assert!(after[2].is_committed());
}

#[tokio::test]
async fn test_resubmit_commits_only_failed_items_without_reupload() {
    let backend = Arc::new(MockBackend::new());
    backend.reject_title("B");
    let store = Arc::new(CountingTempStore::new());
    let controller = new_controller(store.clone());
    staged_batch(&controller, &["A", "B", "C"]).await;
    let orchestrator = orchestrator(backend.clone());

    orchestrator.submit(&controller).await.unwrap();
    let first_b_token = backend.requests()[1].token.clone();

    backend.accept_title("B");
    let result = orchestrator.submit(&controller).await.unwrap();

    assert_eq!(result.attempted, 1);
    assert!(result.is_complete());
    let requests = backend.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[3].title, "B");
    assert_eq!(requests[3].token, first_b_token);
    assert_eq!(store.uploads(), 3);
    assert!(controller.list_batch().iter().all(StagedFile::is_committed));

    // Nothing left to commit
    let again = orchestrator.submit(&controller).await.unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(backend.requests().len(), 4);
}

#[tokio::test]
async fn test_requests_carry_parent_refs_and_metadata() {
    let backend = Arc::new(MockBackend::new());
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    let batch = staged_batch(&controller, &["KTP"]).await;
    controller
        .update_metadata(batch[0].id, MetadataField::Description, "Kartu identitas")
        .unwrap();

    let result = orchestrator(backend.clone())
        .submit(&controller)
        .await
        .unwrap();
    assert_eq!(result.committed[0].remote_id, Some(100));

    let request = &backend.requests()[0];
    assert_eq!(request.parent_refs.get("category").map(String::as_str), Some("employee-file"));
    assert_eq!(request.parent_refs.get("owner_id").map(String::as_str), Some("42"));
    assert_eq!(request.description, "Kartu identitas");
    assert_eq!(request.mime_type, "application/pdf");
    assert_eq!(request.size_bytes, 13);
    assert_eq!(Some(&request.token), batch[0].token());
    assert!(request.is_active);
    assert_eq!(controller.get(batch[0].id).unwrap().remote_id, Some(100));
}

#[tokio::test]
async fn test_missing_title_blocks_submit_until_set() {
    let backend = Arc::new(MockBackend::new());
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    let added = controller.add_file(pdf("untitled.pdf"));
    controller.wait_all_settled().await;

    let err = orchestrator(backend.clone())
        .submit(&controller)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Ineligible(IneligibleReason::ItemMissingTitle { id, .. }) if id == added.id
    ));
    assert!(backend.requests().is_empty());

    controller
        .update_metadata(added.id, MetadataField::Title, "Ijazah")
        .unwrap();
    assert_eq!(controller.check(), Eligibility::Eligible);
    assert!(
        orchestrator(backend.clone())
            .submit(&controller)
            .await
            .unwrap()
            .is_complete()
    );
}

#[tokio::test]
async fn test_ineligible_batches_make_no_backend_calls() {
    let backend = Arc::new(MockBackend::new());

    let empty = new_controller(Arc::new(CountingTempStore::new()));
    assert_eq!(
        orchestrator(backend.clone()).submit(&empty).await,
        Err(SubmitError::Ineligible(IneligibleReason::EmptyBatch))
    );

    let missing_owner = StagedUploadController::new(
        Arc::new(CountingTempStore::new()),
        UploadConfig::default(),
        ParentDraft::new(["category", "owner_id"]),
    );
    missing_owner.set_parent_field("category", "news");
    staged_batch(&missing_owner, &["A"]).await;
    assert_eq!(
        orchestrator(backend.clone()).submit(&missing_owner).await,
        Err(SubmitError::Ineligible(IneligibleReason::MissingParentField(
            "owner_id".to_string()
        )))
    );

    let with_rejected_file = new_controller(Arc::new(CountingTempStore::new()));
    staged_batch(&with_rejected_file, &["A"]).await;
    let bad = with_rejected_file.add_file(LocalFile::new("virus.exe", b"MZ".to_vec()));
    with_rejected_file
        .update_metadata(bad.id, MetadataField::Title, "Installer")
        .unwrap();
    assert!(matches!(
        orchestrator(backend.clone()).submit(&with_rejected_file).await,
        Err(SubmitError::Ineligible(IneligibleReason::ItemNotStaged { id, .. })) if id == bad.id
    ));

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_submit_blocked_while_item_uploading() {
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(CountingTempStore {
        gate: Some(gate.clone()),
        ..CountingTempStore::new()
    });
    let backend = Arc::new(MockBackend::new());
    let controller = new_controller(store);

    let added = controller.add_file(pdf("slow.pdf"));
    controller
        .update_metadata(added.id, MetadataField::Title, "Slow")
        .unwrap();

    let err = orchestrator(backend.clone())
        .submit(&controller)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Ineligible(IneligibleReason::ItemStillUploading { .. })
    ));
    assert_eq!(err.to_string(), "File 'slow.pdf' is still uploading");

    gate.add_permits(1);
    controller.wait_settled(added.id).await.unwrap();
    assert!(
        orchestrator(backend)
            .submit(&controller)
            .await
            .unwrap()
            .is_complete()
    );
}

#[tokio::test]
async fn test_second_submit_while_committing_is_rejected() {
    let (backend, gate) = MockBackend::gated();
    let backend = Arc::new(backend);
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    staged_batch(&controller, &["A"]).await;

    let orchestrator = Arc::new(orchestrator(backend.clone()));
    let running = {
        let orchestrator = orchestrator.clone();
        let controller = controller.clone();
        tokio::spawn(async move { orchestrator.submit(&controller).await })
    };

    while backend.requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        orchestrator.submit(&controller).await,
        Err(SubmitError::CommitInProgress)
    );

    gate.add_permits(1);
    let result = running.await.unwrap().unwrap();
    assert!(result.is_complete());
    assert_eq!(backend.requests().len(), 1);

    // The commit flag is released afterwards
    assert_eq!(orchestrator.submit(&controller).await.unwrap().attempted, 0);
}

#[tokio::test]
async fn test_file_removed_during_commit_is_not_saved() {
    let (backend, gate) = MockBackend::gated();
    let backend = Arc::new(backend);
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    let batch = staged_batch(&controller, &["A", "B", "C"]).await;

    let orchestrator = Arc::new(orchestrator(backend.clone()));
    let running = {
        let orchestrator = orchestrator.clone();
        let controller = controller.clone();
        tokio::spawn(async move { orchestrator.submit(&controller).await })
    };

    while backend.requests().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    controller.remove(batch[2].id).await.unwrap();

    gate.add_permits(3);
    let result = running.await.unwrap().unwrap();

    assert_eq!(backend.titles(), vec!["A", "B"]);
    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 2);
    assert!(result.committed.iter().all(|o| o.staged_file_id != batch[2].id));

    let remaining = controller.list_batch();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(StagedFile::is_committed));
}

#[tokio::test]
async fn test_commit_timeout_is_recorded_as_failure() {
    let (backend, _gate) = MockBackend::gated();
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    let batch = staged_batch(&controller, &["A"]).await;

    let orchestrator = BatchCommitOrchestrator::new(
        Arc::new(backend),
        CommitConfig {
            commit_timeout: Duration::from_millis(50),
            ..CommitConfig::default()
        },
    );
    let result = orchestrator.submit(&controller).await.unwrap();

    assert!(result.is_total_failure());
    assert_eq!(
        result.failed[0].error_message.as_deref(),
        Some("Commit timed out")
    );
    let item = controller.get(batch[0].id).unwrap();
    assert!(!item.is_committed());
    assert!(item.token().is_some());
}

#[tokio::test]
async fn test_bounded_concurrency_keeps_batch_order() {
    let backend = Arc::new(MockBackend::new());
    backend.reject_title("D");
    let controller = new_controller(Arc::new(CountingTempStore::new()));
    let batch = staged_batch(&controller, &["A", "B", "C", "D", "E"]).await;

    let orchestrator = BatchCommitOrchestrator::new(
        backend.clone(),
        CommitConfig {
            commit_concurrency: 3,
            ..CommitConfig::default()
        },
    );
    let result = orchestrator.submit(&controller).await.unwrap();

    let committed: Vec<StagedFileId> = result.committed.iter().map(|o| o.staged_file_id).collect();
    assert_eq!(
        committed,
        vec![batch[0].id, batch[1].id, batch[2].id, batch[4].id]
    );
    assert_eq!(result.failed_ids(), vec![batch[3].id]);
}

#[tokio::test]
async fn test_end_to_end_with_in_memory_backend() {
    let temp = InMemoryTempStore::new();
    let records = Arc::new(InMemoryRecordStore::new(temp.clone()));
    let controller = new_controller(Arc::new(temp.clone()));
    staged_batch(&controller, &["Foto", "CV"]).await;
    assert_eq!(temp.len(), 2);

    let result = orchestrator(records.clone())
        .submit(&controller)
        .await
        .unwrap();
    assert!(result.is_complete());
    assert_eq!(result.to_string(), "2 of 2 files saved");

    // Commit claims the staged objects
    assert!(temp.is_empty());
    let saved = records.list();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].title, "Foto");
    assert_eq!(saved[1].title, "CV");

    controller.clear().await;
    assert!(controller.list_batch().is_empty());
    assert_eq!(records.len(), 2);
}
