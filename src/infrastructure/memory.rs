use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use crate::error::{CommitError, StoreError};
use crate::models::{ChildRecordRequest, LocalFile, StoredObject, TempToken};
use crate::services::commit_backend::CommitBackend;
use crate::services::temp_store::TempObjectStore;
use crate::utils::filename::{content_type_for_name, staged_object_name};
use crate::utils::validation::{FileRules, ValidationError, sanitize_filename, validate_local_file};

/// An object sitting in temporary storage.
#[derive(Debug, Clone)]
pub struct TempObject {
    /// `{YYYYMMDD}_{HHMMSS}_{uuid}_{name}`
    pub stored_name: String,
    pub content_type: String,
    pub bytes: Bytes,
    pub created_at: DateTime<Utc>,
}

/// Temporary storage kept in memory. Tokens are random UUIDs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTempStore {
    objects: Arc<DashMap<String, TempObject>>,
    rules: Option<FileRules>,
}

impl InMemoryTempStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects uploads that break the given rules, as the server would.
    pub fn with_rules(rules: FileRules) -> Self {
        Self {
            objects: Arc::default(),
            rules: Some(rules),
        }
    }

    pub fn stage(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<TempToken, ValidationError> {
        let name = match &self.rules {
            Some(rules) => validate_local_file(file_name, bytes.len() as u64, rules)?,
            None => sanitize_filename(file_name)?,
        };

        let content_type = content_type
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != mime::APPLICATION_OCTET_STREAM.essence_str())
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for_name(&name));

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let token = TempToken::new(id.to_string());
        self.objects.insert(
            token.as_str().to_string(),
            TempObject {
                stored_name: staged_object_name(&name, created_at, id),
                content_type,
                bytes,
                created_at,
            },
        );
        Ok(token)
    }

    pub fn get(&self, token: &str) -> Option<TempObject> {
        self.objects.get(token).map(|o| o.value().clone())
    }

    /// Removes and returns the object; used when a commit claims it.
    pub fn take(&self, token: &str) -> Option<TempObject> {
        self.objects.remove(token).map(|(_, o)| o)
    }

    pub fn remove(&self, token: &str) -> bool {
        self.objects.remove(token).is_some()
    }

    /// Drops objects created before `cutoff`. Returns how many were removed.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, o| o.created_at >= cutoff);
        before.saturating_sub(self.objects.len())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl TempObjectStore for InMemoryTempStore {
    async fn upload(&self, file: &LocalFile) -> Result<TempToken, StoreError> {
        self.stage(&file.name, file.declared_mime_type.as_deref(), file.bytes.clone())
            .map_err(|e| StoreError::Rejected {
                status: 400,
                message: e.to_string(),
            })
    }

    async fn preview(&self, token: &TempToken) -> Result<StoredObject, StoreError> {
        let object = self.get(token.as_str()).ok_or(StoreError::NotFound)?;
        Ok(StoredObject {
            bytes: object.bytes,
            content_type: object.content_type,
            suggested_name: None,
        })
    }

    async fn download(&self, token: &TempToken) -> Result<StoredObject, StoreError> {
        let object = self.get(token.as_str()).ok_or(StoreError::NotFound)?;
        Ok(StoredObject {
            bytes: object.bytes,
            content_type: object.content_type,
            suggested_name: Some(object.stored_name),
        })
    }

    async fn delete(&self, token: &TempToken) -> Result<(), StoreError> {
        self.remove(token.as_str());
        Ok(())
    }
}

/// A committed child record.
#[derive(Debug, Clone, Serialize)]
pub struct DurableRecord {
    pub id: i64,
    pub parent_refs: BTreeMap<String, String>,
    pub title: String,
    pub description: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub is_active: bool,
    pub stored_name: String,
    #[serde(skip)]
    pub bytes: Bytes,
    pub created_at: DateTime<Utc>,
}

/// Durable records kept in memory. Creating a record claims the staged
/// object, so each token can be committed once.
#[derive(Debug, Clone)]
pub struct InMemoryRecordStore {
    temp: InMemoryTempStore,
    records: Arc<DashMap<i64, DurableRecord>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryRecordStore {
    pub fn new(temp: InMemoryTempStore) -> Self {
        Self {
            temp,
            records: Arc::default(),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn create(&self, request: &ChildRecordRequest) -> Result<DurableRecord, CommitError> {
        if request.title.trim().is_empty() {
            return Err(CommitError::Rejected {
                status: 400,
                message: "Title is required".to_string(),
            });
        }

        let object = self
            .temp
            .take(request.token.as_str())
            .ok_or_else(|| CommitError::Rejected {
                status: 404,
                message: format!("Temporary file {} not found", request.token),
            })?;

        let record = DurableRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            parent_refs: request.parent_refs.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            mime_type: request.mime_type.clone(),
            size_bytes: request.size_bytes,
            is_active: request.is_active,
            stored_name: object.stored_name,
            bytes: object.bytes,
            created_at: Utc::now(),
        };
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Option<DurableRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// All records ordered by id.
    pub fn list(&self) -> Vec<DurableRecord> {
        let mut records: Vec<DurableRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CommitBackend for InMemoryRecordStore {
    async fn create_child_record(&self, request: &ChildRecordRequest) -> Result<i64, CommitError> {
        self.create(request).map(|record| record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::filename::strip_staging_prefix;

    fn request(token: TempToken, title: &str) -> ChildRecordRequest {
        ChildRecordRequest {
            parent_refs: BTreeMap::from([("category".to_string(), "news".to_string())]),
            title: title.to_string(),
            description: String::new(),
            token,
            mime_type: "application/pdf".to_string(),
            size_bytes: 4,
            is_active: true,
        }
    }

    #[test]
    fn test_stage_applies_naming_and_rules() {
        let store = InMemoryTempStore::with_rules(FileRules::new(10, ["pdf"]));

        let token = store
            .stage("laporan.pdf", None, Bytes::from_static(b"%PDF"))
            .unwrap();
        let object = store.get(token.as_str()).unwrap();
        assert_eq!(strip_staging_prefix(&object.stored_name), "laporan.pdf");
        assert_eq!(object.content_type, "application/pdf");

        assert!(matches!(
            store.stage("setup.exe", None, Bytes::from_static(b"MZ")),
            Err(ValidationError::InvalidFileType { .. })
        ));
        assert!(matches!(
            store.stage("big.pdf", None, Bytes::from(vec![0u8; 11])),
            Err(ValidationError::FileTooLarge { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_purge_older_than() {
        let store = InMemoryTempStore::new();
        store.stage("a.txt", None, Bytes::from_static(b"a")).unwrap();
        assert_eq!(store.purge_older_than(Utc::now() - chrono::Duration::hours(1)), 0);
        assert_eq!(store.purge_older_than(Utc::now() + chrono::Duration::seconds(1)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_commit_claims_token_once() {
        let temp = InMemoryTempStore::new();
        let records = InMemoryRecordStore::new(temp.clone());
        let token = temp.stage("a.pdf", None, Bytes::from_static(b"%PDF")).unwrap();

        let record = records.create(&request(token.clone(), "Berita")).unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.bytes, Bytes::from_static(b"%PDF"));
        assert!(temp.is_empty());

        assert!(matches!(
            records.create(&request(token, "Berita")),
            Err(CommitError::Rejected { status: 404, .. })
        ));
    }

    #[test]
    fn test_commit_requires_title() {
        let temp = InMemoryTempStore::new();
        let records = InMemoryRecordStore::new(temp.clone());
        let token = temp.stage("a.pdf", None, Bytes::from_static(b"%PDF")).unwrap();

        assert!(matches!(
            records.create(&request(token, "  ")),
            Err(CommitError::Rejected { status: 400, .. })
        ));
        // Token not consumed by a rejected create
        assert_eq!(temp.len(), 1);
    }
}
