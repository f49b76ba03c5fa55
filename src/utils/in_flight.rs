use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::models::StagedFileId;

/// Registry of running uploads keyed by staged file id.
///
/// At most one upload per id is registered. Every upload gets a unique attempt
/// number, so a response coming back for an attempt that is no longer
/// registered (cancelled, removed, superseded) can be recognised as stale.
#[derive(Debug, Clone, Default)]
pub struct InFlightUploads {
    uploads: Arc<DashMap<StagedFileId, InFlight>>,
    next_attempt: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
struct InFlight {
    attempt: u64,
    cancel: CancellationToken,
}

/// Handed to the task performing one upload attempt.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub id: StagedFileId,
    pub attempt: u64,
    pub cancel: CancellationToken,
}

impl InFlightUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new attempt, or returns `None` while one is still running.
    pub fn try_begin(&self, id: StagedFileId) -> Option<UploadTicket> {
        match self.uploads.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                slot.insert(InFlight {
                    attempt,
                    cancel: cancel.clone(),
                });
                Some(UploadTicket {
                    id,
                    attempt,
                    cancel,
                })
            }
        }
    }

    /// Unregisters the attempt. Returns false if the ticket is stale.
    pub fn finish(&self, ticket: &UploadTicket) -> bool {
        self.uploads
            .remove_if(&ticket.id, |_, running| running.attempt == ticket.attempt)
            .is_some()
    }

    /// Cancels and unregisters whatever attempt is running for `id`.
    pub fn cancel(&self, id: StagedFileId) -> bool {
        match self.uploads.remove(&id) {
            Some((_, running)) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        self.uploads.retain(|_, running| {
            running.cancel.cancel();
            false
        });
    }

    pub fn is_busy(&self, id: StagedFileId) -> bool {
        self.uploads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }
}
