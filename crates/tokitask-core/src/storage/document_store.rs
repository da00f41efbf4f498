use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by document store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Requested document does not exist.
    #[error("document not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Key under which a user's aggregate document lives.
pub fn user_document_key(user_id: &str) -> String {
    format!("users/{user_id}")
}

/// Remote document store contract: whole-document reads and writes, no transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace the document stored under `key`.
    async fn put(&self, key: &str, document: &[u8]) -> Result<(), StoreError>;

    /// Fetch the document stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove a document (idempotent).
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store used by tests and offline runs.
///
/// Writes can be made to fail on demand to exercise rollback paths.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every `put` and `delete` returns a storage failure.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw bytes currently stored under `key`, if any.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.documents
            .lock()
            .ok()
            .and_then(|docs| docs.get(key).cloned())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Storage {
                reason: "write rejected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, key: &str, document: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut docs = self.documents.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        docs.insert(key.to_string(), document.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let docs = self.documents.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        docs.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut docs = self.documents.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        docs.remove(key);
        Ok(())
    }
}
