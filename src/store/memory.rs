//! In-process document store.
//!
//! Backs offline runs and tests. Failure injection flips every operation
//! into [`StoreError::Unavailable`] so callers can exercise their soft
//! failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::{DocumentStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    failing: AtomicBool,
    upserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of completed upserts.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Direct read of a stored document, bypassing failure injection.
    pub fn document(&self, user_id: &str) -> Option<Value> {
        self.documents.lock().ok()?.get(user_id).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "failure injected".to_string(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map only means a test panicked mid-write.
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        self.check_available()?;
        Ok(self.lock().get(user_id).cloned())
    }

    async fn upsert(&self, user_id: &str, document: &Value) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().insert(user_id.to_string(), document.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().remove(user_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
