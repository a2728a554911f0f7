//! Session document persistence.
//!
//! The remote store holds the authoritative copy of every rater's session
//! document; a local cache file keeps a write-through backup. The
//! [`Coordinator`] ties the two together with a dual-write save path and a
//! remote-first load path.

pub mod cache;
pub mod coordinator;
pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// Re-export commonly used types
pub use cache::{LocalCache, SessionLock};
pub use coordinator::Coordinator;
pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// Why a store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never completed (connection, DNS, timeout).
    #[error("remote store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("remote store rejected the request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The stored payload could not be decoded.
    #[error("stored document is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    /// The store is switched off or failing on purpose.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// One keyed JSON document per rater.
///
/// Implementations must be safe to share across tasks; the coordinator
/// runs remote writes on spawned tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable store name, for logs.
    fn name(&self) -> &str;

    /// The stored document for a rater, if one exists.
    async fn fetch(&self, user_id: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or replace the rater's document.
    async fn upsert(&self, user_id: &str, document: &Value) -> Result<(), StoreError>;

    /// Remove the rater's document. Missing documents are not an error.
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<(), StoreError>;
}
