//! Dual-write persistence coordinator.
//!
//! Loads always come from the remote store; the local cache only ever
//! receives writes. Saves stamp the audit counters, land locally first,
//! then push to the remote on a background task whose failure is soft:
//! every save carries the complete document, so the next one retries
//! implicitly and last-write-wins stays benign.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::session::{upgrade, SessionState};
use crate::store::{DocumentStore, LocalCache};

pub struct Coordinator {
    remote: Arc<dyn DocumentStore>,
    cache: LocalCache,
}

impl Coordinator {
    pub fn new(remote: Arc<dyn DocumentStore>, cache: LocalCache) -> Self {
        Self { remote, cache }
    }

    /// Load a rater's session.
    ///
    /// The cache is cleared before the fetch so a stale local copy can
    /// never leak into a new session. A remote document goes through the
    /// schema upgrade; no document means a fresh start; a transport error
    /// is the caller's problem, not an excuse to trust the cache.
    pub async fn load(&self, user_id: &str) -> Result<SessionState> {
        self.cache.clear(user_id).await?;

        match self.remote.fetch(user_id).await {
            Ok(Some(document)) => {
                let state = upgrade(user_id, document)?;
                info!(
                    user = user_id,
                    save_count = state.save_count,
                    store = self.remote.name(),
                    "stored session loaded"
                );
                Ok(state)
            }
            Ok(None) => {
                info!(user = user_id, "no stored session; starting fresh");
                Ok(SessionState::new(user_id))
            }
            Err(err) => Err(err).with_context(|| {
                format!(
                    "could not load the session for '{user_id}' from {}",
                    self.remote.name()
                )
            }),
        }
    }

    /// Read a rater's session without touching the cache.
    ///
    /// For status and export views that must not disturb a session another
    /// process may be running.
    pub async fn peek(&self, user_id: &str) -> Result<Option<SessionState>> {
        match self.remote.fetch(user_id).await {
            Ok(Some(document)) => Ok(Some(upgrade(user_id, document)?)),
            Ok(None) => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!(
                    "could not read the session for '{user_id}' from {}",
                    self.remote.name()
                )
            }),
        }
    }

    /// Persist the full session document to both stores.
    ///
    /// The local write is awaited (its failure only warns); the remote
    /// upsert runs on a spawned task and the returned handle resolves to
    /// whether it landed.
    pub async fn save(&self, state: &mut SessionState) -> Result<JoinHandle<bool>> {
        state.mark_saved(Utc::now());
        let document =
            serde_json::to_value(&*state).context("Failed to serialize session document")?;

        if let Err(err) = self.cache.save(&state.user_id, &document).await {
            warn!(user = %state.user_id, error = %err, "local cache write failed");
        }

        let remote = Arc::clone(&self.remote);
        let user_id = state.user_id.clone();
        Ok(tokio::spawn(async move {
            match remote.upsert(&user_id, &document).await {
                Ok(()) => {
                    debug!(user = %user_id, "session saved remotely");
                    true
                }
                Err(err) => {
                    warn!(
                        user = %user_id,
                        error = %err,
                        "remote save failed; the next save retries"
                    );
                    false
                }
            }
        }))
    }

    /// Persist to the local cache only. For exit paths that cannot wait
    /// on the network.
    pub async fn save_local(&self, state: &mut SessionState) -> Result<()> {
        state.mark_saved(Utc::now());
        let document =
            serde_json::to_value(&*state).context("Failed to serialize session document")?;
        self.cache.save(&state.user_id, &document).await
    }

    /// Delete the rater's session everywhere. The remote delete must
    /// succeed before the cache purge runs.
    pub async fn reset(&self, user_id: &str) -> Result<()> {
        self.remote
            .delete(user_id)
            .await
            .with_context(|| format!("could not delete the stored session for '{user_id}'"))?;
        self.cache.purge(user_id).await?;
        info!(user = user_id, "session reset");
        Ok(())
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn remote(&self) -> &dyn DocumentStore {
        &*self.remote
    }
}
