//! Local write-through cache of session documents.
//!
//! One JSON file per rater. The cache is a backup for inspection and
//! disaster recovery, never a fallback source of truth: loads always go
//! to the remote store. A sibling `.lock` file, held exclusively via
//! `fs2`, refuses a second concurrent interactive session for the same
//! rater.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

pub struct LocalCache {
    dir: PathBuf,
}

/// Exclusive per-rater session lock, released on drop.
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %err, "failed to release session lock");
        }
    }
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache file for a rater: readable prefix plus a stable hash suffix,
    /// so unusual user ids cannot collide or escape the directory.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", sanitize(user_id), fingerprint(user_id)))
    }

    fn lock_path(&self, user_id: &str) -> PathBuf {
        self.path_for(user_id).with_extension("lock")
    }

    /// The cached document, if one exists.
    pub async fn load(&self, user_id: &str) -> Result<Option<Value>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let document = serde_json::from_slice(&bytes)
            .with_context(|| format!("Cache file is not valid JSON: {}", path.display()))?;
        Ok(Some(document))
    }

    /// Write the document through to disk.
    pub async fn save(&self, user_id: &str, document: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let path = self.path_for(user_id);
        let json = serde_json::to_vec(document).context("Failed to serialize session document")?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;

        debug!(path = %path.display(), "session cached locally");
        Ok(())
    }

    /// Remove the cached document. Missing files are not an error.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        remove_if_present(self.path_for(user_id)).await
    }

    /// Remove the cached document and its lock file.
    pub async fn purge(&self, user_id: &str) -> Result<()> {
        self.clear(user_id).await?;
        remove_if_present(self.lock_path(user_id)).await
    }

    /// Take the exclusive session lock for a rater.
    ///
    /// Fails when another live process already holds it.
    pub fn lock_session(&self, user_id: &str) -> Result<SessionLock> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let path = self.lock_path(user_id);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == fs2::lock_contended_error().kind() {
                anyhow::bail!("another session is already running for user '{user_id}'");
            }
            return Err(err)
                .with_context(|| format!("Failed to take session lock: {}", path.display()));
        }

        debug!(path = %path.display(), "session lock taken");
        Ok(SessionLock { file, path })
    }
}

async fn remove_if_present(path: PathBuf) -> Result<()> {
    match fs::remove_file(&path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to remove file: {}", path.display()))
        }
    }
}

fn sanitize(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Stable 12-hex-char suffix derived from the raw user id.
fn fingerprint(user_id: &str) -> String {
    let digest = Sha256::digest(user_id.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn cache_paths_are_sanitized_and_stable() {
        let cache = LocalCache::new("/tmp/cache");

        let path = cache.path_for("alice");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("alice-"));
        assert!(name.ends_with(".json"));
        // 12-char hash between prefix and extension.
        let hash = name
            .trim_start_matches("alice-")
            .trim_end_matches(".json");
        assert_eq!(hash.len(), 12);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        // Same id, same path; hostile ids stay inside the cache directory.
        assert_eq!(path, cache.path_for("alice"));
        let hostile = cache.path_for("../../etc/passwd");
        assert_eq!(hostile.parent(), Some(std::path::Path::new("/tmp/cache")));
    }

    #[test]
    fn distinct_ids_with_same_sanitized_form_do_not_collide() {
        let cache = LocalCache::new("/tmp/cache");
        assert_ne!(cache.path_for("a/b"), cache.path_for("a_b"));
    }

    #[tokio::test]
    async fn save_load_clear_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());

        assert_eq!(cache.load("alice").await.unwrap(), None);

        let doc = json!({"user_id": "alice", "save_count": 2});
        cache.save("alice", &doc).await.unwrap();
        assert_eq!(cache.load("alice").await.unwrap(), Some(doc));

        cache.clear("alice").await.unwrap();
        assert_eq!(cache.load("alice").await.unwrap(), None);
        // Clearing again is fine.
        cache.clear("alice").await.unwrap();
    }

    #[tokio::test]
    async fn lock_refuses_a_second_session() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());

        let held = cache.lock_session("alice").unwrap();
        let second = cache.lock_session("alice");
        assert!(second.is_err());

        // A different rater is unaffected.
        let _other = cache.lock_session("bob").unwrap();

        drop(held);
        cache.lock_session("alice").unwrap();
    }

    #[tokio::test]
    async fn purge_removes_document_and_lock() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());

        cache.save("alice", &json!({})).await.unwrap();
        let lock = cache.lock_session("alice").unwrap();
        drop(lock);
        assert!(cache.path_for("alice").exists());
        assert!(cache.lock_path("alice").exists());

        cache.purge("alice").await.unwrap();
        assert!(!cache.path_for("alice").exists());
        assert!(!cache.lock_path("alice").exists());
    }
}
