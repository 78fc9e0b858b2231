//! Mutual exclusion via a marker object in the store.
//!
//! The store has no native locking, so a conventionally-named marker object
//! stands in: acquisition writes the marker with a does-not-exist
//! precondition, which at most one writer can win. Markers carry a TTL so a
//! crashed holder cannot wedge the queue; an expired marker is taken over
//! with a version CAS, closing the race between two would-be successors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{BlobMeta, ObjectStore, WritePrecondition, WriteResult};

/// How long a held marker stays valid before takeover is allowed.
pub const LOCK_TTL: Duration = Duration::from_secs(10);

/// Total time a caller will wait for a busy lock before giving up.
pub const MAX_WAIT: Duration = Duration::from_secs(30);

const BACKOFF_BASE: Duration = Duration::from_millis(20);
const BACKOFF_MAX: Duration = Duration::from_millis(500);

/// Marker object contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl LockInfo {
    fn new(holder: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder: holder.to_string(),
            acquired: now,
            expires: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(10)),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires
    }
}

/// A lock over one store key.
pub struct ItemLock {
    store: Arc<dyn ObjectStore>,
    key: String,
    holder: String,
}

impl ItemLock {
    /// Each lock instance gets its own holder id.
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            holder: Uuid::new_v4().to_string(),
        }
    }

    /// Block (with bounded backoff) until the marker is ours.
    ///
    /// Returns `Error::LockBusy` if the lock is still held when the wait
    /// budget runs out.
    pub async fn acquire(&self) -> Result<LockToken> {
        let deadline = tokio::time::Instant::now() + MAX_WAIT;
        let mut backoff = BACKOFF_BASE;
        loop {
            match self.try_acquire().await? {
                Some(token) => return Ok(token),
                None => {
                    if tokio::time::Instant::now() >= deadline {
                        let holder = match self.read_marker().await? {
                            Some(info) => info.holder,
                            None => "unknown".to_string(),
                        };
                        return Err(Error::LockBusy {
                            key: self.key.clone(),
                            holder,
                        });
                    }
                    tokio::time::sleep(backoff + Duration::from_millis(jitter())).await;
                    backoff = backoff.saturating_mul(2).min(BACKOFF_MAX);
                }
            }
        }
    }

    /// One acquisition attempt. `None` means the lock is held by someone
    /// else and not expired.
    async fn try_acquire(&self) -> Result<Option<LockToken>> {
        let info = LockInfo::new(&self.holder, LOCK_TTL);
        let body = bytes::Bytes::from(serde_json::to_vec(&info)?);
        let meta = BlobMeta::of(&body);
        match self
            .store
            .put(&self.key, body, meta, WritePrecondition::DoesNotExist)
            .await?
        {
            WriteResult::Success { version } => {
                return Ok(Some(self.token(version)));
            }
            WriteResult::PreconditionFailed { .. } => {}
        }

        // Marker exists. Bind the takeover decision to the version we read,
        // so a competing successor loses the CAS instead of double-acquiring.
        let Some(current) = self.store.head(&self.key).await? else {
            return Ok(None);
        };
        let Some(existing) = self.read_marker().await? else {
            return Ok(None);
        };
        if !existing.is_expired() {
            return Ok(None);
        }

        warn!(key = %self.key, stale = %existing.holder, "taking over expired lock");
        let info = LockInfo::new(&self.holder, LOCK_TTL);
        let body = bytes::Bytes::from(serde_json::to_vec(&info)?);
        let meta = BlobMeta::of(&body);
        match self
            .store
            .put(
                &self.key,
                body,
                meta,
                WritePrecondition::MatchesVersion(current.version),
            )
            .await?
        {
            WriteResult::Success { version } => Ok(Some(self.token(version))),
            WriteResult::PreconditionFailed { .. } => Ok(None),
        }
    }

    async fn read_marker(&self) -> Result<Option<LockInfo>> {
        match self.store.get(&self.key).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn token(&self, version: String) -> LockToken {
        debug!(key = %self.key, "lock acquired");
        LockToken {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            holder: self.holder.clone(),
            version,
        }
    }
}

/// Proof of a held lock. Must be released explicitly; an unreleased token
/// expires via TTL.
pub struct LockToken {
    store: Arc<dyn ObjectStore>,
    key: String,
    holder: String,
    version: String,
}

impl LockToken {
    /// Release by writing an already-expired marker under our version.
    ///
    /// A plain delete could remove a successor's marker if takeover
    /// happened in between; the CAS write fails instead and leaves the
    /// successor's marker intact.
    pub async fn release(self) -> Result<()> {
        let mut info = LockInfo::new(&self.holder, Duration::ZERO);
        info.expires = Utc::now() - chrono::Duration::seconds(1);
        let body = bytes::Bytes::from(serde_json::to_vec(&info)?);
        let meta = BlobMeta::of(&body);
        let _ = self
            .store
            .put(
                &self.key,
                body,
                meta,
                WritePrecondition::MatchesVersion(self.version),
            )
            .await?;
        debug!(key = %self.key, "lock released");
        Ok(())
    }
}

/// Small random-ish jitter so competing waiters don't retry in lockstep.
fn jitter() -> u64 {
    use std::time::SystemTime;
    u64::from(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    ) % 15
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn acquire_and_release() {
        let store = Arc::new(MemoryStore::new());
        let lock = ItemLock::new(store.clone(), "p1/claims.lock");
        let token = lock.acquire().await.unwrap();
        token.release().await.unwrap();

        // Released marker is expired, so a fresh holder can take over.
        let again = ItemLock::new(store, "p1/claims.lock");
        let token = again.acquire().await.unwrap();
        token.release().await.unwrap();
    }

    #[tokio::test]
    async fn second_holder_waits_for_release() {
        let store = Arc::new(MemoryStore::new());
        let first = ItemLock::new(store.clone(), "p1/claims.lock");
        let token = first.acquire().await.unwrap();

        let second = ItemLock::new(store.clone(), "p1/claims.lock");
        let waiter = tokio::spawn(async move { second.acquire().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        token.release().await.unwrap();
        let token = waiter.await.unwrap().unwrap();
        token.release().await.unwrap();
    }
}
