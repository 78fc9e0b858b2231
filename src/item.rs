//! Versioned remote item: scoped read/update over one stored object.
//!
//! Remote content is staged into a local scratch file, the caller mutates
//! the file, and the item pushes back only when the content checksum
//! actually changed. The scratch file is removed on every exit path.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{BlobMeta, ObjectStore, WritePrecondition, sha256_hex};

/// Observer notified after a successful push to a watched item.
///
/// The reactive trigger installs itself as the hook on the claims item.
#[async_trait]
pub trait UpdateHook: Send + Sync {
    async fn after_update(&self);
}

/// One remote object with read/update access through local staging.
pub struct VersionedItem {
    store: Arc<dyn ObjectStore>,
    key: String,
    cancel: Arc<AtomicBool>,
    hook: Option<Arc<dyn UpdateHook>>,
}

impl VersionedItem {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        key: String,
        cancel: Arc<AtomicBool>,
        hook: Option<Arc<dyn UpdateHook>>,
    ) -> Self {
        Self {
            store,
            key,
            cancel,
            hook,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stage the remote content and apply `transform` to the scratch path.
    ///
    /// A missing remote object stages as an empty file; any other storage
    /// failure surfaces. The scratch file is removed whether `transform`
    /// succeeds or fails.
    pub async fn read<T, F>(&self, transform: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T> + Send,
    {
        let scratch = tempfile::NamedTempFile::new()?;
        self.stage(scratch.path()).await?;
        transform(scratch.path())
    }

    /// Stage, mutate, and push back only if the content changed.
    ///
    /// The checksum is taken over the staged bytes before and after the
    /// mutator runs; equal checksums mean no remote write at all. A
    /// cancellation request is honored at the last moment before the push.
    pub async fn update<F>(&self, mutator: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()> + Send,
    {
        let scratch = tempfile::NamedTempFile::new()?;
        self.stage(scratch.path()).await?;
        let before = checksum_file(scratch.path())?;
        mutator(scratch.path())?;
        let after = checksum_file(scratch.path())?;
        if before == after {
            return Ok(());
        }
        let data = Bytes::from(tokio::fs::read(scratch.path()).await?);
        let meta = BlobMeta {
            length: data.len() as u64,
            checksum: after,
        };
        // Last checkpoint before the network call: a long mutation may have
        // outlived a shutdown request.
        if self.cancel.load(Ordering::SeqCst) {
            debug!(key = %self.key, "push skipped: cancellation requested");
            return Ok(());
        }
        self.store
            .put(&self.key, data, meta, WritePrecondition::None)
            .await?;
        debug!(key = %self.key, "pushed updated content");
        if let Some(hook) = &self.hook {
            hook.after_update().await;
        }
        Ok(())
    }

    async fn stage(&self, path: &Path) -> Result<()> {
        match self.store.get(&self.key).await {
            Ok(data) => Ok(tokio::fs::write(path, &data).await?),
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn checksum_file(path: &Path) -> Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}
