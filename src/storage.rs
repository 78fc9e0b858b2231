//! Object store abstraction.
//!
//! The store is modeled as a versioned key/value blob space: every write
//! bumps an opaque version token, and writes may carry a precondition so
//! callers can do CAS-style coordination (the marker lock relies on this).
//! Backends verify the integrity metadata attached to each push and reject
//! mismatched transfers.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::{Error, Result};

/// Integrity metadata attached to every push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    /// Content length in bytes.
    pub length: u64,
    /// Hex-encoded SHA-256 of the content.
    pub checksum: String,
}

impl BlobMeta {
    /// Compute metadata for a byte slice.
    pub fn of(data: &[u8]) -> Self {
        Self {
            length: data.len() as u64,
            checksum: sha256_hex(data),
        }
    }
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Precondition for conditional writes.
///
/// The version token is opaque; backends interpret it according to their
/// own semantics.
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write only if the object's version matches the given token.
    MatchesVersion(String),
    /// Write unconditionally (last writer wins).
    None,
}

/// Result of a conditional write.
///
/// A failed precondition is a normal result, never an error.
#[derive(Debug, Clone)]
pub enum WriteResult {
    Success { version: String },
    PreconditionFailed { current: String },
}

/// Metadata about a stored object, without its content.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub length: u64,
    pub checksum: String,
    /// Opaque version token for CAS operations.
    pub version: String,
}

/// Storage backend trait.
///
/// All backends verify `BlobMeta` on put: a checksum or length that does
/// not match the payload is rejected with `Error::Storage`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Whether an object exists under the key.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Read the entire object. `Error::NotFound` if it doesn't exist.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Object metadata without content. `None` if it doesn't exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Write with integrity metadata and an optional precondition.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        meta: BlobMeta,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Delete an object. Succeeds even if it doesn't exist.
    async fn delete(&self, key: &str) -> Result<()>;
}

fn verify_meta(data: &Bytes, meta: &BlobMeta) -> Result<()> {
    if meta.length != data.len() as u64 {
        return Err(Error::Storage(format!(
            "length mismatch: declared {} actual {}",
            meta.length,
            data.len()
        )));
    }
    let actual = sha256_hex(data);
    if meta.checksum != actual {
        return Err(Error::Storage(format!(
            "checksum mismatch: declared {} actual {actual}",
            meta.checksum
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory backend
// ---------------------------------------------------------------------------

/// In-memory backend for testing. Thread-safe, numeric versions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredBlob>>,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    meta: BlobMeta,
    version: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().unwrap().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.read().unwrap().get(key).map(|blob| ObjectMeta {
            length: blob.meta.length,
            checksum: blob.meta.checksum.clone(),
            version: blob.version.to_string(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        meta: BlobMeta,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        verify_meta(&data, &meta)?;
        let mut objects = self.objects.write().unwrap();
        let current = objects.get(key);
        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(blob) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current: blob.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(ref token) => match current {
                Some(blob) if blob.version.to_string() == *token => {}
                Some(blob) => {
                    return Ok(WriteResult::PreconditionFailed {
                        current: blob.version.to_string(),
                    });
                }
                None => {
                    return Ok(WriteResult::PreconditionFailed {
                        current: String::new(),
                    });
                }
            },
            WritePrecondition::None => {}
        }
        let version = current.map_or(1, |blob| blob.version + 1);
        objects.insert(key.to_string(), StoredBlob { data, meta, version });
        Ok(WriteResult::Success {
            version: version.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

/// Local-directory backend, one file per key plus a metadata sidecar.
///
/// Data files are written atomically (temp file + rename). Versions are a
/// per-key counter kept in the sidecar; preconditions are serialized through
/// an in-process mutex, so cross-process CAS is not provided — the backend
/// targets single-process CLI and development use.
pub struct FsStore {
    root: PathBuf,
    guard: Mutex<()>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Sidecar {
    length: u64,
    checksum: String,
    version: u64,
}

impl FsStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            guard: Mutex::new(()),
        })
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.meta"))
    }

    fn read_sidecar(&self, key: &str) -> Result<Option<Sidecar>> {
        let path = self.meta_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            Error::Storage(format!("key resolves outside store root: {}", path.display()))
        })?;
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), data)?;
        tmp.persist(path)
            .map_err(|e| Error::Storage(format!("persist {}: {e}", path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data_path(key).exists())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.data_path(key);
        if !path.exists() {
            return Err(Error::NotFound(key.to_string()));
        }
        Ok(Bytes::from(std::fs::read(path)?))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let _held = self.guard.lock().unwrap();
        Ok(self.read_sidecar(key)?.map(|side| ObjectMeta {
            length: side.length,
            checksum: side.checksum,
            version: side.version.to_string(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        meta: BlobMeta,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        verify_meta(&data, &meta)?;
        let _held = self.guard.lock().unwrap();
        let current = self.read_sidecar(key)?;
        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(side) = current.as_ref() {
                    return Ok(WriteResult::PreconditionFailed {
                        current: side.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(ref token) => match current.as_ref() {
                Some(side) if side.version.to_string() == *token => {}
                Some(side) => {
                    return Ok(WriteResult::PreconditionFailed {
                        current: side.version.to_string(),
                    });
                }
                None => {
                    return Ok(WriteResult::PreconditionFailed {
                        current: String::new(),
                    });
                }
            },
            WritePrecondition::None => {}
        }
        let version = current.map_or(1, |side| side.version + 1);
        self.write_atomic(&self.data_path(key), &data)?;
        let side = Sidecar {
            length: meta.length,
            checksum: meta.checksum,
            version,
        };
        self.write_atomic(&self.meta_path(key), serde_json::to_string(&side)?.as_bytes())?;
        Ok(WriteResult::Success {
            version: version.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _held = self.guard.lock().unwrap();
        for path in [self.data_path(key), self.meta_path(key)] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
