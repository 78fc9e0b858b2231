//! Per-project claims queue behind mutually-exclusive scoped access.
//!
//! The queue is one JSON document (`claims.json`) holding the ordered
//! pending claims plus the persisted next-number counter. Because several
//! processes may share a project's storage, every enumeration or mutation
//! happens under the store-level marker lock; the lock is held for a single
//! operation, never across a drain pass.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::{ItemLock, LockToken};
use crate::model::{Claim, ClaimDraft};
use crate::project::Project;

/// Logical name of the claims document.
pub const CLAIMS_ITEM: &str = "claims.json";

/// Logical name of the queue's lock marker.
pub const CLAIMS_LOCK: &str = "claims.lock";

#[derive(Debug, Serialize, Deserialize)]
struct ClaimsDoc {
    /// Next number to assign. Persisted so numbers survive deletion and
    /// are never reused.
    next: u64,
    claims: Vec<Claim>,
}

impl Default for ClaimsDoc {
    fn default() -> Self {
        Self {
            next: 1,
            claims: Vec::new(),
        }
    }
}

fn load_doc(path: &Path) -> Result<ClaimsDoc> {
    let raw = std::fs::read(path)?;
    if raw.is_empty() {
        return Ok(ClaimsDoc::default());
    }
    Ok(serde_json::from_slice(&raw)?)
}

fn save_doc(path: &Path, doc: &ClaimsDoc) -> Result<()> {
    Ok(std::fs::write(path, serde_json::to_string_pretty(doc)?)?)
}

/// Handle on a project's claims queue.
pub struct Claims {
    project: Arc<Project>,
}

impl Claims {
    pub fn new(project: &Arc<Project>) -> Self {
        Self {
            project: Arc::clone(project),
        }
    }

    /// Acquire exclusive access to the queue. Blocks while another holder
    /// (in this process or any other sharing the store) has it.
    pub async fn lock(&self) -> Result<ClaimsGuard> {
        let lock = ItemLock::new(
            Arc::clone(self.project.store()),
            self.project.key(CLAIMS_LOCK),
        );
        let token = lock.acquire().await?;
        Ok(ClaimsGuard {
            project: Arc::clone(&self.project),
            token,
        })
    }

    /// Unlocked count of pending claims. Only for the reactive trigger's
    /// non-empty check; anything that acts on the contents must lock.
    pub async fn peek_len(&self) -> Result<usize> {
        let item = self.project.acquire(CLAIMS_ITEM);
        item.read(|path| Ok(load_doc(path)?.claims.len())).await
    }
}

/// Exclusive access to one project's queue, released explicitly.
pub struct ClaimsGuard {
    project: Arc<Project>,
    token: LockToken,
}

impl ClaimsGuard {
    /// All pending claims in document (insertion) order.
    pub async fn iterate(&self) -> Result<Vec<Claim>> {
        let item = self.project.acquire(CLAIMS_ITEM);
        item.read(|path| Ok(load_doc(path)?.claims)).await
    }

    /// Number of pending claims.
    pub async fn len(&self) -> Result<usize> {
        let item = self.project.acquire(CLAIMS_ITEM);
        item.read(|path| Ok(load_doc(path)?.claims.len())).await
    }

    /// Append a claim, assigning the next unused number.
    pub async fn post(&self, draft: ClaimDraft) -> Result<Claim> {
        let item = self.project.acquire(CLAIMS_ITEM);
        let mut posted: Option<Claim> = None;
        item.update(|path| {
            let mut doc = load_doc(path)?;
            let number = doc.next;
            doc.next += 1;
            let claim = draft.into_claim(number);
            doc.claims.push(claim.clone());
            save_doc(path, &doc)?;
            posted = Some(claim);
            Ok(())
        })
        .await?;
        let claim = posted.ok_or_else(|| Error::Other("claim was not recorded".to_string()))?;
        debug!(project = %self.project, claim = %claim, "claim posted");
        Ok(claim)
    }

    /// Like [`post`](Self::post), but reject the draft when a pending claim
    /// with the same kind and token already exists.
    pub async fn post_unique(&self, draft: ClaimDraft) -> Result<Claim> {
        let item = self.project.acquire(CLAIMS_ITEM);
        let mut posted: Option<Claim> = None;
        item.update(|path| {
            let mut doc = load_doc(path)?;
            if doc
                .claims
                .iter()
                .any(|c| c.kind == draft.kind && c.token == draft.token)
            {
                return Err(Error::Duplicate(format!(
                    "claim {} is already pending",
                    draft.kind()
                )));
            }
            let number = doc.next;
            doc.next += 1;
            let claim = draft.into_claim(number);
            doc.claims.push(claim.clone());
            save_doc(path, &doc)?;
            posted = Some(claim);
            Ok(())
        })
        .await?;
        let claim = posted.ok_or_else(|| Error::Other("claim was not recorded".to_string()))?;
        debug!(project = %self.project, claim = %claim, "claim posted");
        Ok(claim)
    }

    /// Delete a fully-delivered claim from the document. Removing a number
    /// that is no longer present is a no-op.
    pub async fn remove(&self, number: u64) -> Result<()> {
        let item = self.project.acquire(CLAIMS_ITEM);
        item.update(|path| {
            let mut doc = load_doc(path)?;
            doc.claims.retain(|c| c.number != number);
            save_doc(path, &doc)
        })
        .await
    }

    /// Release the queue lock.
    pub async fn release(self) -> Result<()> {
        self.token.release().await
    }
}
