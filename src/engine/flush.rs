//! The drain loop: scan, dispatch, remove, repeat until nothing is left.
//!
//! One run is a single drain pass with its own `seen` set. The queue lock
//! is held only while enumerating or removing, never while stakeholders
//! run, so producers are never blocked behind a dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::brigade::Brigade;
use crate::error::Result;
use crate::model::Claim;
use crate::project::Project;
use crate::queue::Claims;

/// Explicit, synchronous drain entry point. The reactive worker runs the
/// same loop in the background.
pub struct Flush {
    project: Arc<Project>,
    brigade: Arc<Brigade>,
}

impl Flush {
    pub fn new(project: Arc<Project>, brigade: Arc<Brigade>) -> Self {
        Self { project, brigade }
    }

    /// One drain pass. Returns how many claims were dispatched.
    ///
    /// A stakeholder failure aborts the pass; the failed claim stays in the
    /// document, unseen, and is re-attempted by the next pass.
    pub async fn run(&self) -> Result<usize> {
        let start = Instant::now();
        let mut seen: HashSet<u64> = HashSet::new();
        while self.next(&mut seen).await? {}
        if !seen.is_empty() {
            info!(
                project = %self.project,
                seen = seen.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "drain pass complete"
            );
        }
        Ok(seen.len())
    }

    /// Scan for the first unseen claim and dispatch it.
    ///
    /// Returns false when no unseen claim remains, which ends the pass.
    async fn next(&self, seen: &mut HashSet<u64>) -> Result<bool> {
        let claims = Claims::new(&self.project);

        let guard = claims.lock().await?;
        let listed = guard.iterate().await;
        guard.release().await?;
        let found: Option<Claim> = listed?
            .into_iter()
            .find(|claim| !seen.contains(&claim.number));

        let Some(claim) = found else {
            return Ok(false);
        };

        let start = Instant::now();
        self.brigade.process(&self.project, &claim).await?;

        // Fully dispatched: removal is what marks the claim delivered. A
        // crash between dispatch and this point is the only window where a
        // later pass can deliver the claim twice.
        let guard = claims.lock().await?;
        let removed = guard.remove(claim.number).await;
        guard.release().await?;
        removed?;
        seen.insert(claim.number);

        info!(
            project = %self.project,
            claim = %claim,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "claim dispatched"
        );
        Ok(true)
    }
}
