//! Reactive trigger: claims-item writes wake a single background worker.
//!
//! The store pushes no notifications, so "new work arrived" is observed at
//! the only place it can be: right after a successful write to the claims
//! document. If the write left the document non-empty and no worker is
//! active for the project, exactly one worker task is started; a triggering
//! write while a worker is active is absorbed, because the active worker's
//! own rescans will pick the new claim up before it goes idle.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::brigade::Brigade;
use crate::item::UpdateHook;
use crate::project::Project;
use crate::queue::Claims;

use super::flush::Flush;

/// Tuning for the worker lifecycle.
#[derive(Debug, Clone)]
pub struct ReactiveConfig {
    /// Consecutive empty drain passes before the worker goes idle.
    pub empty_scans: u32,
    /// Pause between empty passes while winding down.
    pub rescan_pause: Duration,
    /// Poll interval while shutdown waits for worker idleness.
    pub close_poll: Duration,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            empty_scans: 3,
            rescan_pause: Duration::from_millis(50),
            close_poll: Duration::from_millis(100),
        }
    }
}

/// Per-project worker state: the alive flag plus single-slot submission.
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

struct TriggerInner {
    project: Weak<Project>,
    brigade: Arc<Brigade>,
    config: ReactiveConfig,
    alive: AtomicBool,
    closed: AtomicBool,
}

impl Trigger {
    pub fn new(project: &Arc<Project>, brigade: Arc<Brigade>, config: ReactiveConfig) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                project: Arc::downgrade(project),
                brigade,
                config,
                alive: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Whether a drain worker is currently running.
    pub fn is_active(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Stop accepting worker submissions, then block until the active
    /// worker (if any) reports idle. Must complete before the project's
    /// resources are released, or claims delivered but not yet removed
    /// could be dropped on restart.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        while self.inner.alive.load(Ordering::SeqCst) {
            tokio::time::sleep(self.inner.config.close_poll).await;
        }
        if let Some(project) = self.inner.project.upgrade() {
            info!(project = %project, "reactive trigger closed");
        }
    }
}

#[async_trait]
impl UpdateHook for Trigger {
    async fn after_update(&self) {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let Some(project) = inner.project.upgrade() else {
            return;
        };
        let pending = match Claims::new(&project).peek_len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(project = %project, error = %e, "cannot inspect claims after write");
                return;
            }
        };
        if pending == 0 {
            return;
        }
        if inner
            .alive
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(project = %project, pending, "starting drain worker");
            tokio::spawn(drain_worker(Arc::clone(inner), project));
        }
    }
}

/// Background worker: drain passes until several consecutive passes find
/// nothing, then clear the alive flag.
async fn drain_worker(inner: Arc<TriggerInner>, project: Arc<Project>) {
    let flush = Flush::new(Arc::clone(&project), Arc::clone(&inner.brigade));
    let mut idle_scans = 0u32;
    while idle_scans < inner.config.empty_scans {
        if project.writes_cancelled() {
            break;
        }
        match flush.run().await {
            Ok(0) => {
                idle_scans += 1;
                if idle_scans < inner.config.empty_scans {
                    tokio::time::sleep(inner.config.rescan_pause).await;
                }
            }
            Ok(_) => idle_scans = 0,
            Err(e) => {
                // Failed claims stay in the document; the next triggering
                // write restarts the worker, so transient storage outages
                // self-heal.
                error!(project = %project, error = %e, "drain pass aborted");
                break;
            }
        }
    }
    inner.alive.store(false, Ordering::SeqCst);
    debug!(project = %project, "drain worker idle");
}
