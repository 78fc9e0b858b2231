//! A project: a named prefix in the store plus scoped document access.
//!
//! All persisted project state lives under `<project-id>/` in the store.
//! Documents are reached by logical name through `acquire`, which hands out
//! a versioned item; the claims item additionally carries the reactive
//! update hook once the engine has wired it.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::item::{UpdateHook, VersionedItem};
use crate::queue::CLAIMS_ITEM;
use crate::storage::ObjectStore;

pub struct Project {
    id: String,
    store: Arc<dyn ObjectStore>,
    cancel: Arc<AtomicBool>,
    claims_hook: OnceLock<Arc<dyn UpdateHook>>,
}

impl Project {
    pub fn new(store: Arc<dyn ObjectStore>, id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            store,
            cancel: Arc::new(AtomicBool::new(false)),
            claims_hook: OnceLock::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Store key for a logical document name.
    pub(crate) fn key(&self, name: &str) -> String {
        format!("{}/{name}", self.id)
    }

    pub(crate) fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The versioned item for a logical document name.
    pub fn acquire(&self, name: &str) -> VersionedItem {
        let hook = if name == CLAIMS_ITEM {
            self.claims_hook.get().cloned()
        } else {
            None
        };
        VersionedItem::new(
            Arc::clone(&self.store),
            self.key(name),
            Arc::clone(&self.cancel),
            hook,
        )
    }

    /// Install the reactive hook fired after claims-item pushes. One shot;
    /// later calls are ignored.
    pub(crate) fn install_claims_hook(&self, hook: Arc<dyn UpdateHook>) {
        let _ = self.claims_hook.set(hook);
    }

    /// Request hard cancellation of pending writes: in-flight updates stop
    /// pushing at their next checkpoint. Used for abortive shutdown only.
    pub fn cancel_writes(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn writes_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl std::fmt::Display for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
