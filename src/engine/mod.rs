//! Engine: one reactive project instance per project id.
//!
//! The engine owns the store and the stakeholder brigade, hands out wired
//! reactive projects, and shuts their drain workers down as a group.

pub mod flush;
pub mod reactive;

pub use flush::Flush;
pub use reactive::{ReactiveConfig, Trigger};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::brigade::Brigade;
use crate::project::Project;
use crate::storage::ObjectStore;

pub struct Engine {
    store: Arc<dyn ObjectStore>,
    brigade: Arc<Brigade>,
    config: ReactiveConfig,
    projects: Mutex<HashMap<String, (Arc<Project>, Trigger)>>,
}

impl Engine {
    pub fn new(store: Arc<dyn ObjectStore>, brigade: Arc<Brigade>) -> Self {
        Self::with_config(store, brigade, ReactiveConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ObjectStore>,
        brigade: Arc<Brigade>,
        config: ReactiveConfig,
    ) -> Self {
        Self {
            store,
            brigade,
            config,
            projects: Mutex::new(HashMap::new()),
        }
    }

    /// The reactive project for an id, created and wired on first use.
    ///
    /// One cached instance per id is what guarantees at most one drain
    /// worker per project: all writes funnel through the same trigger.
    pub async fn project(&self, id: &str) -> Arc<Project> {
        let mut projects = self.projects.lock().await;
        if let Some((project, _)) = projects.get(id) {
            return Arc::clone(project);
        }
        let project = Project::new(Arc::clone(&self.store), id);
        let trigger = Trigger::new(&project, Arc::clone(&self.brigade), self.config.clone());
        project.install_claims_hook(Arc::new(trigger.clone()));
        projects.insert(id.to_string(), (Arc::clone(&project), trigger));
        project
    }

    /// Count of currently-active drain workers across all projects.
    pub async fn active_workers(&self) -> usize {
        self.projects
            .lock()
            .await
            .values()
            .filter(|(_, trigger)| trigger.is_active())
            .count()
    }

    /// Graceful shutdown: stop accepting worker submissions, then block
    /// until every active worker has gone idle.
    pub async fn close(&self) {
        let triggers: Vec<Trigger> = self
            .projects
            .lock()
            .await
            .values()
            .map(|(_, trigger)| trigger.clone())
            .collect();
        for trigger in triggers {
            trigger.close().await;
        }
        info!("engine closed");
    }

    /// Abortive shutdown: additionally cancel pending writes, observed at
    /// the pre-push checkpoint, then wait for workers to stop.
    pub async fn abort(&self) {
        let entries: Vec<(Arc<Project>, Trigger)> = self
            .projects
            .lock()
            .await
            .values()
            .map(|(project, trigger)| (Arc::clone(project), trigger.clone()))
            .collect();
        for (project, _) in &entries {
            project.cancel_writes();
        }
        for (_, trigger) in entries {
            trigger.close().await;
        }
        info!("engine aborted");
    }
}
