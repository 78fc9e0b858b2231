//! Stakeholder fan-out.
//!
//! A brigade makes a variable-size set of independent handlers behave as a
//! single handler: one `process` call walks the members in registration
//! order and fails fast on the first error.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::Claim;
use crate::project::Project;

/// A handler invoked with every claim drained from a project's queue.
///
/// Stakeholders may read or write any project document, including posting
/// new claims to the same queue (that is how replies re-enter the drain).
/// Delivery is at-least-once: a stakeholder must tolerate seeing the same
/// claim again after a failed pass.
#[async_trait]
pub trait Stakeholder: Send + Sync {
    async fn process(&self, project: &Arc<Project>, claim: &Claim) -> Result<()>;
}

/// An ordered collection of stakeholders behind the single-stakeholder
/// contract.
pub struct Brigade {
    members: Vec<Arc<dyn Stakeholder>>,
}

impl Brigade {
    pub fn new(members: Vec<Arc<dyn Stakeholder>>) -> Self {
        Self { members }
    }

    /// A brigade with no members; dispatch succeeds without effects.
    pub fn empty() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Dispatch one claim to every member in registration order.
    ///
    /// The first failure aborts the remaining members and surfaces as
    /// `Error::Handler`; earlier members' side effects stay applied.
    pub async fn process(&self, project: &Arc<Project>, claim: &Claim) -> Result<()> {
        for member in &self.members {
            member.process(project, claim).await.map_err(|e| match e {
                Error::Handler { .. } => e,
                other => Error::Handler {
                    number: claim.number,
                    kind: claim.kind.clone(),
                    message: other.to_string(),
                },
            })?;
        }
        Ok(())
    }
}
