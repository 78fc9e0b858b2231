//! Core data model.
//!
//! A claim is an event posted to a project's queue. It has identity (a
//! per-project monotonic number), a kind (the event name), an optional
//! correlation token, and an opaque payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// An event record tracked in a project's claims document.
///
/// Claims are immutable once posted: a response to a claim is a brand-new
/// claim with a fresh number and (usually) the same token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Per-project monotonic number, assigned by the queue at post time.
    /// Never reused, even after the claim is removed.
    pub number: u64,

    /// What kind of event this is (e.g. "ping", "order-start").
    pub kind: String,

    /// Correlation token linking related claims. A reply carries the same
    /// token as the claim it answers. None means uncorrelated.
    pub token: Option<String>,

    /// Arbitrary parameters for the stakeholders. The engine doesn't
    /// interpret these.
    pub params: serde_json::Value,

    /// When the claim was posted.
    pub created: DateTime<Utc>,
}

impl Claim {
    /// Look up a single parameter by name.
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.get(name)
    }

    /// Build a reply draft: new kind, same token.
    pub fn reply(&self, kind: impl Into<String>) -> ClaimDraft {
        let mut draft = ClaimDraft::new(kind);
        draft.token = self.token.clone();
        draft
    }
}

impl std::fmt::Display for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.number)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for posting new claims. Number assignment belongs to the queue,
/// not the producer.
#[derive(Debug, Clone)]
pub struct ClaimDraft {
    pub(crate) kind: String,
    pub(crate) token: Option<String>,
    pub(crate) params: serde_json::Value,
}

impl ClaimDraft {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            token: None,
            params: serde_json::json!({}),
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.params {
            map.insert(name.into(), value.into());
        }
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Freeze the draft into a claim with the number the queue assigned.
    pub(crate) fn into_claim(self, number: u64) -> Claim {
        Claim {
            number,
            kind: self.kind,
            token: self.token,
            params: self.params,
            created: Utc::now(),
        }
    }
}
