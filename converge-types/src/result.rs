//! Result records handed back to the caller.

use crate::error::ConvergeFailure;
use crate::key::ResourceKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one convergence call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceResult {
    /// Whether remote state was (or, under dry-run, would be) mutated.
    pub changed: bool,
    /// The converged resource, when one is known.
    pub resource: Option<ResourceKey>,
    /// Backend-specific detail for the caller's reporter; opaque to the
    /// engine.
    pub payload: Value,
}

impl ConvergenceResult {
    #[must_use]
    pub fn unchanged(resource: Option<ResourceKey>) -> Self {
        Self {
            changed: false,
            resource,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn changed(resource: Option<ResourceKey>) -> Self {
        Self {
            changed: true,
            resource,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Outcome of a batch deletion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Keys actually removed by this call.
    pub removed: Vec<ResourceKey>,
    /// Keys that were already absent. Tolerated: deletion is idempotent.
    pub missing: Vec<ResourceKey>,
    /// Keys the backend refused to remove, with its reason.
    pub failed: Vec<(ResourceKey, String)>,
}

impl DeleteReport {
    /// Whether the deletion changed anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Aggregate outcome of a bulk import: per-leaf results plus collected
/// failures. A failing leaf does not abort the remaining leaves.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub changed: bool,
    pub entries: Vec<ConvergenceResult>,
    pub failed: Vec<(ResourceKey, ConvergeFailure)>,
}

impl BulkOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, result: ConvergenceResult) {
        self.changed |= result.changed;
        self.entries.push(result);
    }

    pub fn record_failure(&mut self, key: ResourceKey, failure: ConvergeFailure) {
        self.failed.push((key, failure));
    }
}
