//! Error taxonomy for convergence operations.
//!
//! Every failure carries a precise kind so callers can branch on a value
//! rather than string-matching a message. Lock contention is deliberately
//! absent: a contended lock attempt is an expected outcome, reported as
//! `changed = false`, never as an error.

use crate::action::ActionKind;
use crate::key::{IdempotencyToken, ModifyIndex, ResourceKey};
use crate::observed::EndpointState;
use thiserror::Error;

/// Errors that can occur during a convergence call.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Malformed desired state, caught before any network call. Fatal.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network or auth failure reaching the backend. Transient; retryable
    /// for idempotent actions only.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The resource does not exist. Non-fatal for deletion (already
    /// absent), fatal everywhere else.
    #[error("resource not found: {0}")]
    NotFound(ResourceKey),

    /// The idempotency token was already used and the existing resource
    /// does not match the desired spec.
    #[error("idempotency token '{token}' already used by a non-matching resource")]
    IdempotencyConflict {
        token: IdempotencyToken,
        /// Resource currently bound to the token, when the backend reports
        /// it.
        existing: Option<ResourceKey>,
    },

    /// A conditional write lost the race: the observed index no longer
    /// matches. The caller must re-plan from a fresh observation.
    #[error("concurrent modification of '{key}': index {expected} no longer matches")]
    ConcurrentModification {
        key: ResourceKey,
        expected: ModifyIndex,
    },

    /// A batch deletion removed some entries but failed others for reasons
    /// other than already-absent.
    #[error("{} deletion(s) failed", failures.len())]
    PartialFailure {
        failures: Vec<(ResourceKey, String)>,
    },

    /// The resource did not reach the target status before the wall-clock
    /// timeout elapsed.
    #[error("'{key}' did not reach status '{target}' before the timeout")]
    WaitTimeout {
        key: ResourceKey,
        target: EndpointState,
    },

    /// The selected backend does not offer this verb.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl ConvergeError {
    /// Whether a retry of an idempotent action may resolve this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// A convergence failure annotated with the action that was being executed,
/// so the caller always learns what was attempted alongside the precise
/// error kind.
#[derive(Debug, Error)]
#[error("{action} failed: {error}")]
pub struct ConvergeFailure {
    pub action: ActionKind,
    #[source]
    pub error: ConvergeError,
}

impl ConvergeFailure {
    #[must_use]
    pub fn new(action: ActionKind, error: ConvergeError) -> Self {
        Self { action, error }
    }
}
