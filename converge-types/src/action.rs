//! Convergence actions — the classified delta between desired and observed.

use crate::desired::{EndpointSpec, KvSpec};
use crate::key::ResourceKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload for creating an endpoint. The idempotency token travels inside
/// the spec (`client_token`); this wrapper exists so `Replace` can carry a
/// create half without re-deriving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCreate {
    pub spec: EndpointSpec,
}

/// The minimal instruction needed to converge one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConvergenceAction {
    /// Desired and observed already agree.
    NoOp { key: Option<ResourceKey> },
    /// Bring an absent endpoint into existence.
    CreateEndpoint(EndpointCreate),
    /// Bring an absent KV entry into existence (a conditional write — the
    /// KV backend has no separate create verb).
    CreateKv(KvSpec),
    /// Rewrite an existing KV entry in place.
    Update(KvSpec),
    /// Endpoints are immutable: drift converges by delete-then-create.
    Replace {
        delete: Vec<ResourceKey>,
        create: EndpointCreate,
    },
    /// Remove the listed keys; with `recurse`, each key is a prefix.
    Delete {
        keys: Vec<ResourceKey>,
        recurse: bool,
    },
    /// Take the lock on a key with the spec's session.
    AcquireLock(KvSpec),
    /// Release the lock on a key with the spec's session.
    ReleaseLock(KvSpec),
}

impl ConvergenceAction {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::NoOp { .. } => ActionKind::NoOp,
            Self::CreateEndpoint(_) | Self::CreateKv(_) => ActionKind::Create,
            Self::Update(_) => ActionKind::Update,
            Self::Replace { .. } => ActionKind::Replace,
            Self::Delete { .. } => ActionKind::Delete,
            Self::AcquireLock(_) => ActionKind::AcquireLock,
            Self::ReleaseLock(_) => ActionKind::ReleaseLock,
        }
    }

    /// Whether reissuing this action after a transient failure is safe.
    /// Only these may be retried; a blind retry of a create or conditional
    /// write risks duplicate side effects or masking a lost race.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::NoOp { .. } | Self::Delete { .. })
    }

    /// Whether executing this action would mutate remote state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::NoOp { .. })
    }
}

/// Discriminant of a [`ConvergenceAction`], used in failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    NoOp,
    Create,
    Update,
    Replace,
    Delete,
    AcquireLock,
    ReleaseLock,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::AcquireLock => "acquire-lock",
            Self::ReleaseLock => "release-lock",
        };
        write!(f, "{s}")
    }
}
