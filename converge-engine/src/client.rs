//! Remote backend capability interface.
//!
//! One implementation per backend (cloud resource API, distributed KV
//! store). The engine consumes this trait and never constructs clients
//! itself; callers pass a short-lived handle into each convergence call.
//!
//! Errors are structured [`ConvergeError`] kinds. In particular, a read
//! that finds nothing returns [`FetchOutcome::Missing`] — absence is a
//! value, not an exception — and backends must never require the caller to
//! parse message text to learn what went wrong.

use async_trait::async_trait;
use converge_types::{
    ConvergeError, DeleteReport, EndpointSpec, ModifyIndex, ObservedState, ResourceKey, SessionId,
};
use serde::{Deserialize, Serialize};

/// Result of a read: the resource either exists with a snapshot, or it
/// does not.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(ObservedState),
    Missing,
}

impl FetchOutcome {
    #[must_use]
    pub fn found(self) -> Option<ObservedState> {
        match self {
            Self::Found(state) => Some(state),
            Self::Missing => None,
        }
    }
}

/// A freshly created resource: the key the backend assigned plus the first
/// observation of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub key: ResourceKey,
    pub observed: ObservedState,
}

/// A conditional KV write, mirroring the backend's single put verb: plain
/// set, CAS-guarded set, lock acquire and lock release are all the same
/// call with different guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvWrite {
    pub key: ResourceKey,
    pub value: String,
    pub flags: Option<u64>,
    /// Version guard: `ZERO` = only if absent, otherwise index must match.
    pub cas: Option<ModifyIndex>,
    /// Take the lock for this session as part of the write.
    pub acquire: Option<SessionId>,
    /// Release the lock held by this session as part of the write.
    pub release: Option<SessionId>,
}

impl KvWrite {
    #[must_use]
    pub fn set(key: ResourceKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            flags: None,
            cas: None,
            acquire: None,
            release: None,
        }
    }

    #[must_use]
    pub fn with_cas(mut self, cas: ModifyIndex) -> Self {
        self.cas = Some(cas);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags = Some(flags);
        self
    }

    #[must_use]
    pub fn acquiring(mut self, session: SessionId) -> Self {
        self.acquire = Some(session);
        self
    }

    #[must_use]
    pub fn releasing(mut self, session: SessionId) -> Self {
        self.release = Some(session);
        self
    }
}

/// Outcome of a conditional write. `committed = false` is not an error: it
/// means the guard did not hold (index mismatch, lock contention, invalid
/// session) and the caller decides what that means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOutcome {
    pub committed: bool,
    /// Index after the write when committed, current index otherwise.
    pub index: ModifyIndex,
}

/// Capability to fetch, create, mutate and delete named resources on one
/// backend. Implementations are supplied by collaborator layers; backends
/// lacking a verb return [`ConvergeError::Unsupported`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetches the current snapshot of a resource.
    async fn fetch(&self, key: &ResourceKey) -> Result<FetchOutcome, ConvergeError>;

    /// Creates an endpoint resource. The idempotency token inside the spec
    /// guards against duplicate creation; with `dry_run` the backend
    /// validates the request and mutates nothing.
    async fn create(&self, spec: &EndpointSpec, dry_run: bool) -> Result<Created, ConvergeError>;

    /// Deletes a batch of resources. Already-absent keys are reported in
    /// the `missing` list, never as errors. With `recurse`, each key is a
    /// prefix and the whole subtree is removed.
    async fn delete(
        &self,
        keys: &[ResourceKey],
        recurse: bool,
        dry_run: bool,
    ) -> Result<DeleteReport, ConvergeError>;

    /// Issues a conditional write against the KV backend.
    async fn conditional_write(&self, write: &KvWrite) -> Result<WriteOutcome, ConvergeError>;

    /// Lists every entry under a `/`-separated prefix.
    async fn bulk_fetch_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(ResourceKey, ObservedState)>, ConvergeError>;
}
