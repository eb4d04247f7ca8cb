//! Observed-state snapshots fetched from a remote backend.

use crate::key::{ModifyIndex, ResourceKey, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of an endpoint resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Pending,
    Available,
    Deleting,
    Deleted,
    Failed,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A point-in-time snapshot of a remote resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObservedState {
    Endpoint {
        endpoint_id: ResourceKey,
        state: EndpointState,
        vpc_id: String,
        service_name: String,
        policy_document: Option<Value>,
        route_table_ids: Vec<String>,
    },
    Kv {
        key: ResourceKey,
        value: String,
        flags: u64,
        modify_index: ModifyIndex,
        /// Session currently holding the lock, if any.
        lock_session: Option<SessionId>,
    },
}

impl ObservedState {
    #[must_use]
    pub fn resource_key(&self) -> &ResourceKey {
        match self {
            Self::Endpoint { endpoint_id, .. } => endpoint_id,
            Self::Kv { key, .. } => key,
        }
    }

    /// Lifecycle state, for endpoint observations.
    #[must_use]
    pub fn endpoint_state(&self) -> Option<EndpointState> {
        match self {
            Self::Endpoint { state, .. } => Some(*state),
            Self::Kv { .. } => None,
        }
    }

    /// Current version, for KV observations.
    #[must_use]
    pub fn modify_index(&self) -> Option<ModifyIndex> {
        match self {
            Self::Kv { modify_index, .. } => Some(*modify_index),
            Self::Endpoint { .. } => None,
        }
    }
}

/// What a poller has seen so far.
///
/// `Unknown` makes the no-data case representable: a waiter that has not yet
/// completed a single successful fetch reports `Unknown` rather than leaving
/// its last observation undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    Unknown,
    Seen(ObservedState),
}

impl Observation {
    #[must_use]
    pub fn seen(&self) -> Option<&ObservedState> {
        match self {
            Self::Seen(state) => Some(state),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}
