//! Desired-state declarations and their validation.
//!
//! A [`DesiredState`] captures both the target backend and the intent
//! (presence, absence, lock acquisition, bulk import) in its variant, so
//! downstream code never branches on stringly-typed modes.

use crate::error::ConvergeError;
use crate::key::{IdempotencyToken, ModifyIndex, ResourceKey, SessionId};
use crate::observed::ObservedState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Specification of a VPC endpoint to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub vpc_id: String,
    pub service_name: String,
    /// Access policy for the endpoint. When absent the backend applies its
    /// default full-access policy.
    pub policy_document: Option<Value>,
    pub route_table_ids: Vec<String>,
    pub client_token: IdempotencyToken,
}

impl EndpointSpec {
    /// Semantic equality against an observed endpoint, ignoring
    /// server-generated metadata (endpoint id, lifecycle state).
    ///
    /// Policy documents compare structurally (key order and formatting are
    /// irrelevant); an unset desired policy accepts whatever the backend
    /// applied. Route tables compare as sets.
    #[must_use]
    pub fn matches_observed(&self, observed: &ObservedState) -> bool {
        let ObservedState::Endpoint {
            vpc_id,
            service_name,
            policy_document,
            route_table_ids,
            ..
        } = observed
        else {
            return false;
        };
        if self.vpc_id != *vpc_id || self.service_name != *service_name {
            return false;
        }
        if let Some(desired_policy) = &self.policy_document {
            if policy_document.as_ref() != Some(desired_policy) {
                return false;
            }
        }
        let desired: BTreeSet<&str> = self.route_table_ids.iter().map(String::as_str).collect();
        let actual: BTreeSet<&str> = route_table_ids.iter().map(String::as_str).collect();
        desired == actual
    }

    fn validate(&self) -> Result<(), ConvergeError> {
        if self.vpc_id.is_empty() {
            return Err(ConvergeError::Validation(
                "vpc_id is required for endpoint creation".into(),
            ));
        }
        if self.service_name.is_empty() {
            return Err(ConvergeError::Validation(
                "service_name is required for endpoint creation".into(),
            ));
        }
        Ok(())
    }
}

/// Specification of a single KV entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvSpec {
    pub key: String,
    pub value: String,
    /// Opaque integer stored alongside the value. Unset means "don't care":
    /// it is neither written nor compared.
    pub flags: Option<u64>,
    /// Conditional-write guard. [`ModifyIndex::ZERO`] requires the key to be
    /// absent; any other value requires the current index to match.
    pub cas: Option<ModifyIndex>,
    /// Lock session, required for acquire/release intents.
    pub session: Option<SessionId>,
}

impl KvSpec {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags: None,
            cas: None,
            session: None,
        }
    }

    #[must_use]
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.key.clone())
    }

    /// Semantic equality against an observed entry: value must match, flags
    /// only when the desired spec sets them. Indices and lock ownership are
    /// server metadata and never compared.
    #[must_use]
    pub fn matches_observed(&self, observed: &ObservedState) -> bool {
        let ObservedState::Kv { value, flags, .. } = observed else {
            return false;
        };
        if self.value != *value {
            return false;
        }
        match self.flags {
            Some(desired_flags) => desired_flags == *flags,
            None => true,
        }
    }

    fn validate(&self) -> Result<(), ConvergeError> {
        if self.key.is_empty() {
            return Err(ConvergeError::Validation("key must not be empty".into()));
        }
        Ok(())
    }

    fn validate_session(&self, intent: &str) -> Result<(), ConvergeError> {
        match &self.session {
            Some(session) if !session.is_empty() => Ok(()),
            _ => Err(ConvergeError::Validation(format!(
                "{} of lock for '{}' requested but no session supplied",
                intent, self.key
            ))),
        }
    }
}

/// What the caller wants the remote backend to look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DesiredState {
    /// The endpoint described by the spec exists.
    EndpointPresent(EndpointSpec),
    /// None of the listed endpoints exist. Always a list; callers removing a
    /// single endpoint wrap it explicitly.
    EndpointAbsent { endpoint_ids: Vec<ResourceKey> },
    /// The KV entry holds the given value.
    KvPresent(KvSpec),
    /// The key (or, with `recurse`, the whole prefix) is absent.
    KvAbsent { key: String, recurse: bool },
    /// The session holds the lock on the key.
    KvAcquire(KvSpec),
    /// The session has released the lock on the key.
    KvRelease(KvSpec),
    /// Every leaf of the nested document exists as a KV entry.
    KvImport { document: Value },
}

impl DesiredState {
    /// Pre-flight validation, run before any network call. A failure here is
    /// always fatal to the convergence call.
    pub fn validate(&self) -> Result<(), ConvergeError> {
        match self {
            Self::EndpointPresent(spec) => spec.validate(),
            Self::EndpointAbsent { endpoint_ids } => {
                if endpoint_ids.is_empty() {
                    return Err(ConvergeError::Validation(
                        "at least one endpoint id is required for removal".into(),
                    ));
                }
                Ok(())
            }
            Self::KvPresent(spec) => spec.validate(),
            Self::KvAbsent { key, .. } => {
                if key.is_empty() {
                    return Err(ConvergeError::Validation("key must not be empty".into()));
                }
                Ok(())
            }
            Self::KvAcquire(spec) => {
                spec.validate()?;
                spec.validate_session("acquire")
            }
            Self::KvRelease(spec) => {
                spec.validate()?;
                spec.validate_session("release")
            }
            Self::KvImport { document } => {
                if !document.is_object() {
                    return Err(ConvergeError::Validation(
                        "import document must be a JSON object".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// The key this desired state converges on, where one is known up front.
    /// Creation of an endpoint has no key until the backend assigns one;
    /// imports cover many keys.
    #[must_use]
    pub fn resource_key(&self) -> Option<ResourceKey> {
        match self {
            Self::EndpointPresent(_) | Self::KvImport { .. } => None,
            Self::EndpointAbsent { endpoint_ids } => endpoint_ids.first().cloned(),
            Self::KvPresent(spec) | Self::KvAcquire(spec) | Self::KvRelease(spec) => {
                Some(spec.resource_key())
            }
            Self::KvAbsent { key, .. } => Some(ResourceKey::new(key.clone())),
        }
    }
}
