//! In-memory endpoint control plane with idempotency-token binding and
//! lifecycle transitions.

use async_trait::async_trait;
use converge_engine::{Created, FetchOutcome, KvWrite, RemoteClient, WriteOutcome};
use converge_types::{
    ConvergeError, DeleteReport, EndpointSpec, EndpointState, ObservedState, ResourceKey,
};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct EndpointRecord {
    vpc_id: String,
    service_name: String,
    policy_document: Option<Value>,
    route_table_ids: Vec<String>,
    state: EndpointState,
    /// Fetches remaining before a pending endpoint reports available.
    polls_remaining: u32,
}

impl EndpointRecord {
    fn observe(&self, id: &str) -> ObservedState {
        ObservedState::Endpoint {
            endpoint_id: ResourceKey::new(id),
            state: self.state,
            vpc_id: self.vpc_id.clone(),
            service_name: self.service_name.clone(),
            policy_document: self.policy_document.clone(),
            route_table_ids: self.route_table_ids.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct EpInner {
    endpoints: HashMap<String, EndpointRecord>,
    /// Token → endpoint id. Bindings survive endpoint deletion, modeling
    /// the backend's token cooldown: a reused token is refused with the
    /// resource it is bound to, and the engine decides whether that
    /// resource satisfies the request.
    tokens: HashMap<String, String>,
    delete_failures: HashMap<String, String>,
    next_id: u64,
}

/// An in-memory endpoint API.
///
/// Created endpoints start `pending` and report `available` after
/// `polls_until_available` fetches, so status-wait sequences are
/// scriptable. Batch deletion failures can be injected per id to exercise
/// partial-failure reporting.
#[derive(Debug)]
pub struct MemoryEndpoints {
    inner: RwLock<EpInner>,
    polls_until_available: u32,
}

impl Default for MemoryEndpoints {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEndpoints {
    /// A control plane whose endpoints become available immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_polls_until_available(0)
    }

    /// A control plane whose endpoints report `pending` for the given
    /// number of fetches before turning `available`.
    #[must_use]
    pub fn with_polls_until_available(polls: u32) -> Self {
        Self {
            inner: RwLock::new(EpInner::default()),
            polls_until_available: polls,
        }
    }

    /// Makes deletion of the given endpoint fail with the given reason.
    pub async fn inject_delete_failure(&self, id: &str, reason: impl Into<String>) {
        self.inner
            .write()
            .await
            .delete_failures
            .insert(id.to_string(), reason.into());
    }

    /// Number of endpoints currently present, for test assertions.
    pub async fn endpoint_count(&self) -> usize {
        self.inner.read().await.endpoints.len()
    }

    fn validate(spec: &EndpointSpec) -> Result<(), ConvergeError> {
        if spec.vpc_id.is_empty() {
            return Err(ConvergeError::Validation("vpc_id must not be empty".into()));
        }
        if spec.service_name.is_empty() {
            return Err(ConvergeError::Validation(
                "service_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for MemoryEndpoints {
    async fn fetch(&self, key: &ResourceKey) -> Result<FetchOutcome, ConvergeError> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.endpoints.get_mut(key.as_str()) else {
            return Ok(FetchOutcome::Missing);
        };
        // Each observation of a pending endpoint consumes one poll credit.
        if record.state == EndpointState::Pending {
            if record.polls_remaining == 0 {
                record.state = EndpointState::Available;
            } else {
                record.polls_remaining -= 1;
            }
        }
        Ok(FetchOutcome::Found(record.observe(key.as_str())))
    }

    async fn create(&self, spec: &EndpointSpec, dry_run: bool) -> Result<Created, ConvergeError> {
        Self::validate(spec)?;
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.tokens.get(spec.client_token.as_str()) {
            return Err(ConvergeError::IdempotencyConflict {
                token: spec.client_token.clone(),
                existing: inner
                    .endpoints
                    .contains_key(existing)
                    .then(|| ResourceKey::new(existing.clone())),
            });
        }

        if dry_run {
            // Validation passed; nothing is mutated and no id is assigned.
            let placeholder = EndpointRecord {
                vpc_id: spec.vpc_id.clone(),
                service_name: spec.service_name.clone(),
                policy_document: spec.policy_document.clone(),
                route_table_ids: spec.route_table_ids.clone(),
                state: EndpointState::Pending,
                polls_remaining: 0,
            };
            return Ok(Created {
                key: ResourceKey::new("vpce-dry-run"),
                observed: placeholder.observe("vpce-dry-run"),
            });
        }

        inner.next_id += 1;
        let id = format!("vpce-{:08x}", inner.next_id);
        let record = EndpointRecord {
            vpc_id: spec.vpc_id.clone(),
            service_name: spec.service_name.clone(),
            policy_document: spec.policy_document.clone(),
            route_table_ids: spec.route_table_ids.clone(),
            state: if self.polls_until_available == 0 {
                EndpointState::Available
            } else {
                EndpointState::Pending
            },
            polls_remaining: self.polls_until_available,
        };
        let observed = record.observe(&id);
        inner.endpoints.insert(id.clone(), record);
        inner
            .tokens
            .insert(spec.client_token.as_str().to_string(), id.clone());
        Ok(Created {
            key: ResourceKey::new(id),
            observed,
        })
    }

    async fn delete(
        &self,
        keys: &[ResourceKey],
        _recurse: bool,
        dry_run: bool,
    ) -> Result<DeleteReport, ConvergeError> {
        let mut inner = self.inner.write().await;
        let mut report = DeleteReport::default();
        for key in keys {
            if let Some(reason) = inner.delete_failures.get(key.as_str()) {
                report.failed.push((key.clone(), reason.clone()));
                continue;
            }
            if !inner.endpoints.contains_key(key.as_str()) {
                report.missing.push(key.clone());
                continue;
            }
            if !dry_run {
                // Token bindings deliberately survive: see `EpInner::tokens`.
                inner.endpoints.remove(key.as_str());
            }
            report.removed.push(key.clone());
        }
        Ok(report)
    }

    async fn conditional_write(&self, _write: &KvWrite) -> Result<WriteOutcome, ConvergeError> {
        Err(ConvergeError::Unsupported(
            "the endpoint backend has no conditional-write verb",
        ))
    }

    async fn bulk_fetch_by_prefix(
        &self,
        _prefix: &str,
    ) -> Result<Vec<(ResourceKey, ObservedState)>, ConvergeError> {
        Err(ConvergeError::Unsupported(
            "the endpoint backend has no prefix listing",
        ))
    }
}
