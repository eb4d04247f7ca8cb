//! Request-level entry points: validate, observe, plan, execute, wait.
//!
//! Each call is independent and stateless. The client handle is borrowed
//! for the duration of the call only; no state persists between
//! invocations, and concurrent calls on distinct keys are safe without any
//! coordination here.

use crate::client::{FetchOutcome, RemoteClient};
use crate::executor::{backoff_delay, execute, ExecOptions};
use crate::plan::plan;
use crate::waiter::{wait_for_status, WaitConfig};
use converge_types::{
    flatten_document, ActionKind, BulkOutcome, ConvergeError, ConvergeFailure, ConvergenceAction,
    ConvergenceResult, DesiredState, EndpointState, KvSpec, ResourceKey,
};
use std::time::Duration;
use tracing::{debug, info};

/// A caller-facing convergence request: the desired state plus execution
/// knobs. Presentation of the result is the caller's concern.
#[derive(Debug, Clone)]
pub struct ConvergenceRequest {
    pub desired: DesiredState,
    /// Validate and project instead of mutating.
    pub dry_run: bool,
    /// After a creating action, poll until the resource is available.
    pub wait: bool,
    /// Wall-clock budget for the wait phase.
    pub wait_timeout: Duration,
    /// Retry ceiling for transient failures of idempotent operations.
    pub max_retries: u32,
}

impl ConvergenceRequest {
    #[must_use]
    pub fn new(desired: DesiredState) -> Self {
        Self {
            desired,
            dry_run: false,
            wait: false,
            wait_timeout: Duration::from_secs(320),
            max_retries: 3,
        }
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    #[must_use]
    pub fn wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.wait_timeout = timeout;
        self
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            dry_run: self.dry_run,
            max_retries: self.max_retries,
            ..ExecOptions::default()
        }
    }
}

/// The action kind a desired state implies, used to label failures that
/// occur before planning has produced a concrete action.
fn intended_kind(desired: &DesiredState) -> ActionKind {
    match desired {
        DesiredState::EndpointPresent(_) | DesiredState::KvPresent(_) => ActionKind::Create,
        DesiredState::EndpointAbsent { .. } | DesiredState::KvAbsent { .. } => ActionKind::Delete,
        DesiredState::KvAcquire(_) => ActionKind::AcquireLock,
        DesiredState::KvRelease(_) => ActionKind::ReleaseLock,
        DesiredState::KvImport { .. } => ActionKind::Create,
    }
}

/// Converges one desired state: validate → observe → plan → execute →
/// optionally wait for the created resource to become available.
///
/// Bulk imports cover many keys and report partial failure; they go
/// through [`converge_import`] instead.
pub async fn converge(
    request: &ConvergenceRequest,
    client: &dyn RemoteClient,
) -> Result<ConvergenceResult, ConvergeFailure> {
    let kind = intended_kind(&request.desired);

    if matches!(request.desired, DesiredState::KvImport { .. }) {
        return Err(ConvergeFailure::new(
            kind,
            ConvergeError::Validation("bulk import must be converged via converge_import".into()),
        ));
    }

    request
        .desired
        .validate()
        .map_err(|e| ConvergeFailure::new(kind, e))?;

    let observed = match request.desired.resource_key() {
        Some(key) => fetch_observed(client, &key, request.max_retries)
            .await
            .map_err(|e| ConvergeFailure::new(kind, e))?,
        None => None,
    };

    let action =
        plan(&request.desired, observed.as_ref()).map_err(|e| ConvergeFailure::new(kind, e))?;
    debug!(action = %action.kind(), "planned convergence action");

    let mut result = execute(&action, client, &request.exec_options()).await?;

    // Only endpoint creation is polled: KV entries have no lifecycle
    // status, and a projected dry-run result has nothing to poll.
    let polls = matches!(
        action,
        ConvergenceAction::CreateEndpoint(_) | ConvergenceAction::Replace { .. }
    );
    if request.wait && !request.dry_run && polls && result.changed {
        if let Some(key) = result.resource.clone() {
            let config = WaitConfig::with_timeout(request.wait_timeout);
            let outcome = wait_for_status(client, &key, EndpointState::Available, &config)
                .await
                .map_err(|e| ConvergeFailure::new(action.kind(), e))?;
            if !outcome.achieved {
                return Err(ConvergeFailure::new(
                    action.kind(),
                    ConvergeError::WaitTimeout {
                        key,
                        target: EndpointState::Available,
                    },
                ));
            }
            if let Some(state) = outcome.last_observed.seen() {
                result.payload = serde_json::to_value(state).unwrap_or_default();
            }
        }
    }

    info!(
        action = %action.kind(),
        changed = result.changed,
        resource = ?result.resource,
        "convergence complete"
    );
    Ok(result)
}

/// Converges every leaf of a bulk-import document independently.
///
/// `changed` is true iff at least one leaf differed from its observation.
/// A failing leaf is recorded and does not abort the remaining leaves.
pub async fn converge_import(
    request: &ConvergenceRequest,
    client: &dyn RemoteClient,
) -> Result<BulkOutcome, ConvergeFailure> {
    let DesiredState::KvImport { document } = &request.desired else {
        return Err(ConvergeFailure::new(
            ActionKind::Create,
            ConvergeError::Validation("converge_import requires a KvImport desired state".into()),
        ));
    };

    let pairs = flatten_document(document)
        .map_err(|e| ConvergeFailure::new(ActionKind::Create, e))?;
    debug!(leaves = pairs.len(), "flattened import document");

    let options = request.exec_options();
    let mut outcome = BulkOutcome::default();
    for (key, value) in pairs {
        let spec = KvSpec::new(key.clone(), value);
        let desired = DesiredState::KvPresent(spec);
        let resource = ResourceKey::new(key);

        let leaf = async {
            let observed = fetch_observed(client, &resource, request.max_retries)
                .await
                .map_err(|e| ConvergeFailure::new(ActionKind::Create, e))?;
            let action = plan(&desired, observed.as_ref())
                .map_err(|e| ConvergeFailure::new(ActionKind::Create, e))?;
            execute(&action, client, &options).await
        };
        match leaf.await {
            Ok(result) => outcome.record(result),
            Err(failure) => outcome.record_failure(resource, failure),
        }
    }

    info!(
        changed = outcome.changed,
        entries = outcome.entries.len(),
        failed = outcome.failed.len(),
        "bulk import complete"
    );
    Ok(outcome)
}

/// Reads the current observation with bounded retry: fetching is
/// idempotent, so transient backend failures back off exponentially up to
/// the retry ceiling.
async fn fetch_observed(
    client: &dyn RemoteClient,
    key: &ResourceKey,
    max_retries: u32,
) -> Result<Option<converge_types::ObservedState>, ConvergeError> {
    let base = ExecOptions::default().retry_base_delay;
    let mut attempt = 0u32;
    loop {
        match client.fetch(key).await {
            Ok(FetchOutcome::Found(state)) => return Ok(Some(state)),
            Ok(FetchOutcome::Missing) => return Ok(None),
            Err(error) if error.is_transient() && attempt < max_retries => {
                let delay = backoff_delay(base, attempt);
                tracing::warn!(
                    resource = %key,
                    attempt = attempt + 1,
                    "transient failure during fetch, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
