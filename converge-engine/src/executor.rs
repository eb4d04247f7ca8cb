//! Convergence executor — applies one planned action through a client.
//!
//! The executor owns dry-run semantics, CAS conflict surfacing, the
//! idempotency-token recheck on creation, tolerance of already-absent
//! deletions, lock contention as a non-error, and bounded retries of
//! transient failures on idempotent actions.

use crate::client::{Created, KvWrite, RemoteClient, WriteOutcome};
use converge_types::{
    ActionKind, ConvergeError, ConvergeFailure, ConvergenceAction, ConvergenceResult, DeleteReport,
    EndpointCreate, KvSpec, ResourceKey,
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Execution options for one convergence call.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Validate and project instead of mutating.
    pub dry_run: bool,
    /// Retry ceiling for transient failures of idempotent actions.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Delay before retry number `attempt` (0-indexed): base × 2^attempt.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

/// Applies `action` against `client`.
///
/// Non-fatal conditions (already-absent deletion, lock contention) resolve
/// into a normal result with `changed = false`. Everything else surfaces as
/// a [`ConvergeFailure`] naming the attempted action and the precise error
/// kind.
pub async fn execute(
    action: &ConvergenceAction,
    client: &dyn RemoteClient,
    options: &ExecOptions,
) -> Result<ConvergenceResult, ConvergeFailure> {
    let kind = action.kind();
    debug!(action = %kind, dry_run = options.dry_run, "executing convergence action");

    match action {
        ConvergenceAction::NoOp { key } => Ok(ConvergenceResult::unchanged(key.clone())
            .with_payload(json!({ "message": "desired state already satisfied" }))),

        ConvergenceAction::CreateEndpoint(create) => {
            create_endpoint(create, client, options.dry_run).await
        }

        ConvergenceAction::CreateKv(spec) | ConvergenceAction::Update(spec) => {
            write_kv(kind, spec, client, options.dry_run).await
        }

        ConvergenceAction::Replace { delete, create } => {
            // Immutable resources converge by delete-then-create. Each half
            // keeps its own semantics; the create half runs only once the
            // delete half reports success.
            let report = delete_batch(delete, false, client, options).await?;
            let created = create_endpoint(create, client, options.dry_run).await?;
            Ok(ConvergenceResult::changed(created.resource.clone()).with_payload(json!({
                "deleted": report.removed,
                "created": created.payload,
            })))
        }

        ConvergenceAction::Delete { keys, recurse } => {
            let report = delete_batch(keys, *recurse, client, options).await?;
            let changed = report.changed();
            let key = report.removed.first().or(report.missing.first()).cloned();
            Ok(ConvergenceResult {
                changed,
                resource: key,
                payload: json!({
                    "removed": report.removed,
                    "missing": report.missing,
                }),
            })
        }

        ConvergenceAction::AcquireLock(spec) => lock_write(kind, spec, client, options).await,
        ConvergenceAction::ReleaseLock(spec) => lock_write(kind, spec, client, options).await,
    }
}

async fn create_endpoint(
    create: &EndpointCreate,
    client: &dyn RemoteClient,
    dry_run: bool,
) -> Result<ConvergenceResult, ConvergeFailure> {
    let spec = &create.spec;
    match client.create(spec, dry_run).await {
        Ok(_) if dry_run => {
            // Read-only validation call; the backend mutated nothing and
            // assigned no id.
            Ok(ConvergenceResult::changed(None)
                .with_payload(json!({ "projected": "would create endpoint" })))
        }
        Ok(Created { key, observed }) => {
            info!(resource = %key, "endpoint created");
            let payload = serde_json::to_value(&observed).unwrap_or_default();
            Ok(ConvergenceResult::changed(Some(key)).with_payload(payload))
        }
        // A reused token is success only when the resource it points at
        // already matches the desired spec; otherwise the token is bound to
        // something else and reissuing it would be unsafe. The dry-run
        // projection follows the same rule, so a satisfied request reports
        // changed=false either way.
        Err(ConvergeError::IdempotencyConflict {
            token,
            existing: Some(existing),
        }) => match client.fetch(&existing).await {
            Ok(outcome) => match outcome.found() {
                Some(observed) if spec.matches_observed(&observed) => {
                    debug!(resource = %existing, "idempotency token already satisfied by matching resource");
                    let payload = serde_json::to_value(&observed).unwrap_or_default();
                    Ok(ConvergenceResult::unchanged(Some(existing)).with_payload(payload))
                }
                _ => Err(ConvergeFailure::new(
                    ActionKind::Create,
                    ConvergeError::IdempotencyConflict {
                        token,
                        existing: Some(existing),
                    },
                )),
            },
            Err(error) => Err(ConvergeFailure::new(ActionKind::Create, error)),
        },
        Err(error) => Err(ConvergeFailure::new(ActionKind::Create, error)),
    }
}

async fn write_kv(
    kind: ActionKind,
    spec: &KvSpec,
    client: &dyn RemoteClient,
    dry_run: bool,
) -> Result<ConvergenceResult, ConvergeFailure> {
    let key = spec.resource_key();
    if dry_run {
        // The KV backend offers no validation verb, so the result is
        // synthesized without touching the backend.
        return Ok(ConvergenceResult::changed(Some(key))
            .with_payload(json!({ "projected": "would write value" })));
    }

    let mut write = KvWrite::set(key.clone(), spec.value.clone());
    write.flags = spec.flags;
    write.cas = spec.cas;

    match client.conditional_write(&write).await {
        Ok(WriteOutcome {
            committed: true,
            index,
        }) => {
            info!(resource = %key, %index, "kv entry written");
            Ok(ConvergenceResult::changed(Some(key))
                .with_payload(json!({ "index": index.value() })))
        }
        Ok(WriteOutcome {
            committed: false, ..
        }) => match spec.cas {
            // A refused guarded write means the race was lost; the caller
            // must re-plan from a fresh observation rather than have the
            // engine silently overwrite a concurrent writer.
            Some(expected) => Err(ConvergeFailure::new(
                kind,
                ConvergeError::ConcurrentModification { key, expected },
            )),
            None => Err(ConvergeFailure::new(
                kind,
                ConvergeError::BackendUnavailable("unconditional write refused".into()),
            )),
        },
        Err(error) => Err(ConvergeFailure::new(kind, error)),
    }
}

async fn lock_write(
    kind: ActionKind,
    spec: &KvSpec,
    client: &dyn RemoteClient,
    options: &ExecOptions,
) -> Result<ConvergenceResult, ConvergeFailure> {
    let key = spec.resource_key();
    if options.dry_run {
        return Ok(ConvergenceResult::changed(Some(key))
            .with_payload(json!({ "projected": "would attempt lock transition" })));
    }

    // Sessionless lock intents are rejected during validation, so the
    // session is present here by construction.
    let Some(session) = spec.session.clone() else {
        return Err(ConvergeFailure::new(
            kind,
            ConvergeError::Validation("lock transition requires a session".into()),
        ));
    };

    let mut write = KvWrite::set(key.clone(), spec.value.clone());
    write.flags = spec.flags;
    write.cas = spec.cas;
    match kind {
        ActionKind::AcquireLock => write.acquire = Some(session),
        _ => write.release = Some(session),
    }

    match client.conditional_write(&write).await {
        Ok(outcome) => {
            // Contention is an expected outcome, not a failure: the backend
            // simply reports that the attempt did not take effect.
            if !outcome.committed {
                warn!(resource = %key, action = %kind, "lock attempt did not succeed");
            }
            Ok(ConvergenceResult {
                changed: outcome.committed,
                resource: Some(key),
                payload: json!({ "index": outcome.index.value() }),
            })
        }
        Err(error) => Err(ConvergeFailure::new(kind, error)),
    }
}

/// Batch delete with bounded retry: deletion is idempotent, so a transient
/// backend failure may be retried with exponential backoff. Already-absent
/// keys are tolerated; anything else in the failed list becomes a
/// [`ConvergeError::PartialFailure`].
async fn delete_batch(
    keys: &[ResourceKey],
    recurse: bool,
    client: &dyn RemoteClient,
    options: &ExecOptions,
) -> Result<DeleteReport, ConvergeFailure> {
    let mut attempt = 0u32;
    let report = loop {
        match client.delete(keys, recurse, options.dry_run).await {
            Ok(report) => break report,
            Err(ConvergeError::NotFound(key)) => {
                // Already absent as a whole: deletion is idempotent.
                break DeleteReport {
                    removed: Vec::new(),
                    missing: vec![key],
                    failed: Vec::new(),
                };
            }
            Err(error) if error.is_transient() && attempt < options.max_retries => {
                let delay = backoff_delay(options.retry_base_delay, attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure during delete, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(ConvergeFailure::new(ActionKind::Delete, error)),
        }
    };

    if !report.failed.is_empty() {
        return Err(ConvergeFailure::new(
            ActionKind::Delete,
            ConvergeError::PartialFailure {
                failures: report.failed,
            },
        ));
    }
    Ok(report)
}
