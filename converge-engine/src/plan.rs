//! Convergence planner — classifies the delta between desired and observed.
//!
//! The planner is a pure function: it performs no I/O, holds no state, and
//! is fully determined by its inputs. Callers run
//! [`DesiredState::validate`] first; the planner assumes well-formed input
//! and only reports classification-level problems.

use converge_types::{
    ConvergeError, ConvergenceAction, DesiredState, EndpointCreate, ObservedState,
};

/// Computes the action that converges `observed` toward `desired`.
///
/// - absent + presence desired → create
/// - present + absence desired → delete
/// - both present, semantically equal → no-op
/// - both present, differing → update (KV) or delete-then-create
///   (endpoints, which are immutable)
/// - lock intents always execute when a session is supplied: lock
///   ownership is not observable from the value alone, so equality of the
///   stored value says nothing about who holds the lock.
///
/// Bulk imports are flattened by the run layer and planned per leaf; they
/// never reach this function.
pub fn plan(
    desired: &DesiredState,
    observed: Option<&ObservedState>,
) -> Result<ConvergenceAction, ConvergeError> {
    match desired {
        DesiredState::EndpointPresent(spec) => match observed {
            None => Ok(ConvergenceAction::CreateEndpoint(EndpointCreate {
                spec: spec.clone(),
            })),
            Some(state) if spec.matches_observed(state) => Ok(ConvergenceAction::NoOp {
                key: Some(state.resource_key().clone()),
            }),
            Some(state) => Ok(ConvergenceAction::Replace {
                delete: vec![state.resource_key().clone()],
                create: EndpointCreate { spec: spec.clone() },
            }),
        },

        DesiredState::EndpointAbsent { endpoint_ids } => {
            // The backend's delete verb is a batch and tolerates absent ids
            // itself, so absence of an observation never turns this into a
            // no-op for the remaining ids.
            if observed.is_none() && endpoint_ids.len() == 1 {
                return Ok(ConvergenceAction::NoOp {
                    key: endpoint_ids.first().cloned(),
                });
            }
            Ok(ConvergenceAction::Delete {
                keys: endpoint_ids.clone(),
                recurse: false,
            })
        }

        DesiredState::KvPresent(spec) => match observed {
            None => Ok(ConvergenceAction::CreateKv(spec.clone())),
            Some(state) if spec.matches_observed(state) => Ok(ConvergenceAction::NoOp {
                key: Some(spec.resource_key()),
            }),
            Some(_) => Ok(ConvergenceAction::Update(spec.clone())),
        },

        DesiredState::KvAbsent { key, recurse } => match observed {
            None => Ok(ConvergenceAction::NoOp {
                key: Some(key.as_str().into()),
            }),
            Some(_) => Ok(ConvergenceAction::Delete {
                keys: vec![key.as_str().into()],
                recurse: *recurse,
            }),
        },

        // Lock transitions execute unconditionally: the attempt itself is
        // the only way to learn whether the session can take or free the
        // lock.
        DesiredState::KvAcquire(spec) => Ok(ConvergenceAction::AcquireLock(spec.clone())),
        DesiredState::KvRelease(spec) => Ok(ConvergenceAction::ReleaseLock(spec.clone())),

        DesiredState::KvImport { .. } => Err(ConvergeError::Validation(
            "bulk import must be converged via converge_import".into(),
        )),
    }
}
