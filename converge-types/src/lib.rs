//! Core type definitions for the convergence engine.
//!
//! A convergence run compares a caller-supplied [`DesiredState`] against an
//! [`ObservedState`] snapshot fetched from a remote backend, classifies the
//! delta as a [`ConvergenceAction`], and reports a [`ConvergenceResult`].
//! Everything in this crate is a plain value object: no I/O, no handles, no
//! process-wide state.

mod action;
mod desired;
mod error;
mod flatten;
mod key;
mod observed;
mod result;

pub use action::{ActionKind, ConvergenceAction, EndpointCreate};
pub use desired::{DesiredState, EndpointSpec, KvSpec};
pub use error::{ConvergeError, ConvergeFailure};
pub use flatten::flatten_document;
pub use key::{IdempotencyToken, ModifyIndex, ResourceKey, SessionId, TokenError};
pub use observed::{EndpointState, Observation, ObservedState};
pub use result::{BulkOutcome, ConvergenceResult, DeleteReport};
