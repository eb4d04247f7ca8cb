//! Declarative convergence engine.
//!
//! Compares a desired-state declaration against observed remote state and
//! converges it through a [`RemoteClient`] with idempotent, retryable,
//! partially-failable operations.
//!
//! # Architecture
//!
//! - [`plan`] is a pure function: `(desired, observed) -> action`. No I/O.
//! - [`execute`] applies one action through a client, handling dry-run,
//!   CAS conflicts, idempotent deletion, lock contention, and bounded
//!   retries of transient failures.
//! - [`wait_for_status`] polls a resource until it reaches a target
//!   lifecycle status or a timeout elapses.
//! - [`converge`] ties the above together for one request; each call is
//!   independent and stateless — the client handle lives only for the
//!   duration of the call.
//!
//! Concurrent callers converging the same key serialize through the
//! backend's own CAS/session mechanism; the engine itself takes no locks.

pub mod client;
pub mod executor;
pub mod plan;
pub mod run;
pub mod waiter;

pub use client::{Created, FetchOutcome, KvWrite, RemoteClient, WriteOutcome};
pub use executor::{execute, ExecOptions};
pub use plan::plan;
pub use run::{converge, converge_import, ConvergenceRequest};
pub use waiter::{wait_for_status, WaitConfig, WaitOutcome};
