//! In-memory reference backends for the convergence engine.
//!
//! These implement [`converge_engine::RemoteClient`] with the same
//! observable semantics as the real backends — monotonic modify indices,
//! CAS guards, lock sessions, idempotency-token binding, lifecycle
//! transitions — so engine behavior can be exercised end to end without a
//! network. They double as an executable model of what the engine assumes
//! about a backend.

mod endpoint;
mod kv;

pub use endpoint::MemoryEndpoints;
pub use kv::MemoryKv;
