//! Identifier newtypes used throughout the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of a remote entity: an endpoint id (`vpce-...`) or a
/// KV path (`config/db/host`). Immutable once assigned by creation or
/// supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key falls under the given `/`-separated prefix.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0 == prefix || self.0.starts_with(&format!("{}/", prefix.trim_end_matches('/')))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Error constructing an [`IdempotencyToken`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("idempotency token must not be empty")]
    Empty,
    #[error("idempotency token exceeds 64 characters ({0})")]
    TooLong(usize),
    #[error("idempotency token must be ASCII")]
    NonAscii,
}

/// Caller-supplied identifier ensuring a retried create is not duplicated.
///
/// The backend keeps tokens associated with created resources for an
/// unspecified cooldown after deletion, so a token must never be blindly
/// reissued: a reuse is only acceptable when the existing resource matches
/// the desired spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// Validates and wraps a caller-supplied token (ASCII, 1..=64 chars).
    pub fn new(token: impl Into<String>) -> Result<Self, TokenError> {
        let token = token.into();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        if token.len() > 64 {
            return Err(TokenError::TooLong(token.len()));
        }
        if !token.is_ascii() {
            return Err(TokenError::NonAscii);
        }
        Ok(Self(token))
    }

    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-tracked handle representing exclusive ownership of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(session: impl Into<String>) -> Self {
        Self(session.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing version of a KV entry.
///
/// Used for conditional writes: `ModifyIndex::ZERO` means "put only if the
/// key does not already exist"; any other value means "put only if the
/// current index still matches".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModifyIndex(u64);

impl ModifyIndex {
    /// The create-only sentinel.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ModifyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
