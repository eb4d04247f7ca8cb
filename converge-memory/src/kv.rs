//! In-memory KV store with CAS and lock-session semantics.

use async_trait::async_trait;
use converge_engine::{Created, FetchOutcome, KvWrite, RemoteClient, WriteOutcome};
use converge_types::{
    ConvergeError, DeleteReport, EndpointSpec, ModifyIndex, ObservedState, ResourceKey, SessionId,
};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    flags: u64,
    modify_index: ModifyIndex,
    lock_session: Option<SessionId>,
}

#[derive(Debug, Default)]
struct KvInner {
    entries: BTreeMap<String, KvEntry>,
    /// Sessions the backend considers alive. Writes with an unregistered
    /// session are refused (committed = false), not errors.
    sessions: HashSet<SessionId>,
    index: ModifyIndex,
}

/// An in-memory KV backend.
///
/// Guard semantics per write:
/// - `cas = 0`: commit only if the key does not exist.
/// - `cas = n`: commit only if the key's current modify index is `n`.
/// - `acquire`: commit only if the session is alive and the lock is free;
///   re-acquiring an already-held lock reports `committed = false` (nothing
///   changed), as does contention with another holder.
/// - `release`: commit only if this session holds the lock.
///
/// Every committed write bumps the store-wide index and stamps the entry.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: RwLock<KvInner>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a session as alive so acquire/release writes can use it.
    pub async fn register_session(&self, session: SessionId) {
        self.inner.write().await.sessions.insert(session);
    }

    /// Invalidates a session and frees any locks it holds.
    pub async fn invalidate_session(&self, session: &SessionId) {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(session);
        for entry in inner.entries.values_mut() {
            if entry.lock_session.as_ref() == Some(session) {
                entry.lock_session = None;
            }
        }
    }

    /// Current modify index of a key, for test assertions.
    pub async fn modify_index_of(&self, key: &str) -> Option<ModifyIndex> {
        self.inner
            .read()
            .await
            .entries
            .get(key)
            .map(|e| e.modify_index)
    }

    fn observe(key: &str, entry: &KvEntry) -> ObservedState {
        ObservedState::Kv {
            key: ResourceKey::new(key),
            value: entry.value.clone(),
            flags: entry.flags,
            modify_index: entry.modify_index,
            lock_session: entry.lock_session.clone(),
        }
    }

    fn matches_prefix(key: &str, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        key == prefix || key.starts_with(&format!("{prefix}/"))
    }
}

#[async_trait]
impl RemoteClient for MemoryKv {
    async fn fetch(&self, key: &ResourceKey) -> Result<FetchOutcome, ConvergeError> {
        let inner = self.inner.read().await;
        Ok(match inner.entries.get(key.as_str()) {
            Some(entry) => FetchOutcome::Found(Self::observe(key.as_str(), entry)),
            None => FetchOutcome::Missing,
        })
    }

    async fn create(&self, _spec: &EndpointSpec, _dry_run: bool) -> Result<Created, ConvergeError> {
        Err(ConvergeError::Unsupported(
            "the KV backend has no create verb; use a conditional write",
        ))
    }

    async fn delete(
        &self,
        keys: &[ResourceKey],
        recurse: bool,
        dry_run: bool,
    ) -> Result<DeleteReport, ConvergeError> {
        let mut inner = self.inner.write().await;
        let mut report = DeleteReport::default();
        for key in keys {
            let matched: Vec<String> = if recurse {
                inner
                    .entries
                    .keys()
                    .filter(|k| Self::matches_prefix(k, key.as_str()))
                    .cloned()
                    .collect()
            } else {
                inner
                    .entries
                    .contains_key(key.as_str())
                    .then(|| key.as_str().to_string())
                    .into_iter()
                    .collect()
            };
            if matched.is_empty() {
                report.missing.push(key.clone());
                continue;
            }
            for k in matched {
                if !dry_run {
                    inner.entries.remove(&k);
                }
                report.removed.push(ResourceKey::new(k));
            }
        }
        Ok(report)
    }

    async fn conditional_write(&self, write: &KvWrite) -> Result<WriteOutcome, ConvergeError> {
        let mut inner = self.inner.write().await;
        let key = write.key.as_str().to_string();
        let current_index = inner
            .entries
            .get(&key)
            .map(|e| e.modify_index)
            .unwrap_or(ModifyIndex::ZERO);
        let refused = WriteOutcome {
            committed: false,
            index: current_index,
        };

        if let Some(cas) = write.cas {
            let exists = inner.entries.contains_key(&key);
            let guard_holds = if cas == ModifyIndex::ZERO {
                !exists
            } else {
                exists && current_index == cas
            };
            if !guard_holds {
                return Ok(refused);
            }
        }

        // Lock transitions are part of the same put verb.
        let mut lock_session = inner.entries.get(&key).and_then(|e| e.lock_session.clone());
        if let Some(session) = &write.acquire {
            if !inner.sessions.contains(session) {
                return Ok(refused);
            }
            match &lock_session {
                None => lock_session = Some(session.clone()),
                // Already held by this session or by another holder: the
                // attempt does not take effect either way.
                Some(_) => return Ok(refused),
            }
        }
        if let Some(session) = &write.release {
            if lock_session.as_ref() != Some(session) {
                return Ok(refused);
            }
            lock_session = None;
        }

        let next = inner.index.next();
        inner.index = next;
        let flags = write
            .flags
            .or_else(|| inner.entries.get(&key).map(|e| e.flags))
            .unwrap_or(0);
        inner.entries.insert(
            key,
            KvEntry {
                value: write.value.clone(),
                flags,
                modify_index: next,
                lock_session,
            },
        );
        Ok(WriteOutcome {
            committed: true,
            index: next,
        })
    }

    async fn bulk_fetch_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(ResourceKey, ObservedState)>, ConvergeError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|(k, _)| Self::matches_prefix(k, prefix))
            .map(|(k, entry)| (ResourceKey::new(k.clone()), Self::observe(k, entry)))
            .collect())
    }
}
