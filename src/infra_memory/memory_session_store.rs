use crate::application_port::TokenCodec;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error};

/// Minimum spacing between full scans for expired entries.
const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone)]
enum CacheValue {
    Record(TokenRecord),
    Index(Vec<TokenId>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expire_at: DateTime<Utc>,
}

/// In-process TTL cache holding records and per-subject id lists.
///
/// Index mutations for one subject are serialised behind a per-subject lock,
/// so the read-prune-write of the id list cannot interleave within a process.
///
/// Expired entries are dropped lazily on read and by a full sweep that runs
/// on insert at most once per [`SWEEP_INTERVAL_SECS`].
pub struct MemorySessionStore {
    entries: DashMap<String, CacheEntry>,
    last_sweep: AtomicI64,
    subject_locks: DashMap<SubjectKey, Arc<Mutex<()>>>,
    keys: SessionKeys,
    codec: Arc<dyn TokenCodec>,
    clock: Arc<dyn Clock>,
}

struct SubjectGuard<'a> {
    store: &'a MemorySessionStore,
    subject: SubjectKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // forget the lock once nobody else holds or waits on it
        self.store
            .subject_locks
            .remove_if(&self.subject, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl MemorySessionStore {
    pub fn new(keys: SessionKeys, codec: Arc<dyn TokenCodec>, clock: Arc<dyn Clock>) -> Self {
        MemorySessionStore {
            entries: DashMap::new(),
            last_sweep: AtomicI64::new(clock.now().timestamp()),
            subject_locks: DashMap::new(),
            keys,
            codec,
            clock,
        }
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expire_at > now);
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            debug!(backend = %BackendMode::Memory, swept, "expired entries swept");
        }
        swept
    }

    fn maybe_sweep(&self) {
        let now = self.clock.now().timestamp();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now - last < SWEEP_INTERVAL_SECS {
            return;
        }
        // one caller wins the slot, the rest carry on
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep_expired();
        }
    }

    async fn lock_subject(&self, subject: &SubjectKey) -> SubjectGuard<'_> {
        let lock = self
            .subject_locks
            .entry(subject.clone())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        SubjectGuard {
            store: self,
            subject: subject.clone(),
            guard: Some(guard),
        }
    }

    /// Live entry under `key`; an expired one is evicted on the way.
    fn live(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.expire_at > now => return Some(entry.value().clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries.remove_if(key, |_, entry| entry.expire_at <= now);
        None
    }

    fn live_index(&self, subject_key: &str) -> Option<(Vec<TokenId>, DateTime<Utc>)> {
        match self.live(subject_key) {
            Some(CacheEntry {
                value: CacheValue::Index(ids),
                expire_at,
            }) => Some((ids, expire_at)),
            _ => None,
        }
    }

    fn derive_token_key(&self, token_id: &TokenId) -> Result<String, StoreError> {
        let token = self.codec.encode(token_id, None).map_err(|e| {
            error!(backend = %BackendMode::Memory, token_id = %token_id, error = %e, "derive token key failed");
            StoreError::Serialization(e.to_string())
        })?;
        Ok(self.keys.token_key(&token))
    }

    fn token_exists(&self, token_id: &TokenId) -> Result<bool, StoreError> {
        let key = self.derive_token_key(token_id)?;
        Ok(self.live(&key).is_some())
    }

    /// Every live record keyed by its storage key. Expired entries are purged first.
    pub(crate) fn live_records(&self) -> BTreeMap<String, TokenRecord> {
        self.sweep_expired();
        self.entries
            .iter()
            .filter_map(|entry| match &entry.value().value {
                CacheValue::Record(record) => Some((entry.key().clone(), record.clone())),
                CacheValue::Index(_) => None,
            })
            .collect()
    }

    /// Re-inserts a record loaded from elsewhere, keeping its absolute expiry,
    /// and re-links it into its subject's index. Expired records are skipped.
    pub(crate) fn restore(&self, key: String, record: TokenRecord) -> bool {
        if record.remaining(self.clock.now()).is_none() {
            return false;
        }
        let expire_at = record.expire_at;
        let subject_key = self.keys.subject_key(&record.subject);
        let token_id = record.token_id.clone();

        self.entries.insert(
            key,
            CacheEntry {
                value: CacheValue::Record(record),
                expire_at,
            },
        );

        let mut index = self
            .entries
            .entry(subject_key)
            .or_insert_with(|| CacheEntry {
                value: CacheValue::Index(Vec::new()),
                expire_at,
            });
        if let CacheValue::Index(ids) = &mut index.value {
            if !ids.contains(&token_id) {
                ids.push(token_id);
            }
        }
        index.expire_at = index.expire_at.max(expire_at);
        true
    }

    #[cfg(test)]
    fn raw_index(&self, subject: &SubjectKey) -> Vec<TokenId> {
        self.live_index(&self.keys.subject_key(subject))
            .map(|(ids, _)| ids)
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> BackendMode {
        BackendMode::Memory
    }

    async fn insert(
        &self,
        token: &str,
        record: &TokenRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.maybe_sweep();
        let _guard = self.lock_subject(&record.subject).await;
        let expire_at = expire_after(self.clock.now(), ttl);

        self.entries.insert(
            self.keys.token_key(token),
            CacheEntry {
                value: CacheValue::Record(record.clone()),
                expire_at,
            },
        );

        let subject_key = self.keys.subject_key(&record.subject);
        let mut ids = Vec::new();
        if let Some((existing, _)) = self.live_index(&subject_key) {
            for id in existing {
                if id != record.token_id && self.token_exists(&id)? {
                    ids.push(id);
                }
            }
        }
        ids.push(record.token_id.clone());
        let sessions = ids.len();

        self.entries.insert(
            subject_key,
            CacheEntry {
                value: CacheValue::Index(ids),
                expire_at,
            },
        );
        debug!(backend = %BackendMode::Memory, subject = %record.subject, token_id = %record.token_id, sessions, "record stored");
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        match self.live(&self.keys.token_key(token)) {
            Some(CacheEntry {
                value: CacheValue::Record(record),
                ..
            }) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn update(
        &self,
        token: &str,
        record: &TokenRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock_subject(&record.subject).await;
        let token_key = self.keys.token_key(token);
        if self.live(&token_key).is_none() {
            debug!(backend = %BackendMode::Memory, token_id = %record.token_id, "update skipped, record gone");
            return Ok(false);
        }
        let expire_at = expire_after(self.clock.now(), ttl);

        self.entries.insert(
            token_key,
            CacheEntry {
                value: CacheValue::Record(record.clone()),
                expire_at,
            },
        );

        let subject_key = self.keys.subject_key(&record.subject);
        let mut ids = self
            .live_index(&subject_key)
            .map(|(ids, _)| ids)
            .unwrap_or_default();
        if !ids.contains(&record.token_id) {
            ids.push(record.token_id.clone());
        }
        self.entries.insert(
            subject_key,
            CacheEntry {
                value: CacheValue::Index(ids),
                expire_at,
            },
        );
        Ok(true)
    }

    async fn remove(&self, token: &str, record: &TokenRecord) -> Result<bool, StoreError> {
        let _guard = self.lock_subject(&record.subject).await;
        let now = self.clock.now();

        let removed = self
            .entries
            .remove(&self.keys.token_key(token))
            .is_some_and(|(_, entry)| entry.expire_at > now);

        let subject_key = self.keys.subject_key(&record.subject);
        if let Some((mut ids, expire_at)) = self.live_index(&subject_key) {
            ids.retain(|id| id != &record.token_id);
            if ids.is_empty() {
                self.entries.remove(&subject_key);
            } else {
                self.entries.insert(
                    subject_key,
                    CacheEntry {
                        value: CacheValue::Index(ids),
                        expire_at,
                    },
                );
            }
        }
        Ok(removed)
    }

    async fn subject_tokens(&self, subject: &SubjectKey) -> Result<Vec<TokenId>, StoreError> {
        let Some((ids, _)) = self.live_index(&self.keys.subject_key(subject)) else {
            return Ok(Vec::new());
        };
        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            if self.token_exists(&id)? {
                live.push(id);
            }
        }
        Ok(live)
    }

    async fn remove_subject(&self, subject: &SubjectKey) -> Result<usize, StoreError> {
        let _guard = self.lock_subject(subject).await;
        let now = self.clock.now();

        // drop the index first so no reader follows it into half-deleted records
        let Some((_, index)) = self.entries.remove(&self.keys.subject_key(subject)) else {
            return Ok(0);
        };
        let CacheValue::Index(ids) = index.value else {
            return Ok(0);
        };

        let mut removed = 0;
        for id in ids {
            let key = self.derive_token_key(&id)?;
            if let Some((_, entry)) = self.entries.remove(&key) {
                if entry.expire_at > now {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
