use crate::application_port::TokenCodec;
use crate::domain_model::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const UPDATE_IF_PRESENT: &str = include_str!("update_if_present.lua");

/// Records as JSON strings under `{prefix}:token:*`, indexes as native sets
/// under `{prefix}:subject:*`.
///
/// Dead ids are pruned with `SREM` of exactly those ids, so concurrent `SADD`s
/// for the same subject are never overwritten. Refreshes go through a script
/// that writes with `SET ... XX`, so a revoked record stays gone.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    keys: SessionKeys,
    codec: Arc<dyn TokenCodec>,
}

fn read_failed(e: RedisError) -> StoreError {
    error!(backend = %BackendMode::Redis, error = %e, "redis read failed");
    StoreError::Read {
        backend: BackendMode::Redis,
        message: e.to_string(),
    }
}

fn write_failed(e: RedisError) -> StoreError {
    error!(backend = %BackendMode::Redis, error = %e, "redis write failed");
    StoreError::Write {
        backend: BackendMode::Redis,
        message: e.to_string(),
    }
}

fn delete_failed(e: RedisError) -> StoreError {
    error!(backend = %BackendMode::Redis, error = %e, "redis delete failed");
    StoreError::Delete {
        backend: BackendMode::Redis,
        message: e.to_string(),
    }
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn expire_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX)
}

fn encode_record(record: &TokenRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| {
        error!(token_id = %record.token_id, error = %e, "serialize token record failed");
        StoreError::Serialization(e.to_string())
    })
}

fn decode_record(raw: &str) -> Result<TokenRecord, StoreError> {
    serde_json::from_str(raw).map_err(|e| {
        error!(error = %e, "deserialize token record failed");
        StoreError::Serialization(e.to_string())
    })
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, keys: SessionKeys, codec: Arc<dyn TokenCodec>) -> Self {
        RedisSessionStore { conn, keys, codec }
    }

    fn derive_token_key(&self, token_id: &TokenId) -> Result<String, StoreError> {
        let token = self.codec.encode(token_id, None).map_err(|e| {
            error!(backend = %BackendMode::Redis, token_id = %token_id, error = %e, "derive token key failed");
            StoreError::Serialization(e.to_string())
        })?;
        Ok(self.keys.token_key(&token))
    }

    async fn members(&self, subject_key: &str) -> Result<Vec<TokenId>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(subject_key).await.map_err(read_failed)?;
        Ok(ids.into_iter().map(TokenId).collect())
    }

    /// Splits `ids` into live ones and ones whose record is gone.
    async fn partition_live(
        &self,
        ids: Vec<TokenId>,
    ) -> Result<(Vec<TokenId>, Vec<TokenId>), StoreError> {
        let mut conn = self.conn.clone();
        let mut live = Vec::with_capacity(ids.len());
        let mut dead = Vec::new();
        for id in ids {
            let key = self.derive_token_key(&id)?;
            let exists: bool = conn.exists(&key).await.map_err(read_failed)?;
            if exists {
                live.push(id);
            } else {
                dead.push(id);
            }
        }
        Ok((live, dead))
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    fn backend(&self) -> BackendMode {
        BackendMode::Redis
    }

    async fn insert(
        &self,
        token: &str,
        record: &TokenRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let subject_key = self.keys.subject_key(&record.subject);
        let existing = self.members(&subject_key).await?;
        let (_, dead) = self.partition_live(existing).await?;

        let mut conn = self.conn.clone();
        if !dead.is_empty() {
            let dead: Vec<&str> = dead.iter().map(TokenId::as_str).collect();
            let _: () = conn.srem(&subject_key, dead).await.map_err(write_failed)?;
        }

        let value = encode_record(record)?;
        let _: () = redis::pipe()
            .atomic()
            .pset_ex(self.keys.token_key(token), value, ttl_millis(ttl))
            .ignore()
            .sadd(&subject_key, record.token_id.as_str())
            .ignore()
            .pexpire(&subject_key, expire_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(write_failed)?;

        debug!(backend = %BackendMode::Redis, subject = %record.subject, token_id = %record.token_id, "record stored");
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.keys.token_key(token))
            .await
            .map_err(read_failed)?;
        raw.as_deref().map(decode_record).transpose()
    }

    async fn update(
        &self,
        token: &str,
        record: &TokenRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let value = encode_record(record)?;
        let mut conn = self.conn.clone();
        let written: i64 = Script::new(UPDATE_IF_PRESENT)
            .key(self.keys.token_key(token))
            .key(self.keys.subject_key(&record.subject))
            .arg(value)
            .arg(ttl_millis(ttl))
            .arg(record.token_id.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(write_failed)?;
        if written == 0 {
            debug!(backend = %BackendMode::Redis, token_id = %record.token_id, "update skipped, record gone");
        }
        Ok(written == 1)
    }

    async fn remove(&self, token: &str, record: &TokenRecord) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn
            .del(self.keys.token_key(token))
            .await
            .map_err(delete_failed)?;
        // an emptied set disappears on its own
        let _: () = conn
            .srem(self.keys.subject_key(&record.subject), record.token_id.as_str())
            .await
            .map_err(delete_failed)?;
        Ok(deleted > 0)
    }

    async fn subject_tokens(&self, subject: &SubjectKey) -> Result<Vec<TokenId>, StoreError> {
        let ids = self.members(&self.keys.subject_key(subject)).await?;
        let (mut live, _) = self.partition_live(ids).await?;
        live.sort();
        Ok(live)
    }

    async fn remove_subject(&self, subject: &SubjectKey) -> Result<usize, StoreError> {
        let subject_key = self.keys.subject_key(subject);
        let ids = self.members(&subject_key).await?;

        let mut conn = self.conn.clone();
        let _: () = conn.del(&subject_key).await.map_err(delete_failed)?;

        let mut removed = 0;
        for id in ids {
            let key = self.derive_token_key(&id)?;
            let deleted: i64 = conn.del(&key).await.map_err(delete_failed)?;
            if deleted > 0 {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
