use crate::domain_model::{SubjectKey, TokenId, TokenRecord};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_KEY_PREFIX: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendMode {
    Memory,
    Redis,
    File,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendMode::Memory => "memory",
            BackendMode::Redis => "redis",
            BackendMode::File => "file",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "cache" => Ok(BackendMode::Memory),
            "redis" => Ok(BackendMode::Redis),
            "file" => Ok(BackendMode::File),
            _ => Err(StoreError::InvalidMode(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{backend} read failed: {message}")]
    Read {
        backend: BackendMode,
        message: String,
    },
    #[error("{backend} write failed: {message}")]
    Write {
        backend: BackendMode,
        message: String,
    },
    #[error("{backend} delete failed: {message}")]
    Delete {
        backend: BackendMode,
        message: String,
    },
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("invalid backend mode: {0:?}")]
    InvalidMode(String),
}

/// Key layout shared by every backend.
///
/// `{prefix}:token:{wire token}` holds a record and
/// `{prefix}:subject:{subject}` holds the ids issued to that subject.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    prefix: String,
}

impl SessionKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        SessionKeys {
            prefix: prefix.into(),
        }
    }

    pub fn token_key(&self, token: &str) -> String {
        format!("{}:token:{}", self.prefix, token)
    }

    pub fn subject_key(&self, subject: &SubjectKey) -> String {
        format!("{}:subject:{}", self.prefix, subject)
    }

    pub fn is_token_key(&self, key: &str) -> bool {
        key.strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with(":token:"))
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        SessionKeys::new(DEFAULT_KEY_PREFIX)
    }
}

/// Persistence contract for token records and their per-subject index.
///
/// Implementations own every physical storage operation; the lifecycle engine
/// only decides which of these to call.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    fn backend(&self) -> BackendMode;

    /// Stores a freshly issued record under `token` and adds its id to the
    /// owner's index, dropping ids whose records are gone.
    async fn insert(&self, token: &str, record: &TokenRecord, ttl: Duration)
    -> Result<(), StoreError>;

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Rewrites an existing record in place and extends the owner's index TTL.
    /// Writes nothing and returns `false` when the record is already gone, so a
    /// concurrent revoke is never undone.
    async fn update(&self, token: &str, record: &TokenRecord, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Deletes the record under `token` and its id from the owner's index.
    /// Returns `false` when the record was already gone.
    async fn remove(&self, token: &str, record: &TokenRecord) -> Result<bool, StoreError>;

    /// Ids in the subject's index whose records are still live.
    async fn subject_tokens(&self, subject: &SubjectKey) -> Result<Vec<TokenId>, StoreError>;

    /// Deletes the subject's index and every record it points at.
    async fn remove_subject(&self, subject: &SubjectKey) -> Result<usize, StoreError>;
}
