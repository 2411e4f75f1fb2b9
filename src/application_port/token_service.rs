use crate::application_port::{AuthDecision, AuthRequest};
use crate::domain_model::{Claims, TokenRecord};
use crate::domain_port::StoreError;
use std::time::Duration;

pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Upper bound on a session lifetime; longer configured values are clamped.
pub const MAX_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);
pub const DEFAULT_TOKEN_ID_LENGTH: usize = 12;

/// Signing key used when none is configured.
///
/// This only exists so the service works without setup. Anyone who knows it can
/// mint valid tokens: always configure `secret_key` in a real deployment.
pub const DEFAULT_SECRET_KEY: &str = "tokenkeeper-insecure-default-key";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is empty")]
    TokenEmpty,
    #[error("token signature or algorithm is invalid")]
    TokenInvalid,
    #[error("token decode error")]
    TokenDecode,
    #[error("token encode error")]
    TokenEncode,
    #[error("token not found")]
    TokenNotFound,
    #[error("subject key is empty")]
    SubjectEmpty,
    #[error("get cache error: {0}")]
    StoreRead(String),
    #[error("set cache error: {0}")]
    StoreWrite(String),
    #[error("delete cache error: {0}")]
    StoreDelete(String),
    #[error("invalid mode: {0}")]
    InvalidMode(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for TokenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Read { .. } => TokenError::StoreRead(err.to_string()),
            StoreError::Write { .. } => TokenError::StoreWrite(err.to_string()),
            StoreError::Delete { .. } => TokenError::StoreDelete(err.to_string()),
            StoreError::Serialization(e) => TokenError::Serialization(e),
            StoreError::InvalidMode(mode) => TokenError::InvalidMode(mode),
        }
    }
}

/// Already-parsed configuration consumed by the lifecycle engine.
#[derive(Clone)]
pub struct TokenConfig {
    pub lifetime: Duration,
    /// A new login revokes every earlier session of the same subject.
    pub single_session: bool,
    /// A new login returns the subject's live session instead of minting one.
    pub multi_login: bool,
    /// Validation past the lifetime midpoint slides the expiry forward.
    pub auto_refresh: bool,
    pub secret_key: Vec<u8>,
    pub token_id_length: usize,
    pub public_paths: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            lifetime: DEFAULT_LIFETIME,
            single_session: false,
            multi_login: false,
            auto_refresh: false,
            secret_key: DEFAULT_SECRET_KEY.as_bytes().to_vec(),
            token_id_length: DEFAULT_TOKEN_ID_LENGTH,
            public_paths: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("lifetime", &self.lifetime)
            .field("single_session", &self.single_session)
            .field("multi_login", &self.multi_login)
            .field("auto_refresh", &self.auto_refresh)
            .field("secret_key", &"<redacted>")
            .field("token_id_length", &self.token_id_length)
            .field("public_paths", &self.public_paths)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub record: TokenRecord,
}

#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    async fn create(&self, subject: &str, claims: Claims) -> Result<IssuedToken, TokenError>;
    async fn validate(&self, token: &str) -> Result<TokenRecord, TokenError>;
    /// Returns `false` when the token was already gone.
    async fn revoke(&self, token: &str) -> Result<bool, TokenError>;
    /// Revokes every live session of `subject`, returning how many were removed.
    async fn revoke_subject(&self, subject: &str) -> Result<usize, TokenError>;
    async fn authorize(&self, request: &AuthRequest) -> AuthDecision;
    fn lifetime(&self) -> Duration;
}
