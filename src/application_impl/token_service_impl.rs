use crate::application_impl::{PathPolicy, TokenIdGenerator};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Token lifecycle engine: issue, validate (with sliding refresh), revoke.
///
/// Every storage effect goes through the [`SessionStore`]. Single-session
/// eviction runs before the new record is written, so a concurrent validator
/// may briefly see no session at all for the subject.
pub struct SessionTokenService {
    config: TokenConfig,
    codec: Arc<dyn TokenCodec>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ids: TokenIdGenerator,
    policy: PathPolicy,
}

impl SessionTokenService {
    pub fn new(
        config: TokenConfig,
        codec: Arc<dyn TokenCodec>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut config = config;
        if config.lifetime.is_zero() {
            warn!(default = ?DEFAULT_LIFETIME, "session lifetime unset, using default");
            config.lifetime = DEFAULT_LIFETIME;
        } else if config.lifetime > MAX_LIFETIME {
            warn!(lifetime = ?config.lifetime, max = ?MAX_LIFETIME, "session lifetime clamped");
            config.lifetime = MAX_LIFETIME;
        }
        let ids = TokenIdGenerator::new(config.token_id_length);
        let policy = PathPolicy::new(&config.public_paths);
        Self {
            config,
            codec,
            store,
            clock,
            ids,
            policy,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn subject_key(subject: &str) -> Result<SubjectKey, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::SubjectEmpty);
        }
        Ok(SubjectKey(subject.to_owned()))
    }

    /// First live session of `subject`, with its re-derived wire token.
    async fn live_session(&self, subject: &SubjectKey) -> Result<Option<IssuedToken>, TokenError> {
        for token_id in self.store.subject_tokens(subject).await? {
            let token = self.codec.encode(&token_id, None)?;
            if let Some(record) = self.store.get(&token).await? {
                if record.token_id == token_id {
                    return Ok(Some(IssuedToken { token, record }));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl TokenService for SessionTokenService {
    async fn create(&self, subject: &str, claims: Claims) -> Result<IssuedToken, TokenError> {
        let subject = Self::subject_key(subject)?;

        if self.config.multi_login {
            if let Some(existing) = self.live_session(&subject).await? {
                debug!(subject = %subject, token_id = %existing.record.token_id, "reusing live session");
                return Ok(existing);
            }
        }

        if self.config.single_session {
            let evicted = self.store.remove_subject(&subject).await?;
            if evicted > 0 {
                info!(subject = %subject, evicted, "single session: previous sessions revoked");
            }
        }

        let token_id = self.ids.generate();
        let token = self.codec.encode(&token_id, None)?;
        let record = TokenRecord::new(
            subject,
            token_id,
            claims,
            self.clock.now(),
            self.config.lifetime,
        );
        self.store
            .insert(&token, &record, self.config.lifetime)
            .await?;

        info!(subject = %record.subject, token_id = %record.token_id, "session created");
        Ok(IssuedToken { token, record })
    }

    async fn validate(&self, token: &str) -> Result<TokenRecord, TokenError> {
        let decoded = self.codec.decode(token)?;

        let Some(mut record) = self.store.get(token).await? else {
            debug!(token_id = %decoded.token_id, "session not found");
            return Err(TokenError::TokenNotFound);
        };
        if record.token_id != decoded.token_id {
            warn!(
                token_id = %decoded.token_id,
                stored = %record.token_id,
                "token id does not match stored session"
            );
            return Err(TokenError::TokenNotFound);
        }

        let now = self.clock.now();
        if self.config.auto_refresh && record.is_refresh_due(now) {
            record.restart(now, self.config.lifetime);
            let refreshed = self
                .store
                .update(token, &record, self.config.lifetime)
                .await?;
            if !refreshed {
                debug!(token_id = %record.token_id, "session revoked before refresh");
                return Err(TokenError::TokenNotFound);
            }
            debug!(subject = %record.subject, token_id = %record.token_id, expire_at = %record.expire_at, "session refreshed");
        }

        Ok(record)
    }

    async fn revoke(&self, token: &str) -> Result<bool, TokenError> {
        let decoded = self.codec.decode(token)?;

        let record = match self.store.get(token).await? {
            Some(record) if record.token_id == decoded.token_id => record,
            _ => {
                debug!(token_id = %decoded.token_id, "revoke: session already gone");
                return Ok(false);
            }
        };

        let removed = self.store.remove(token, &record).await?;
        if removed {
            info!(subject = %record.subject, token_id = %record.token_id, "session revoked");
        }
        Ok(removed)
    }

    async fn revoke_subject(&self, subject: &str) -> Result<usize, TokenError> {
        let subject = Self::subject_key(subject)?;
        let removed = self.store.remove_subject(&subject).await?;
        info!(subject = %subject, removed, "subject sessions revoked");
        Ok(removed)
    }

    async fn authorize(&self, request: &AuthRequest) -> AuthDecision {
        if !self.policy.is_protected(&request.path, &request.method) {
            return decide(false, None);
        }

        let validation = match request.token() {
            Some(token) => Some(self.validate(&token).await),
            None => None,
        };
        let decision = decide(true, validation.as_ref());
        if !decision.authorized {
            debug!(method = %request.method, path = %request.path, "request unauthorized");
        }
        decision
    }

    fn lifetime(&self) -> Duration {
        self.config.lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::JwtHs256Codec;
    use crate::infra_memory::MemorySessionStore;
    use serde_json::json;

    const LIFETIME: Duration = Duration::from_secs(100);

    struct Fixture {
        service: SessionTokenService,
        clock: Arc<ManualClock>,
        store: Arc<MemorySessionStore>,
    }

    fn fixture(config: TokenConfig) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(&config.secret_key));
        let store = Arc::new(MemorySessionStore::new(
            SessionKeys::default(),
            codec.clone(),
            clock.clone(),
        ));
        let service = SessionTokenService::new(config, codec, store.clone(), clock.clone());
        Fixture {
            service,
            clock,
            store,
        }
    }

    fn config() -> TokenConfig {
        TokenConfig {
            lifetime: LIFETIME,
            ..TokenConfig::default()
        }
    }

    fn claims() -> Claims {
        let mut claims = Claims::new();
        claims.insert("username".to_string(), json!("John Doe"));
        claims.insert("role".to_string(), json!("super-admin"));
        claims
    }

    #[tokio::test]
    async fn create_then_validate() {
        let f = fixture(config());
        let issued = f.service.create("ab3cl2", claims()).await.unwrap();

        let record = f.service.validate(&issued.token).await.unwrap();
        assert_eq!(record.subject, SubjectKey::from("ab3cl2"));
        assert_eq!(record.claims, claims());
        assert_eq!(record, issued.record);
        assert_eq!(record.refresh_at, record.created_at + LIFETIME / 2);
        assert_eq!(record.expire_at, record.created_at + LIFETIME);
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let f = fixture(config());
        assert!(matches!(
            f.service.create("", Claims::new()).await,
            Err(TokenError::SubjectEmpty)
        ));
        assert!(matches!(
            f.service.revoke_subject("").await,
            Err(TokenError::SubjectEmpty)
        ));
    }

    #[tokio::test]
    async fn revoke_then_validate_fails() {
        let f = fixture(config());
        let issued = f.service.create("ab3cl2", Claims::new()).await.unwrap();

        assert!(f.service.revoke(&issued.token).await.unwrap());
        assert!(matches!(
            f.service.validate(&issued.token).await,
            Err(TokenError::TokenNotFound)
        ));
        assert!(!f.service.revoke(&issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_tokens() {
        let f = fixture(config());
        assert!(matches!(
            f.service.validate("").await,
            Err(TokenError::TokenEmpty)
        ));
        assert!(matches!(
            f.service.validate("garbage").await,
            Err(TokenError::TokenDecode)
        ));

        let foreign = JwtHs256Codec::new(b"someone-else")
            .encode(&TokenId("abc".to_string()), None)
            .unwrap();
        assert!(matches!(
            f.service.validate(&foreign).await,
            Err(TokenError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn single_session_keeps_latest_only() {
        let f = fixture(TokenConfig {
            single_session: true,
            ..config()
        });
        let first = f.service.create("u1", Claims::new()).await.unwrap();
        let second = f.service.create("u1", Claims::new()).await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(matches!(
            f.service.validate(&first.token).await,
            Err(TokenError::TokenNotFound)
        ));
        assert!(f.service.validate(&second.token).await.is_ok());
        assert_eq!(
            f.store.subject_tokens(&SubjectKey::from("u1")).await.unwrap(),
            vec![second.record.token_id]
        );
    }

    #[tokio::test]
    async fn multi_session_keeps_all() {
        let f = fixture(config());
        let first = f.service.create("u1", Claims::new()).await.unwrap();
        let second = f.service.create("u1", Claims::new()).await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(f.service.validate(&first.token).await.is_ok());
        assert!(f.service.validate(&second.token).await.is_ok());
        assert_eq!(
            f.store
                .subject_tokens(&SubjectKey::from("u1"))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn multi_login_reuses_live_token() {
        let f = fixture(TokenConfig {
            multi_login: true,
            ..config()
        });
        let first = f.service.create("u1", claims()).await.unwrap();
        let second = f.service.create("u1", Claims::new()).await.unwrap();

        assert_eq!(first.token, second.token);
        // no claim merge on reuse
        assert_eq!(second.record.claims, claims());

        f.service.revoke(&first.token).await.unwrap();
        let third = f.service.create("u1", Claims::new()).await.unwrap();
        assert_ne!(third.token, first.token);
    }

    #[tokio::test]
    async fn auto_refresh_slides_expiry() {
        let f = fixture(TokenConfig {
            auto_refresh: true,
            ..config()
        });
        let issued = f.service.create("u1", Claims::new()).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        let refreshed = f.service.validate(&issued.token).await.unwrap();
        assert_eq!(refreshed.expire_at, f.clock.now() + LIFETIME);
        assert_eq!(refreshed.token_id, issued.record.token_id);

        // past the original expiry, inside the refreshed window
        f.clock.advance(Duration::from_secs(50));
        assert!(f.clock.now() > issued.record.expire_at);
        assert!(f.service.validate(&issued.token).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_waits_for_midpoint() {
        let f = fixture(TokenConfig {
            auto_refresh: true,
            ..config()
        });
        let issued = f.service.create("u1", Claims::new()).await.unwrap();

        f.clock.advance(Duration::from_secs(30));
        let record = f.service.validate(&issued.token).await.unwrap();
        assert_eq!(record.expire_at, issued.record.expire_at);
    }

    #[tokio::test]
    async fn without_auto_refresh_token_expires() {
        let f = fixture(config());
        let issued = f.service.create("u1", Claims::new()).await.unwrap();

        f.clock.advance(Duration::from_secs(60));
        let record = f.service.validate(&issued.token).await.unwrap();
        assert_eq!(record.expire_at, issued.record.expire_at);

        f.clock.advance(Duration::from_secs(50));
        assert!(matches!(
            f.service.validate(&issued.token).await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn stale_id_under_reused_key_is_rejected() {
        let f = fixture(config());
        let issued = f.service.create("u1", Claims::new()).await.unwrap();

        let mut tampered = issued.record.clone();
        tampered.token_id = TokenId("someone-else".to_string());
        assert!(
            f.store
                .update(&issued.token, &tampered, LIFETIME)
                .await
                .unwrap()
        );

        assert!(matches!(
            f.service.validate(&issued.token).await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn revoke_subject_removes_every_session() {
        let f = fixture(config());
        let a = f.service.create("u1", Claims::new()).await.unwrap();
        let b = f.service.create("u1", Claims::new()).await.unwrap();
        let other = f.service.create("u2", Claims::new()).await.unwrap();

        assert_eq!(f.service.revoke_subject("u1").await.unwrap(), 2);
        assert!(f.service.validate(&a.token).await.is_err());
        assert!(f.service.validate(&b.token).await.is_err());
        assert!(f.service.validate(&other.token).await.is_ok());
        assert_eq!(f.service.revoke_subject("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn authorize_applies_policy_and_validation() {
        let f = fixture(TokenConfig {
            public_paths: vec!["/login".to_string(), "POST:/logout".to_string()],
            ..config()
        });
        let issued = f.service.create("u1", claims()).await.unwrap();

        let public = f.service.authorize(&AuthRequest::new("POST", "/login")).await;
        assert!(public.authorized);

        let anonymous = f.service.authorize(&AuthRequest::new("GET", "/user")).await;
        assert!(!anonymous.authorized);
        assert!(anonymous.rejection().is_some());

        let request = AuthRequest::new("GET", "/user")
            .with_authorization(format!("Bearer {}", issued.token));
        let decision = f.service.authorize(&request).await;
        assert!(decision.authorized);
        assert_eq!(decision.claims, claims());

        let request = AuthRequest::new("DELETE", "/logout").with_param("token", issued.token);
        assert!(f.service.authorize(&request).await.authorized);

        let request = AuthRequest::new("GET", "/user").with_authorization("Bearer nope");
        assert!(!f.service.authorize(&request).await.authorized);
    }

    #[tokio::test]
    async fn zero_lifetime_means_default() {
        let f = fixture(TokenConfig {
            lifetime: Duration::ZERO,
            ..config()
        });
        assert_eq!(f.service.lifetime(), DEFAULT_LIFETIME);

        let issued = f.service.create("u1", Claims::new()).await.unwrap();
        assert!(f.service.validate(&issued.token).await.is_ok());
        assert_eq!(
            issued.record.remaining(f.clock.now()),
            Some(DEFAULT_LIFETIME)
        );
    }

    #[tokio::test]
    async fn huge_lifetime_is_clamped() {
        let f = fixture(TokenConfig {
            lifetime: Duration::from_secs(u64::MAX),
            ..config()
        });
        assert_eq!(f.service.lifetime(), MAX_LIFETIME);

        let issued = f.service.create("u1", Claims::new()).await.unwrap();
        assert!(f.service.validate(&issued.token).await.is_ok());
    }

    /// Hands out the record and revokes it before the caller can act on it.
    struct RevokeAfterRead {
        inner: Arc<MemorySessionStore>,
    }

    #[async_trait::async_trait]
    impl SessionStore for RevokeAfterRead {
        fn backend(&self) -> BackendMode {
            BackendMode::Memory
        }

        async fn insert(&self, token: &str, record: &TokenRecord, ttl: Duration) -> Result<(), StoreError> {
            self.inner.insert(token, record, ttl).await
        }

        async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
            let record = self.inner.get(token).await?;
            if let Some(record) = &record {
                self.inner.remove(token, record).await?;
            }
            Ok(record)
        }

        async fn update(&self, token: &str, record: &TokenRecord, ttl: Duration) -> Result<bool, StoreError> {
            self.inner.update(token, record, ttl).await
        }

        async fn remove(&self, token: &str, record: &TokenRecord) -> Result<bool, StoreError> {
            self.inner.remove(token, record).await
        }

        async fn subject_tokens(&self, subject: &SubjectKey) -> Result<Vec<TokenId>, StoreError> {
            self.inner.subject_tokens(subject).await
        }

        async fn remove_subject(&self, subject: &SubjectKey) -> Result<usize, StoreError> {
            self.inner.remove_subject(subject).await
        }
    }

    #[tokio::test]
    async fn refresh_does_not_resurrect_revoked_session() {
        let config = TokenConfig {
            auto_refresh: true,
            ..config()
        };
        let clock = Arc::new(ManualClock::default());
        let codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(&config.secret_key));
        let inner = Arc::new(MemorySessionStore::new(
            SessionKeys::default(),
            codec.clone(),
            clock.clone(),
        ));
        let store = Arc::new(RevokeAfterRead {
            inner: inner.clone(),
        });
        let service = SessionTokenService::new(config, codec, store, clock.clone());

        let issued = service.create("u1", Claims::new()).await.unwrap();
        clock.advance(Duration::from_secs(60));

        assert!(matches!(
            service.validate(&issued.token).await,
            Err(TokenError::TokenNotFound)
        ));
        assert_eq!(inner.get(&issued.token).await.unwrap(), None);
        assert!(
            inner
                .subject_tokens(&SubjectKey::from("u1"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl SessionStore for BrokenStore {
        fn backend(&self) -> BackendMode {
            BackendMode::Redis
        }

        async fn insert(&self, _: &str, _: &TokenRecord, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Write {
                backend: BackendMode::Redis,
                message: "connection refused".to_string(),
            })
        }

        async fn get(&self, _: &str) -> Result<Option<TokenRecord>, StoreError> {
            Err(StoreError::Read {
                backend: BackendMode::Redis,
                message: "connection refused".to_string(),
            })
        }

        async fn update(&self, _: &str, _: &TokenRecord, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Write {
                backend: BackendMode::Redis,
                message: "connection refused".to_string(),
            })
        }

        async fn remove(&self, _: &str, _: &TokenRecord) -> Result<bool, StoreError> {
            Err(StoreError::Delete {
                backend: BackendMode::Redis,
                message: "connection refused".to_string(),
            })
        }

        async fn subject_tokens(&self, _: &SubjectKey) -> Result<Vec<TokenId>, StoreError> {
            Ok(Vec::new())
        }

        async fn remove_subject(&self, _: &SubjectKey) -> Result<usize, StoreError> {
            Err(StoreError::Delete {
                backend: BackendMode::Redis,
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(b"secret"));
        let service = SessionTokenService::new(
            config(),
            codec.clone(),
            Arc::new(BrokenStore),
            Arc::new(SystemClock),
        );

        assert!(matches!(
            service.create("u1", Claims::new()).await,
            Err(TokenError::StoreWrite(_))
        ));

        let token = codec.encode(&TokenId("abc".to_string()), None).unwrap();
        assert!(matches!(
            service.validate(&token).await,
            Err(TokenError::StoreRead(_))
        ));
        assert!(matches!(
            service.revoke_subject("u1").await,
            Err(TokenError::StoreDelete(_))
        ));
    }
}
