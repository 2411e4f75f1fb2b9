use std::sync::Arc;
use std::time::Duration;
use tokenkeeper::application_impl::*;
use tokenkeeper::application_port::*;
use tokenkeeper::domain_model::*;
use tokenkeeper::domain_port::*;
use tokenkeeper::infra_memory::*;
use tokenkeeper::logger::*;

// Walks one session through issue, auto-refresh, single-session eviction and revoke,
// using an in-process store and a hand-driven clock.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "tokenkeeper=debug".to_string(),
    })?;

    let config = TokenConfig {
        lifetime: Duration::from_secs(60),
        single_session: true,
        auto_refresh: true,
        secret_key: b"demo-secret".to_vec(),
        public_paths: vec!["/login".to_string()],
        ..TokenConfig::default()
    };
    let codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::from_config(&config));
    let clock = Arc::new(ManualClock::default());
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(
        SessionKeys::default(),
        codec.clone(),
        clock.clone(),
    ));
    let service = SessionTokenService::new(config, codec, store, clock.clone());

    let first = service.create("99", Claims::new()).await?;
    info!(expire_at = %first.record.expire_at, "first login");

    clock.advance(Duration::from_secs(40));
    let refreshed = service.validate(&first.token).await?;
    info!(expire_at = %refreshed.expire_at, "validated past the midpoint");

    let second = service.create("99", Claims::new()).await?;
    let first_result = service.validate(&first.token).await;
    info!(first_still_valid = first_result.is_ok(), "second login");

    let request = AuthRequest::new("GET", "/user").with_authorization(format!("Bearer {}", second.token));
    info!(authorized = service.authorize(&request).await.authorized, "protected request");

    info!(revoked = service.revoke(&second.token).await?, "logout");
    Ok(())
}
