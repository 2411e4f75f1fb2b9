use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_file::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;

pub struct Server {
    pub token_service: Arc<dyn TokenService>,
}

impl Server {
    pub fn new(token_service: Arc<dyn TokenService>) -> Self {
        Server { token_service }
    }

    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let backend: BackendMode = settings.token.backend.parse()?;
        let config = settings.token.to_token_config();
        debug!(?config);

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::from_config(&config));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let keys = SessionKeys::new(settings.token.key_prefix.clone());

        let session_store: Arc<dyn SessionStore> = match backend {
            BackendMode::Memory => Arc::new(MemorySessionStore::new(
                keys,
                token_codec.clone(),
                clock.clone(),
            )),
            BackendMode::Redis => {
                let redis_client = redis::Client::open(settings.redis.dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisSessionStore::new(
                    redis_manager,
                    keys,
                    token_codec.clone(),
                ))
            }
            BackendMode::File => {
                let inner = MemorySessionStore::new(keys, token_codec.clone(), clock.clone());
                Arc::new(FileSessionStore::open(settings.file.path.clone(), inner).await?)
            }
        };

        let token_service: Arc<dyn TokenService> = Arc::new(SessionTokenService::new(
            config,
            token_codec,
            session_store,
            clock,
        ));

        info!(%backend, "server started");
        Ok(Self::new(token_service))
    }
}
