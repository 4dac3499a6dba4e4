use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_postgres::*;
use crate::infra_webhook::*;
use crate::logger::*;
use crate::settings::Settings;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

/// The storage a server runs on.
struct Storage {
    tx_manager: Arc<dyn TxManager>,
    refresh_repo: Arc<dyn RefreshTokenRepo>,
    blacklist_repo: Arc<dyn BlacklistRepo>,
    pool: Option<PgPool>,
}

impl Storage {
    async fn postgres(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings
            .store
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("store.url is not set"))?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.store.max_connections)
            .acquire_timeout(Duration::from_secs(settings.store.acquire_timeout_secs))
            .connect(url)
            .await?;
        ensure_schema(&pool).await?;
        info!("connected to postgres");

        Ok(Self {
            tx_manager: Arc::new(PgTxManager::new(pool.clone())),
            refresh_repo: Arc::new(PgRefreshTokenRepo::new(pool.clone())),
            blacklist_repo: Arc::new(PgBlacklistRepo::new(pool.clone())),
            pool: Some(pool),
        })
    }

    fn memory() -> Self {
        warn!("using the in-memory store, state is lost on exit");
        let store = MemoryTokenStore::new();
        Self {
            tx_manager: Arc::new(store.clone()),
            refresh_repo: Arc::new(store.clone()),
            blacklist_repo: Arc::new(store),
            pool: None,
        }
    }
}

pub struct Server {
    pub token_service: Arc<dyn TokenService>,
    pub access_guard: Arc<dyn AccessGuard>,
    pool: Option<PgPool>,
}

impl Server {
    pub fn new(token_service: Arc<dyn TokenService>, access_guard: Arc<dyn AccessGuard>) -> Self {
        Self {
            token_service,
            access_guard,
            pool: None,
        }
    }

    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let storage = match settings.store.backend.as_str() {
            "postgres" => Storage::postgres(settings).await?,
            "memory" => Storage::memory(),
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs512Codec::new(JwtConfig::new(
            settings.jwt.secret.as_bytes(),
        )));
        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2SecretHasher::new());

        let notifier: Arc<dyn OriginChangeNotifier> = match settings.webhook.url.as_deref() {
            Some(url) if !url.is_empty() => Arc::new(ReqwestWebhookNotifier::new(
                url,
                Duration::from_secs(settings.webhook.timeout_secs),
            )?),
            _ => {
                info!("no webhook url configured, origin change notices are disabled");
                Arc::new(DisabledNotifier)
            }
        };

        let token_service: Arc<dyn TokenService> = Arc::new(RealTokenService::new(
            storage.refresh_repo.clone(),
            storage.blacklist_repo.clone(),
            credential_hasher,
            token_codec.clone(),
            notifier,
            storage.tx_manager.clone(),
        ));
        let access_guard: Arc<dyn AccessGuard> = Arc::new(RealAccessGuard::new(
            token_codec,
            storage.blacklist_repo.clone(),
        ));

        info!("server started");

        Ok(Self {
            token_service,
            access_guard,
            pool: storage.pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("postgres pool closed");
        }
    }
}
