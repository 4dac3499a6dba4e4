use super::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::MemoryTokenStore;
use argon2::Params;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_SECRET: &[u8] = b"test-signing-secret";

/// Hands every origin change event to the test through a channel.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<OriginChange>,
}

#[async_trait::async_trait]
impl OriginChangeNotifier for RecordingNotifier {
    async fn notify_origin_change(&self, event: &OriginChange) -> anyhow::Result<()> {
        self.tx.send(event.clone())?;
        Ok(())
    }
}

pub fn fast_hasher() -> Argon2SecretHasher {
    Argon2SecretHasher::with_params(Params::new(1024, 1, 1, None).unwrap())
}

/// A token service over the memory store, with handles on every collaborator.
pub struct Harness {
    pub service: Arc<RealTokenService>,
    pub guard: Arc<RealAccessGuard>,
    pub codec: Arc<JwtHs512Codec>,
    pub hasher: Arc<Argon2SecretHasher>,
    pub store: MemoryTokenStore,
    pub notices: mpsc::UnboundedReceiver<OriginChange>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_access_ttl(DEFAULT_ACCESS_TTL)
    }

    pub fn with_access_ttl(access_ttl: Duration) -> Self {
        let store = MemoryTokenStore::new();
        let codec = Arc::new(JwtHs512Codec::new(JwtConfig {
            access_ttl,
            signing_key: TEST_SECRET.to_vec(),
        }));
        let hasher = Arc::new(fast_hasher());
        let (tx, notices) = mpsc::unbounded_channel();

        let service = Arc::new(RealTokenService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            hasher.clone(),
            codec.clone(),
            Arc::new(RecordingNotifier { tx }),
            Arc::new(store.clone()),
        ));
        let guard = Arc::new(RealAccessGuard::new(
            codec.clone(),
            Arc::new(store.clone()),
        ));

        Self {
            service,
            guard,
            codec,
            hasher,
            store,
            notices,
        }
    }

    pub async fn jti(&self, pair: &TokenPair) -> String {
        self.codec
            .verify_access_token_signature(&pair.access)
            .await
            .unwrap()
            .jti
    }
}
