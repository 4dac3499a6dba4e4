use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use nanoid::nanoid;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const REFRESH_SECRET_LEN: usize = 48;

/// A signed access token and its refresh record, ready to be written.
struct PendingIssue {
    pair: TokenPair,
    record: RefreshRecord,
}

pub struct RealTokenService {
    refresh_repo: Arc<dyn RefreshTokenRepo>,
    blacklist_repo: Arc<dyn BlacklistRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
    notifier: Arc<dyn OriginChangeNotifier>,
    tx_manager: Arc<dyn TxManager>,
}

impl RealTokenService {
    pub fn new(
        refresh_repo: Arc<dyn RefreshTokenRepo>,
        blacklist_repo: Arc<dyn BlacklistRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
        notifier: Arc<dyn OriginChangeNotifier>,
        tx_manager: Arc<dyn TxManager>,
    ) -> Self {
        Self {
            refresh_repo,
            blacklist_repo,
            credential_hasher,
            token_codec,
            notifier,
            tx_manager,
        }
    }

    #[inline]
    fn new_jti() -> String {
        Uuid::new_v4().to_string()
    }

    #[inline]
    fn new_refresh_secret() -> String {
        nanoid!(REFRESH_SECRET_LEN)
    }

    async fn begin(&self) -> Result<Box<dyn StorageTx>, AuthError> {
        self.tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    async fn commit(tx: Box<dyn StorageTx>) -> Result<(), AuthError> {
        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    /// Signs and hashes everything a new pair needs. Touches no storage.
    async fn prepare_issue(&self, user_info: &UserInfo) -> Result<PendingIssue, AuthError> {
        let jti = Self::new_jti();
        let (access, _expires_at) = self
            .token_codec
            .issue_access_token(&user_info.id, &jti)
            .await?;

        let secret = Self::new_refresh_secret();
        let secret_hash = self.credential_hasher.hash_secret(&secret).await?;

        Ok(PendingIssue {
            pair: TokenPair {
                access,
                refresh: RefreshToken(secret),
            },
            record: RefreshRecord {
                jti,
                user_id: user_info.id.clone(),
                secret_hash,
                user_agent: user_info.agent.clone(),
                ip: user_info.ip.clone(),
                issued_at: Utc::now(),
                revoked: false,
            },
        })
    }

    fn spawn_origin_change_notice(&self, event: OriginChange) {
        let notifier = self.notifier.clone();
        // Detached: nothing about the delivery ever reaches the caller.
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_origin_change(&event).await {
                warn!(user_id = %event.user_id, "origin change notification failed: {:#}", e);
            }
        });
    }
}

#[async_trait::async_trait]
impl TokenService for RealTokenService {
    async fn generate_token_pair(&self, user_info: UserInfo) -> Result<TokenPair, AuthError> {
        if user_info.id.is_empty() {
            return Err(AuthError::InvalidPayload);
        }

        let issue = self.prepare_issue(&user_info).await?;

        let mut tx = self.begin().await?;
        self.refresh_repo
            .save_in_tx(tx.as_mut(), &issue.record)
            .await?;
        Self::commit(tx).await?;

        debug!(user_id = %user_info.id, jti = %issue.record.jti, "issued token pair");
        Ok(issue.pair)
    }

    async fn refresh_token_pair(
        &self,
        token_pair: TokenPair,
        mut user_info: UserInfo,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .token_codec
            .verify_access_token_signature(&token_pair.access)
            .await
            .map_err(|e| match e {
                AuthError::UnexpectedHashMethod => AuthError::UnexpectedHashMethod,
                _ => AuthError::InvalidAccessToken,
            })?;
        let jti = claims.jti;
        user_info.id = claims.sub;

        let record = self
            .refresh_repo
            .get_by_jti(&jti)
            .await?
            .filter(RefreshRecord::is_active)
            .ok_or(AuthError::RefreshNotFoundOrRevoked)?;

        if user_info.agent != record.user_agent {
            warn!(user_id = %record.user_id, %jti, "user-agent changed on refresh, revoking");
            if let Err(e) = self.refresh_repo.revoke(&jti).await {
                error!(%jti, "failed to revoke refresh record: {}", e);
            }
            return Err(AuthError::UserAgentChanged);
        }

        if !self
            .credential_hasher
            .verify_secret(&token_pair.refresh.0, &record.secret_hash)
            .await?
        {
            return Err(AuthError::InvalidRefreshToken);
        }

        if user_info.ip != record.ip {
            info!(user_id = %record.user_id, %jti, "refresh from a new ip");
            self.spawn_origin_change_notice(OriginChange {
                user_id: record.user_id.clone(),
                ip: user_info.ip.clone(),
            });
        }

        let issue = self.prepare_issue(&user_info).await?;

        let mut tx = self.begin().await?;
        if !self
            .refresh_repo
            .revoke_active_in_tx(tx.as_mut(), &jti)
            .await?
        {
            // Another request rotated this pair after our lookup.
            return Err(AuthError::RefreshNotFoundOrRevoked);
        }
        self.refresh_repo
            .save_in_tx(tx.as_mut(), &issue.record)
            .await?;
        tx.commit().await.map_err(|e| {
            if e.is::<TxConflict>() {
                debug!(%jti, "rotation lost to a concurrent write: {}", e);
                AuthError::RefreshNotFoundOrRevoked
            } else {
                AuthError::Store(e.to_string())
            }
        })?;

        debug!(user_id = %user_info.id, old_jti = %jti, new_jti = %issue.record.jti, "rotated token pair");
        Ok(issue.pair)
    }

    async fn logout(&self, token: &AccessToken) -> Result<(), AuthError> {
        let claims = self.token_codec.verify_access_token(token).await?;

        let mut tx = self.begin().await?;
        self.blacklist_repo
            .blacklist_in_tx(tx.as_mut(), &claims.jti)
            .await?;
        let revoked = self
            .refresh_repo
            .revoke_all_for_user_in_tx(tx.as_mut(), &claims.sub)
            .await?;
        Self::commit(tx).await?;

        info!(user_id = %claims.sub, jti = %claims.jti, revoked, "logged out");
        Ok(())
    }
}
