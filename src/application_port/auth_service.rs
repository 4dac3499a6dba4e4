use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("missing auth token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid access token")]
    InvalidAccessToken,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("refresh not found or revoked")]
    RefreshNotFoundOrRevoked,
    #[error("user-agent changed")]
    UserAgentChanged,
    #[error("unexpected hash method")]
    UnexpectedHashMethod,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        user: &UserId,
        jti: &str,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError>;

    /// Checks algorithm, signature and expiry.
    async fn verify_access_token(&self, token: &AccessToken) -> Result<AccessClaims, AuthError>;

    /// Checks algorithm and signature only. An expired token still yields its claims.
    async fn verify_access_token_signature(
        &self,
        token: &AccessToken,
    ) -> Result<AccessClaims, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_secret(&self, secret: &str) -> Result<String, AuthError>;
    async fn verify_secret(&self, secret: &str, secret_hash: &str) -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    /// Issues a fresh pair and persists its refresh record.
    async fn generate_token_pair(&self, user_info: UserInfo) -> Result<TokenPair, AuthError>;

    /// Exchanges a pair for a new one, revoking the old record in the same transaction.
    async fn refresh_token_pair(
        &self,
        token_pair: TokenPair,
        user_info: UserInfo,
    ) -> Result<TokenPair, AuthError>;

    /// Blacklists the token's `jti` and revokes every refresh record of its subject.
    async fn logout(&self, token: &AccessToken) -> Result<(), AuthError>;
}
