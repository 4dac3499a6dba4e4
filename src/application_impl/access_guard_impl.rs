use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;
use tracing::debug;

/// Admits a request only if its bearer token verifies and is not blacklisted.
///
/// Every failure after the missing-token check surfaces as `InvalidToken`,
/// except store errors which are returned as-is so the caller can log them
/// before rejecting.
pub struct RealAccessGuard {
    token_codec: Arc<dyn TokenCodec>,
    blacklist_repo: Arc<dyn BlacklistRepo>,
}

impl RealAccessGuard {
    pub fn new(token_codec: Arc<dyn TokenCodec>, blacklist_repo: Arc<dyn BlacklistRepo>) -> Self {
        Self {
            token_codec,
            blacklist_repo,
        }
    }
}

#[async_trait::async_trait]
impl AccessGuard for RealAccessGuard {
    async fn admit(&self, authorization: Option<&str>) -> Result<UserId, AuthError> {
        let token = parse_bearer(authorization)?.ok_or(AuthError::MissingToken)?;

        let claims = self
            .token_codec
            .verify_access_token(&AccessToken(token.to_owned()))
            .await
            .map_err(|e| {
                debug!("access token rejected: {}", e);
                AuthError::InvalidToken
            })?;

        if self.blacklist_repo.is_blacklisted(&claims.jti).await? {
            debug!(jti = %claims.jti, "access token is blacklisted");
            return Err(AuthError::InvalidToken);
        }

        Ok(claims.sub)
    }
}
