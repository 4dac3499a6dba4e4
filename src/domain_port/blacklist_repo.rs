use crate::application_port::*;
use crate::domain_port::repo_tx::StorageTx;

#[async_trait::async_trait]
pub trait BlacklistRepo: Send + Sync {
    /// Add `jti` to the blacklist. Already present is not an error.
    async fn blacklist_in_tx(&self, tx: &mut dyn StorageTx, jti: &str) -> Result<(), AuthError>;

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, AuthError>;
}
