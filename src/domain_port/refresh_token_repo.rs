use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

#[async_trait::async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    /// Insert a new record. A duplicate `jti` is an error.
    async fn save_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        record: &RefreshRecord,
    ) -> Result<(), AuthError>;

    /// Flip `revoked` to true only if the record is still active.
    /// Returns whether this call performed the flip.
    async fn revoke_active_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        jti: &str,
    ) -> Result<bool, AuthError>;

    /// Revoke every record of the user. Returns how many were still active.
    async fn revoke_all_for_user_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        user_id: &UserId,
    ) -> Result<u64, AuthError>;

    /// Standalone revoke, used when a record is burned outside of a rotation.
    async fn revoke(&self, jti: &str) -> Result<(), AuthError>;

    async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshRecord>, AuthError>;
}
