use super::util::{downcast, store_err};
use crate::application_port::*;
use crate::domain_port::*;
use sqlx::PgPool;

pub struct PgBlacklistRepo {
    pool: PgPool,
}

impl PgBlacklistRepo {
    pub fn new(pool: PgPool) -> Self {
        PgBlacklistRepo { pool }
    }
}

#[async_trait::async_trait]
impl BlacklistRepo for PgBlacklistRepo {
    async fn blacklist_in_tx(&self, tx: &mut dyn StorageTx, jti: &str) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query("INSERT INTO jwt_blacklist (jti) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(jti)
            .execute(tx.conn())
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM jwt_blacklist WHERE jti = $1)")
                .bind(jti)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(exists)
    }
}
