use super::util::{downcast, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgRefreshTokenRepo {
    pool: PgPool,
}

impl PgRefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        PgRefreshTokenRepo { pool }
    }

    fn row_to_record(row: PgRow) -> Result<RefreshRecord, AuthError> {
        let jti: String = row.try_get("jti").map_err(store_err)?;
        let user_id: String = row.try_get("user_id").map_err(store_err)?;
        let secret_hash: String = row.try_get("hash").map_err(store_err)?;
        let user_agent: String = row.try_get("user_agent").map_err(store_err)?;
        let ip: String = row.try_get("ip").map_err(store_err)?;
        let issued_at: DateTime<Utc> = row.try_get("issued_at").map_err(store_err)?;
        let revoked: bool = row.try_get("revoked").map_err(store_err)?;

        Ok(RefreshRecord {
            jti,
            user_id: UserId(user_id),
            secret_hash,
            user_agent,
            ip,
            issued_at,
            revoked,
        })
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for PgRefreshTokenRepo {
    async fn save_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        record: &RefreshRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO refresh_tokens (jti, user_id, hash, user_agent, ip, issued_at, revoked)
VALUES ($1, $2, $3, $4, $5, $6, $7)
"#,
        )
        .bind(&record.jti)
        .bind(record.user_id.as_str())
        .bind(&record.secret_hash)
        .bind(&record.user_agent)
        .bind(&record.ip)
        .bind(record.issued_at)
        .bind(record.revoked)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn revoke_active_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        jti: &str,
    ) -> Result<bool, AuthError> {
        let tx = downcast(tx)?;

        // A concurrent rotation that already committed leaves zero rows to match.
        let result = sqlx::query(
            r#"
UPDATE refresh_tokens SET revoked = TRUE
WHERE jti = $1 AND revoked = FALSE
"#,
        )
        .bind(jti)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        user_id: &UserId,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;

        let result = sqlx::query(
            r#"
UPDATE refresh_tokens SET revoked = TRUE
WHERE user_id = $1 AND revoked = FALSE
"#,
        )
        .bind(user_id.as_str())
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected())
    }

    async fn revoke(&self, jti: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshRecord>, AuthError> {
        let row_opt: Option<PgRow> = sqlx::query(
            r#"
SELECT jti, user_id, hash, user_agent, ip, issued_at, revoked
FROM refresh_tokens
WHERE jti = $1
"#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row_opt.map(Self::row_to_record).transpose()
    }
}
