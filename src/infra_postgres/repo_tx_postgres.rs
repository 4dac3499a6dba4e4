use crate::domain_port::{StorageTx, TxManager};
use anyhow::anyhow;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::any::Any;

pub struct PgTxManager {
    pool: PgPool,
}

impl PgTxManager {
    pub fn new(pool: PgPool) -> Self {
        PgTxManager { pool }
    }
}

#[async_trait::async_trait]
impl TxManager for PgTxManager {
    async fn begin(&self) -> anyhow::Result<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        Ok(Box::new(PgTx::new(tx)))
    }
}

/// Wraps a pooled transaction; sqlx rolls it back if it is dropped uncommitted.
pub struct PgTx {
    inner: Transaction<'static, Postgres>,
}

impl PgTx {
    pub fn new(inner: Transaction<'static, Postgres>) -> Self {
        PgTx { inner }
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

#[async_trait::async_trait]
impl StorageTx for PgTx {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.inner.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.inner.rollback().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
