use super::repo_tx_postgres::PgTx;
use crate::application_port::AuthError;
use crate::domain_port::*;

pub fn downcast(tx: &mut dyn StorageTx) -> Result<&mut PgTx, AuthError> {
    tx.as_any_mut()
        .downcast_mut::<PgTx>()
        .ok_or_else(|| AuthError::Store("transaction is not a postgres transaction".to_string()))
}

pub fn store_err(err: sqlx::Error) -> AuthError {
    AuthError::Store(err.to_string())
}
