use std::any::Any;

#[async_trait::async_trait]
pub trait TxManager: Send + Sync {
    async fn begin(&self) -> anyhow::Result<Box<dyn StorageTx>>;
}

/// An open storage transaction.
///
/// Dropping a transaction that was never committed rolls it back, so every
/// early return out of a multi-statement write leaves no partial state.
#[async_trait::async_trait]
pub trait StorageTx: Send {
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;

    /// Lets a repo recover its own backend's transaction type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A commit refused because a conditional write no longer holds, e.g. a
/// record revoked by another transaction after this one claimed it.
#[derive(Debug, thiserror::Error)]
#[error("transaction conflict: {0}")]
pub struct TxConflict(pub String);
