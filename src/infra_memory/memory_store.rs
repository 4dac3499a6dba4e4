use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use anyhow::anyhow;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A failure the memory store can be told to produce once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Read,
    Begin,
    SaveRefresh,
    RevokeRefresh,
    Blacklist,
    Commit,
}

#[derive(Debug, Default)]
struct MemoryState {
    refresh: HashMap<String, RefreshRecord>,
    blacklist: HashSet<String>,
    /// Committed records an open transaction has conditionally revoked.
    claimed: HashSet<String>,
}

#[derive(Debug, Clone)]
enum StagedOp {
    Insert(RefreshRecord),
    RevokeActive(String),
    RevokeAllForUser(UserId),
    Blacklist(String),
}

/// Reverses one applied write when a later write of the same commit fails.
enum Undo {
    Remove(String),
    Reactivate(String),
    Unblacklist(String),
}

impl MemoryState {
    fn apply(&mut self, op: &StagedOp, undo: &mut Vec<Undo>) -> Result<(), TxConflict> {
        match op {
            StagedOp::Insert(record) => {
                if self.refresh.contains_key(&record.jti) {
                    return Err(TxConflict(format!("duplicate jti {}", record.jti)));
                }
                self.refresh.insert(record.jti.clone(), record.clone());
                undo.push(Undo::Remove(record.jti.clone()));
            }
            StagedOp::RevokeActive(jti) => match self.refresh.get_mut(jti) {
                Some(record) if record.is_active() => {
                    record.revoked = true;
                    undo.push(Undo::Reactivate(jti.clone()));
                }
                _ => {
                    return Err(TxConflict(format!(
                        "refresh record {} is no longer active",
                        jti
                    )));
                }
            },
            StagedOp::RevokeAllForUser(user_id) => {
                for record in self.refresh.values_mut() {
                    if &record.user_id == user_id && record.is_active() {
                        record.revoked = true;
                        undo.push(Undo::Reactivate(record.jti.clone()));
                    }
                }
            }
            StagedOp::Blacklist(jti) => {
                if self.blacklist.insert(jti.clone()) {
                    undo.push(Undo::Unblacklist(jti.clone()));
                }
            }
        }
        Ok(())
    }

    fn undo(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Remove(jti) => {
                    self.refresh.remove(&jti);
                }
                Undo::Reactivate(jti) => {
                    if let Some(record) = self.refresh.get_mut(&jti) {
                        record.revoked = false;
                    }
                }
                Undo::Unblacklist(jti) => {
                    self.blacklist.remove(&jti);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    fail_point: Mutex<Option<FailPoint>>,
}

impl Shared {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AuthError> {
        self.state
            .lock()
            .map_err(|_| AuthError::Store("memory store poisoned".to_string()))
    }

    fn trip(&self, point: FailPoint) -> anyhow::Result<()> {
        let mut armed = self
            .fail_point
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?;
        if *armed == Some(point) {
            *armed = None;
            return Err(anyhow!("injected failure at {:?}", point));
        }
        Ok(())
    }
}

/// In-process store for refresh records and the blacklist.
///
/// Transactions stage their writes and apply them on commit under the state
/// lock, undoing the applied ones if a later write fails. A conditional
/// revoke claims the record until its transaction ends, so a second
/// transaction revoking the same record sees it as already taken, the way a
/// row lock makes a concurrent `UPDATE ... AND revoked = FALSE` match nothing.
/// Revoking a whole family does not wait on claims; a claimed record revoked
/// that way makes the claiming commit fail with `TxConflict`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    shared: Arc<Shared>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure at `point`, for exercising rollback paths.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut armed) = self.shared.fail_point.lock() {
            *armed = Some(point);
        }
    }

    pub fn records_for_user(&self, user_id: &UserId) -> Vec<RefreshRecord> {
        self.shared
            .state()
            .map(|state| {
                state
                    .refresh
                    .values()
                    .filter(|record| &record.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn downcast<'a>(&self, tx: &'a mut dyn StorageTx) -> Result<&'a mut MemoryTx, AuthError> {
        let tx = tx
            .as_any_mut()
            .downcast_mut::<MemoryTx>()
            .ok_or_else(|| AuthError::Store("transaction belongs to another store".to_string()))?;
        if !Arc::ptr_eq(&tx.shared, &self.shared) {
            return Err(AuthError::Store(
                "transaction belongs to another store".to_string(),
            ));
        }
        Ok(tx)
    }

    fn trip(&self, point: FailPoint) -> Result<(), AuthError> {
        self.shared
            .trip(point)
            .map_err(|e| AuthError::Store(e.to_string()))
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    staged: Vec<StagedOp>,
    claims: Vec<String>,
}

impl MemoryTx {
    fn staged_insert(&self, jti: &str) -> Option<&RefreshRecord> {
        self.staged.iter().rev().find_map(|op| match op {
            StagedOp::Insert(record) if record.jti == jti => Some(record),
            _ => None,
        })
    }

    /// Whether `jti` is active with this transaction's writes applied on top
    /// of the committed state.
    fn is_active(&self, state: &MemoryState, jti: &str) -> bool {
        let mut current = state
            .refresh
            .get(jti)
            .map(|record| (record.user_id.clone(), record.is_active()));
        for op in &self.staged {
            match op {
                StagedOp::Insert(record) if record.jti == jti => {
                    current = Some((record.user_id.clone(), record.is_active()));
                }
                StagedOp::RevokeActive(revoked) if revoked == jti => {
                    if let Some((_, active)) = current.as_mut() {
                        *active = false;
                    }
                }
                StagedOp::RevokeAllForUser(user_id) => {
                    if let Some((owner, active)) = current.as_mut() {
                        if *owner == *user_id {
                            *active = false;
                        }
                    }
                }
                _ => {}
            }
        }
        matches!(current, Some((_, true)))
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.claims.is_empty() {
            return;
        }
        if let Ok(mut state) = self.shared.state.lock() {
            for jti in self.claims.drain(..) {
                state.claimed.remove(&jti);
            }
        }
    }
}

#[async_trait::async_trait]
impl TxManager for MemoryTokenStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn StorageTx>> {
        self.shared.trip(FailPoint::Begin)?;
        Ok(Box::new(MemoryTx {
            shared: self.shared.clone(),
            staged: Vec::new(),
            claims: Vec::new(),
        }))
    }
}

#[async_trait::async_trait]
impl StorageTx for MemoryTx {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let mut tx = self;
        tx.shared.trip(FailPoint::Commit)?;

        let shared = tx.shared.clone();
        let mut state = shared
            .state
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?;
        for jti in tx.claims.drain(..) {
            state.claimed.remove(&jti);
        }

        let mut undo = Vec::new();
        for op in &tx.staged {
            if let Err(conflict) = state.apply(op, &mut undo) {
                state.undo(undo);
                return Err(conflict.into());
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MemoryTokenStore {
    async fn save_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        record: &RefreshRecord,
    ) -> Result<(), AuthError> {
        self.trip(FailPoint::SaveRefresh)?;
        let tx = self.downcast(tx)?;
        let duplicate = self.shared.state()?.refresh.contains_key(&record.jti)
            || tx.staged_insert(&record.jti).is_some();
        if duplicate {
            return Err(AuthError::Store(format!("duplicate jti {}", record.jti)));
        }
        tx.staged.push(StagedOp::Insert(record.clone()));
        Ok(())
    }

    async fn revoke_active_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        jti: &str,
    ) -> Result<bool, AuthError> {
        self.trip(FailPoint::RevokeRefresh)?;
        let tx = self.downcast(tx)?;
        let mut state = self.shared.state()?;
        if !tx.is_active(&state, jti) {
            return Ok(false);
        }
        if state.refresh.contains_key(jti) {
            if !state.claimed.insert(jti.to_owned()) {
                // Held by another open transaction.
                return Ok(false);
            }
            tx.claims.push(jti.to_owned());
        }
        tx.staged.push(StagedOp::RevokeActive(jti.to_owned()));
        Ok(true)
    }

    async fn revoke_all_for_user_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        user_id: &UserId,
    ) -> Result<u64, AuthError> {
        self.trip(FailPoint::RevokeRefresh)?;
        let tx = self.downcast(tx)?;
        let state = self.shared.state()?;
        let mut jtis: HashSet<&str> = state
            .refresh
            .values()
            .filter(|record| &record.user_id == user_id)
            .map(|record| record.jti.as_str())
            .collect();
        for op in &tx.staged {
            if let StagedOp::Insert(record) = op {
                if &record.user_id == user_id {
                    jtis.insert(record.jti.as_str());
                }
            }
        }
        let active = jtis.iter().filter(|jti| tx.is_active(&state, jti)).count();
        drop(jtis);
        drop(state);

        tx.staged.push(StagedOp::RevokeAllForUser(user_id.clone()));
        Ok(active as u64)
    }

    async fn revoke(&self, jti: &str) -> Result<(), AuthError> {
        self.trip(FailPoint::RevokeRefresh)?;
        if let Some(record) = self.shared.state()?.refresh.get_mut(jti) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshRecord>, AuthError> {
        self.trip(FailPoint::Read)?;
        Ok(self.shared.state()?.refresh.get(jti).cloned())
    }
}

#[async_trait::async_trait]
impl BlacklistRepo for MemoryTokenStore {
    async fn blacklist_in_tx(&self, tx: &mut dyn StorageTx, jti: &str) -> Result<(), AuthError> {
        self.trip(FailPoint::Blacklist)?;
        let tx = self.downcast(tx)?;
        tx.staged.push(StagedOp::Blacklist(jti.to_owned()));
        Ok(())
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        self.trip(FailPoint::Read)?;
        Ok(self.shared.state()?.blacklist.contains(jti))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(jti: &str, user: &str) -> RefreshRecord {
        RefreshRecord {
            jti: jti.to_string(),
            user_id: UserId::from(user),
            secret_hash: "hash".to_string(),
            user_agent: "agent".to_string(),
            ip: "127.0.0.1".to_string(),
            issued_at: Utc::now(),
            revoked: false,
        }
    }

    async fn seed(store: &MemoryTokenStore, records: &[RefreshRecord]) {
        let mut tx = store.begin().await.unwrap();
        for r in records {
            store.save_in_tx(tx.as_mut(), r).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryTokenStore::new();
        let mut tx = store.begin().await.unwrap();
        store.save_in_tx(tx.as_mut(), &record("a", "u1")).await.unwrap();
        assert!(store.get_by_jti("a").await.unwrap().is_none());

        drop(tx);
        assert!(store.get_by_jti("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_explicit_rollback_discards_writes() {
        let store = MemoryTokenStore::new();
        let mut tx = store.begin().await.unwrap();
        store.save_in_tx(tx.as_mut(), &record("a", "u1")).await.unwrap();
        store.blacklist_in_tx(tx.as_mut(), "a").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.get_by_jti("a").await.unwrap().is_none());
        assert!(!store.is_blacklisted("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_jti_rejected() {
        let store = MemoryTokenStore::new();
        seed(&store, &[record("a", "u1")]).await;

        let mut tx = store.begin().await.unwrap();
        let err = store.save_in_tx(tx.as_mut(), &record("a", "u2")).await;
        assert!(matches!(err, Err(AuthError::Store(_))));
    }

    #[tokio::test]
    async fn test_revoke_active_only_once() {
        let store = MemoryTokenStore::new();
        seed(&store, &[record("a", "u1")]).await;

        let mut tx = store.begin().await.unwrap();
        assert!(store.revoke_active_in_tx(tx.as_mut(), "a").await.unwrap());
        assert!(!store.revoke_active_in_tx(tx.as_mut(), "a").await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!store.revoke_active_in_tx(tx.as_mut(), "a").await.unwrap());
        assert!(!store.revoke_active_in_tx(tx.as_mut(), "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_claimed_record_is_not_revoked_twice() {
        let store = MemoryTokenStore::new();
        seed(&store, &[record("a", "u1")]).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(store.revoke_active_in_tx(first.as_mut(), "a").await.unwrap());
        assert!(!store.revoke_active_in_tx(second.as_mut(), "a").await.unwrap());

        // The claim goes away with the transaction that held it.
        drop(first);
        assert!(store.revoke_active_in_tx(second.as_mut(), "a").await.unwrap());
        second.commit().await.unwrap();
        assert!(store.get_by_jti("a").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_family_revoke_beats_open_rotation() {
        let store = MemoryTokenStore::new();
        seed(&store, &[record("a", "u1")]).await;

        let mut rotation = store.begin().await.unwrap();
        assert!(store.revoke_active_in_tx(rotation.as_mut(), "a").await.unwrap());
        store.save_in_tx(rotation.as_mut(), &record("b", "u1")).await.unwrap();

        let mut logout = store.begin().await.unwrap();
        let n = store
            .revoke_all_for_user_in_tx(logout.as_mut(), &UserId::from("u1"))
            .await
            .unwrap();
        assert_eq!(n, 1);
        logout.commit().await.unwrap();

        let err = rotation.commit().await.unwrap_err();
        assert!(err.is::<TxConflict>());
        assert!(store.get_by_jti("b").await.unwrap().is_none());
        assert!(store.get_by_jti("a").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_failed_commit_undoes_earlier_writes() {
        let store = MemoryTokenStore::new();

        let mut tx = store.begin().await.unwrap();
        store.blacklist_in_tx(tx.as_mut(), "x").await.unwrap();
        store.save_in_tx(tx.as_mut(), &record("a", "u1")).await.unwrap();
        seed(&store, &[record("a", "u2")]).await;

        let err = tx.commit().await.unwrap_err();
        assert!(err.is::<TxConflict>());
        assert!(!store.is_blacklisted("x").await.unwrap());
        assert_eq!(
            store.get_by_jti("a").await.unwrap().unwrap().user_id,
            UserId::from("u2")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_racing_rotations_have_one_winner() {
        let store = MemoryTokenStore::new();

        for round in 0..200 {
            let old = format!("old-{round}");
            seed(&store, &[record(&old, "u1")]).await;

            let mut tasks = Vec::new();
            for racer in 0..16 {
                let store = store.clone();
                let old = old.clone();
                tasks.push(tokio::spawn(async move {
                    let mut tx = store.begin().await?;
                    if !store.revoke_active_in_tx(tx.as_mut(), &old).await? {
                        return Ok::<bool, anyhow::Error>(false);
                    }
                    let new = record(&format!("new-{round}-{racer}"), "u1");
                    store.save_in_tx(tx.as_mut(), &new).await?;
                    tx.commit().await?;
                    Ok(true)
                }));
            }

            let mut winners = 0;
            for task in tasks {
                if task.await.unwrap().unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "round {round}");
        }

        let active = store
            .records_for_user(&UserId::from("u1"))
            .into_iter()
            .filter(RefreshRecord::is_active)
            .count();
        assert_eq!(active, 200);
    }

    #[tokio::test]
    async fn test_blacklist_is_idempotent() {
        let store = MemoryTokenStore::new();
        for _ in 0..2 {
            let mut tx = store.begin().await.unwrap();
            store.blacklist_in_tx(tx.as_mut(), "a").await.unwrap();
            tx.commit().await.unwrap();
        }
        assert!(store.is_blacklisted("a").await.unwrap());
        assert!(!store.is_blacklisted("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let store = MemoryTokenStore::new();
        seed(&store, &[record("a", "u1"), record("b", "u1"), record("c", "u2")]).await;

        let mut tx = store.begin().await.unwrap();
        let n = store
            .revoke_all_for_user_in_tx(tx.as_mut(), &UserId::from("u1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(n, 2);
        assert!(store.get_by_jti("a").await.unwrap().unwrap().revoked);
        assert!(store.get_by_jti("b").await.unwrap().unwrap().revoked);
        assert!(!store.get_by_jti("c").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_fail_point_fires_once() {
        let store = MemoryTokenStore::new();
        store.fail_next(FailPoint::Commit);

        let mut tx = store.begin().await.unwrap();
        store.save_in_tx(tx.as_mut(), &record("a", "u1")).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(store.get_by_jti("a").await.unwrap().is_none());

        seed(&store, &[record("a", "u1")]).await;
        assert!(store.get_by_jti("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_foreign_transaction_rejected() {
        let store = MemoryTokenStore::new();
        let other = MemoryTokenStore::new();
        let mut tx = other.begin().await.unwrap();
        let err = store.save_in_tx(tx.as_mut(), &record("a", "u1")).await;
        assert!(matches!(err, Err(AuthError::Store(_))));
    }
}
