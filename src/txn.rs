//! Nested savepoints and deferred filesystem side effects.
//!
//! `TxnManager` is the mechanism described in the design notes as "deferred
//! side effects": rather than touching the filesystem the moment a photo is
//! renamed or deleted, the producer pushes a closure onto `on_commit_queue`
//! (and, when it has one, a compensating closure onto `on_rollback_queue`).
//! Only the outermost [`TxnManager::release`] actually drains and runs the
//! commit queue; any [`TxnManager::rollback`] drains and runs the rollback
//! queue back to the target savepoint instead, so a file move inside a
//! transaction that later aborts never touches disk.

use crate::error::Result;
use futures::future::BoxFuture;
use sqlx::SqlitePool;

/// A closure queued against a transaction boundary, to run when that
/// boundary is crossed (commit or rollback).
pub type DeferredAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

enum QueueEntry {
    Savepoint(String),
    Action(DeferredAction),
}

/// Tracks the stack of open savepoints and the two deferred-action queues
/// for a single logical connection. Held behind the same lock as the
/// connection it governs (see [`crate::db::PhotoDb`]).
pub struct TxnManager {
    pool: SqlitePool,
    savepoints: Vec<String>,
    on_commit_queue: Vec<QueueEntry>,
    on_rollback_queue: Vec<QueueEntry>,
    commit_id: u64,
}

impl TxnManager {
    pub fn new(pool: SqlitePool) -> Self {
        TxnManager {
            pool,
            savepoints: Vec::new(),
            on_commit_queue: Vec::new(),
            on_rollback_queue: Vec::new(),
            commit_id: 0,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Monotonically increasing counter bumped on every successful outermost
    /// commit. Used by callers (e.g. [`crate::album::AlbumEngine::sum_bytes`])
    /// to detect whether a memoized value is still valid.
    pub fn commit_id(&self) -> u64 {
        self.commit_id
    }

    /// Opens a new savepoint, returning its generated name.
    pub async fn savepoint(&mut self) -> Result<String> {
        let name = format!("sp_{}", self.savepoints.len());
        sqlx::query(&format!("SAVEPOINT {name}")).execute(&self.pool).await?;
        self.savepoints.push(name.clone());
        self.on_commit_queue.push(QueueEntry::Savepoint(name.clone()));
        self.on_rollback_queue.push(QueueEntry::Savepoint(name.clone()));
        Ok(name)
    }

    /// Queues an action to run only if the enclosing outermost transaction
    /// commits, with an optional compensating action to run immediately if
    /// the transaction (or any nested scope back to the current savepoint)
    /// rolls back instead.
    pub fn defer(&mut self, on_commit: DeferredAction, on_rollback: Option<DeferredAction>) {
        self.on_commit_queue.push(QueueEntry::Action(on_commit));
        if let Some(action) = on_rollback {
            self.on_rollback_queue.push(QueueEntry::Action(action));
        }
    }

    /// Releases `sp`. If it is the outermost savepoint, drains and runs the
    /// full commit queue and issues `COMMIT`; otherwise emits `RELEASE sp`
    /// and leaves the queued actions for the enclosing scope.
    pub async fn release(&mut self, sp: &str) -> Result<()> {
        let is_outermost = self.savepoints.first().map(|s| s.as_str()) == Some(sp);

        if is_outermost {
            let actions = std::mem::take(&mut self.on_commit_queue);
            for entry in actions {
                if let QueueEntry::Action(action) = entry {
                    action().await?;
                }
            }
            sqlx::query("COMMIT").execute(&self.pool).await?;
            self.savepoints.clear();
            self.on_rollback_queue.clear();
            self.commit_id += 1;
        } else {
            sqlx::query(&format!("RELEASE {sp}")).execute(&self.pool).await?;
            if let Some(pos) = self.savepoints.iter().position(|s| s == sp) {
                self.savepoints.truncate(pos);
            }
        }
        Ok(())
    }

    /// Rolls back to `sp` (or fully, if `sp` is `None`), running every
    /// queued rollback compensation back to that point in LIFO order, then
    /// issuing `ROLLBACK TO sp` (or `ROLLBACK`). Matching commit-queue
    /// entries are discarded.
    pub async fn rollback(&mut self, sp: Option<&str>) -> Result<()> {
        let mut compensations = Vec::new();
        loop {
            match self.on_rollback_queue.pop() {
                Some(QueueEntry::Savepoint(name)) if Some(name.as_str()) == sp => break,
                Some(QueueEntry::Savepoint(_)) if sp.is_none() => continue,
                Some(entry) => compensations.push(entry),
                None => break,
            }
        }
        for entry in compensations {
            if let QueueEntry::Action(action) = entry {
                action().await?;
            }
        }

        loop {
            match self.on_commit_queue.last() {
                Some(QueueEntry::Savepoint(name)) if Some(name.as_str()) == sp => break,
                None => break,
                _ => {
                    self.on_commit_queue.pop();
                }
            }
        }
        if let Some(pos) = self.on_commit_queue.iter().position(|entry| {
            matches!(entry, QueueEntry::Savepoint(name) if Some(name.as_str()) == sp)
        }) {
            self.on_commit_queue.truncate(pos);
        }

        match sp {
            Some(name) => {
                sqlx::query(&format!("ROLLBACK TO {name}")).execute(&self.pool).await?;
                if let Some(pos) = self.savepoints.iter().position(|s| s == name) {
                    self.savepoints.truncate(pos);
                }
            }
            None => {
                sqlx::query("ROLLBACK").execute(&self.pool).await?;
                self.savepoints.clear();
                self.on_commit_queue.clear();
                self.on_rollback_queue.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rollback_runs_compensations_in_lifo_order() {
        let mut txn = TxnManager::new(pool().await);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let sp = txn.savepoint().await.unwrap();

        let o1 = order.clone();
        txn.defer(
            Box::new(move || Box::pin(async move { Ok(()) })),
            Some(Box::new(move || {
                Box::pin(async move {
                    o1.lock().unwrap().push(1);
                    Ok(())
                })
            })),
        );
        let o2 = order.clone();
        txn.defer(
            Box::new(move || Box::pin(async move { Ok(()) })),
            Some(Box::new(move || {
                Box::pin(async move {
                    o2.lock().unwrap().push(2);
                    Ok(())
                })
            })),
        );

        txn.rollback(Some(&sp)).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn outermost_release_runs_commit_queue_once() {
        let mut txn = TxnManager::new(pool().await);
        let ran = Arc::new(AtomicUsize::new(0));

        let sp = txn.savepoint().await.unwrap();
        let r = ran.clone();
        txn.defer(
            Box::new(move || {
                Box::pin(async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            None,
        );
        txn.release(&sp).await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(txn.commit_id(), 1);
    }

    #[tokio::test]
    async fn inner_release_defers_commit_queue_to_outer() {
        let mut txn = TxnManager::new(pool().await);
        let ran = Arc::new(AtomicUsize::new(0));

        let outer = txn.savepoint().await.unwrap();
        let inner = txn.savepoint().await.unwrap();
        let r = ran.clone();
        txn.defer(
            Box::new(move || {
                Box::pin(async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            None,
        );
        txn.release(&inner).await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0, "inner release must not run commit actions");

        txn.release(&outer).await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
