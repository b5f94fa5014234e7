// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Engine
//!
//! Async front for a [`LedgerStore`]. Every mutation goes through
//! [`Ledger::write`], which:
//!
//! 1. waits for the process-wide write gate;
//! 2. runs the whole unit of work inside one store transaction on the
//!    blocking pool, holding the gate until it commits or aborts.
//!
//! Both steps share one deadline of the configured timeout. Past it the
//! caller gets [`LedgerError::StorageUnavailable`]. If the deadline expires
//! while the unit is already running, the unit is not cancelled: it keeps
//! the gate and may still commit, so the outcome for that caller is unknown
//! and later writes queue behind it.
//!
//! Reads run against MVCC snapshots and do not take the gate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::storage::{LedgerError, LedgerStore, LedgerTxn, LedgerView};

/// Default bound on waiting for the ledger.
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Ledger<S> {
    store: Arc<S>,
    gate: Arc<Mutex<()>>,
    timeout: Duration,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gate: Arc::clone(&self.gate),
            timeout: self.timeout,
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self {
            store,
            gate: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    /// Run one atomic unit of work.
    pub async fn write<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTxn) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<LedgerError> + Send + 'static,
    {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let permit = match tokio::time::timeout_at(deadline, Arc::clone(&self.gate).lock_owned()).await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Ledger write gate timed out");
                return Err(LedgerError::StorageUnavailable.into());
            }
        };

        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            store.atomically(op)
        });
        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(LedgerError::Task(join.to_string()).into()),
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Ledger write timed out while running; outcome unknown"
                );
                Err(LedgerError::StorageUnavailable.into())
            }
        }
    }

    /// Run a read-only closure against a consistent snapshot.
    pub async fn read<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&dyn LedgerView) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<LedgerError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || store.snapshot(op));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(LedgerError::Task(join.to_string()).into()),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Ledger read timed out");
                Err(LedgerError::StorageUnavailable.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PseudonymizedId;
    use crate::storage::{LedgerDatabase, NewAccount};
    use tempfile::tempdir;

    fn ledger(timeout: Duration) -> (tempfile::TempDir, Ledger<LedgerDatabase>) {
        let dir = tempdir().unwrap();
        let db = LedgerDatabase::open(&dir.path().join("ledger.redb")).unwrap();
        (dir, Ledger::new(Arc::new(db), timeout))
    }

    fn new_account(tag: &str) -> NewAccount {
        NewAccount {
            owner: PseudonymizedId::from_raw(tag.repeat(64)),
            owner_name: tag.to_string(),
            encrypted_number: format!("enc-{tag}"),
            password_hash: None,
        }
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, ledger) = ledger(DEFAULT_LEDGER_TIMEOUT);
        let account = ledger
            .write(|txn| {
                let a = txn.insert_account(new_account("a"))?;
                txn.set_balance(a.account_id, 10_000)?;
                Ok::<_, LedgerError>(a)
            })
            .await
            .unwrap();

        let balance = ledger
            .read(move |v| v.get_balance(account.account_id))
            .await
            .unwrap();
        assert_eq!(balance, 10_000);
    }

    #[tokio::test]
    async fn busy_gate_surfaces_storage_unavailable() {
        let (_dir, ledger) = ledger(Duration::from_millis(20));
        let _held = Arc::clone(&ledger.gate).lock_owned().await;

        let result = ledger.write(|txn| txn.next_sequence("x")).await;
        assert!(matches!(result, Err(LedgerError::StorageUnavailable)));
    }

    #[tokio::test]
    async fn slow_unit_of_work_surfaces_storage_unavailable() {
        let (_dir, ledger) = ledger(Duration::from_millis(50));

        let result = ledger
            .write(|txn| {
                std::thread::sleep(Duration::from_millis(200));
                txn.next_sequence("slow")
            })
            .await;
        assert!(matches!(result, Err(LedgerError::StorageUnavailable)));

        // The stalled unit still finishes and releases the gate.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let next = ledger.write(|txn| txn.next_sequence("slow")).await.unwrap();
        assert_eq!(next, 2);
    }

    #[tokio::test]
    async fn concurrent_writes_are_serialized() {
        let (_dir, ledger) = ledger(DEFAULT_LEDGER_TIMEOUT);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.write(|txn| txn.next_sequence("counter")).await.unwrap()
            }));
        }
        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=16).collect::<Vec<u64>>());
    }
}
