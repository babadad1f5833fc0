//! Account store: authoritative balances, safe under concurrent mutation
//!
//! The per-account async mutex is the only mutual-exclusion primitive in
//! the engine. A lock is held from acquisition through the atomic commit
//! and released on every exit path. When a transfer touches two
//! accounts, locks are acquired in ascending account-id order regardless
//! of which side is the source, so opposite-direction transfers cannot
//! deadlock.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{quantize8, Account, AccountId},
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Account store backed by the shared storage layer
pub struct AccountStore {
    storage: Arc<Storage>,
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

/// An account held under its exclusive lock
///
/// Mutations stage into `account`; nothing is durable until the engine
/// commits the batch. Dropping the guard releases the lock.
pub struct LockedAccount {
    /// The staged account state
    pub account: Account,
    _guard: OwnedMutexGuard<()>,
}

impl AccountStore {
    /// Create a store over the shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            locks: DashMap::new(),
        }
    }

    /// Register an account with zero balance (idempotent)
    pub fn create_account(&self, id: AccountId) -> Result<Account> {
        if let Some(existing) = self.storage.get_account(id)? {
            return Ok(existing);
        }
        let account = Account::new(id, Utc::now());
        self.storage.put_account(&account)?;
        tracing::debug!(account = %id, "Account created");
        Ok(account)
    }

    /// Get account by id (including archived accounts)
    pub fn get(&self, id: AccountId) -> Result<Option<Account>> {
        self.storage.get_account(id)
    }

    /// Soft-archive an account; it keeps its balance and history but
    /// rejects new transfers
    pub async fn archive_account(&self, id: AccountId) -> Result<Account> {
        let guard = self.acquire(id).await;
        let mut account = self
            .storage
            .get_account(id)?
            .ok_or(Error::NotFound(id))?;
        account.archived = true;
        self.storage.put_account(&account)?;
        drop(guard);
        tracing::info!(account = %id, "Account archived");
        Ok(account)
    }

    /// Acquire the exclusive per-account lock and load the row.
    ///
    /// Blocks until any concurrent holder releases; fails with
    /// `NotFound` when the account does not exist or is archived.
    pub async fn lock_for_update(&self, id: AccountId) -> Result<LockedAccount> {
        let guard = self.acquire(id).await;
        let account = self
            .storage
            .get_account(id)?
            .filter(|a| !a.archived)
            .ok_or(Error::NotFound(id))?;
        Ok(LockedAccount {
            account,
            _guard: guard,
        })
    }

    /// Lock two distinct accounts in ascending-id order, returning them
    /// in the requested order
    pub async fn lock_pair(
        &self,
        first: AccountId,
        second: AccountId,
    ) -> Result<(LockedAccount, LockedAccount)> {
        debug_assert_ne!(first, second);
        if first < second {
            let a = self.lock_for_update(first).await?;
            let b = self.lock_for_update(second).await?;
            Ok((a, b))
        } else {
            let b = self.lock_for_update(second).await?;
            let a = self.lock_for_update(first).await?;
            Ok((a, b))
        }
    }

    /// Add a signed quantized delta to a locked account's balance.
    ///
    /// Fails with `InsufficientBalance` when the result would fall below
    /// the reserved floor; the staged state is left unchanged on error.
    pub fn apply_delta(&self, locked: &mut LockedAccount, delta: Decimal) -> Result<()> {
        let account = &mut locked.account;
        let new_balance = quantize8(account.balance + delta);
        if new_balance < account.locked {
            return Err(Error::InsufficientBalance {
                account: account.id,
                requested: delta.abs(),
                available: account.available(),
            });
        }
        account.balance = new_balance;
        Ok(())
    }

    async fn acquire(&self, id: AccountId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn test_store() -> (AccountStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (AccountStore::new(storage), temp_dir)
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (store, _temp) = test_store();
        let id = AccountId::new(42);

        let first = store.create_account(id).unwrap();
        let second = store.create_account(id).unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_lock_missing_account() {
        let (store, _temp) = test_store();
        let result = store.lock_for_update(AccountId::new(1)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_archived_account_rejects_lock() {
        let (store, _temp) = test_store();
        let id = AccountId::new(42);
        store.create_account(id).unwrap();
        store.archive_account(id).await.unwrap();

        let result = store.lock_for_update(id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        // Lookups still see the archived row
        assert!(store.get(id).unwrap().unwrap().archived);
    }

    #[tokio::test]
    async fn test_apply_delta_floor() {
        let (store, _temp) = test_store();
        let id = AccountId::new(42);
        store.create_account(id).unwrap();

        let mut locked = store.lock_for_update(id).await.unwrap();
        store.apply_delta(&mut locked, Decimal::from(10)).unwrap();
        assert_eq!(locked.account.balance, Decimal::from(10));

        let result = store.apply_delta(&mut locked, Decimal::from(-50));
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        // Staged balance unchanged after the failed debit
        assert_eq!(locked.account.balance, Decimal::from(10));
    }

    #[tokio::test]
    async fn test_lock_serializes_concurrent_holders() {
        let (store, _temp) = test_store();
        let id = AccountId::new(42);
        store.create_account(id).unwrap();
        let store = Arc::new(store);

        let locked = store.lock_for_update(id).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.lock_for_update(id).await.map(|_| ()) })
        };

        // The contender cannot finish while the lock is held
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(locked);
        contender.await.unwrap().unwrap();
    }
}
