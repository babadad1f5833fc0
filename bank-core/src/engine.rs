//! Ledger engine: the single transactional entry point for EFHC moves
//!
//! Every money-moving feature (exchange, shop, tasks, referrals,
//! lottery, withdrawals) calls `execute_transfer` with a caller-supplied
//! idempotency key. The engine guarantees exactly-once application per
//! key under retries, concurrency, and partial failures.
//!
//! State machine per intent:
//!
//! ```text
//! RECEIVED → (DUPLICATE | VALIDATING) → (REJECTED | APPLYING) → APPLIED
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bank_core::{Config, LedgerEngine, TransferIntent, ReasonCode, AccountId};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> bank_core::Result<()> {
//!     let engine = LedgerEngine::open(Config::default()).await?;
//!     engine.accounts().create_account(AccountId::new(100))?;
//!
//!     let intent = TransferIntent::mint(
//!         "task_submission:1:payout",
//!         AccountId::new(100),
//!         Decimal::from(5),
//!         ReasonCode::TaskReward,
//!     );
//!     let receipt = engine.execute_transfer(intent).await?;
//!     println!("applied as entry {}", receipt.log_entry_id);
//!     Ok(())
//! }
//! ```

use crate::{
    accounts::{AccountStore, LockedAccount},
    error::{Error, Result},
    log::TransferLog,
    metrics::Metrics,
    storage::Storage,
    types::{
        quantize8, Account, ReceiptStatus, TransferIntent, TransferLogEntry, TransferReceipt,
        TransferStatus,
    },
    Config,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// The bank ledger engine
pub struct LedgerEngine {
    storage: Arc<Storage>,
    accounts: AccountStore,
    log: TransferLog,
    metrics: Metrics,
    config: Config,
}

impl LedgerEngine {
    /// Open the engine with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            accounts: AccountStore::new(storage.clone()),
            log: TransferLog::new(storage.clone()),
            storage,
            metrics,
            config,
        })
    }

    /// Account store (registration, balances, archival)
    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Transfer log (lookups, history, admin pagination)
    pub fn log(&self) -> &TransferLog {
        &self.log
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the engine was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current balance of an account
    pub fn balance_of(&self, account: crate::types::AccountId) -> Result<Decimal> {
        self.accounts
            .get(account)?
            .map(|a| a.balance)
            .ok_or(Error::NotFound(account))
    }

    /// Refresh gauge metrics from storage estimates
    pub fn refresh_metrics(&self) -> Result<()> {
        let stats = self.storage.get_stats()?;
        self.metrics.update_accounts_total(stats.total_accounts as i64);
        Ok(())
    }

    /// Apply a money-moving intent exactly once.
    ///
    /// Retries with the same idempotency key are answered from the log:
    /// applied entries replay as a `Duplicate` receipt with the stored
    /// balances, rejected entries replay as the original typed error.
    /// Balances are never touched twice for one key.
    pub async fn execute_transfer(&self, intent: TransferIntent) -> Result<TransferReceipt> {
        let started = Instant::now();

        let outcome = self.execute_inner(&intent).await;

        self.metrics
            .record_apply_duration(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(receipt) => {
                tracing::debug!(
                    idempotency_key = %intent.idempotency_key,
                    reason = %intent.reason,
                    status = ?receipt.status,
                    entry = receipt.log_entry_id,
                    "Transfer executed"
                );
            }
            Err(err) if err.is_terminal() => {
                tracing::info!(
                    idempotency_key = %intent.idempotency_key,
                    reason = %intent.reason,
                    error = %err,
                    "Transfer rejected"
                );
            }
            Err(err) => {
                tracing::warn!(
                    idempotency_key = %intent.idempotency_key,
                    error = %err,
                    "Transfer failed transiently; caller should retry with the same key"
                );
            }
        }

        outcome
    }

    async fn execute_inner(&self, intent: &TransferIntent) -> Result<TransferReceipt> {
        // RECEIVED → DUPLICATE: answer retries from the log without
        // touching balances
        if let Some(entry) = self.log.lookup(&intent.idempotency_key)? {
            self.metrics.record_duplicate();
            return Self::replay(&entry);
        }

        match self.try_apply(intent).await {
            Ok(receipt) => {
                self.metrics.record_applied();
                Ok(receipt)
            }
            Err(Error::DuplicateKey(_)) => {
                // Lost a same-key (or same-reference) race; the winner's
                // entry answers for this intent
                self.metrics.record_duplicate();
                let entry = self.find_winner(intent)?;
                Self::replay(&entry)
            }
            Err(err) if err.is_terminal() => {
                self.record_rejection(intent, &err)?;
                self.metrics.record_rejected();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// VALIDATING → APPLYING → APPLIED
    async fn try_apply(&self, intent: &TransferIntent) -> Result<TransferReceipt> {
        let amount = quantize8(intent.amount);
        Self::validate(intent, amount)?;

        match (intent.source, intent.destination) {
            (Some(src), Some(dst)) => {
                let (mut source, mut destination) = self.accounts.lock_pair(src, dst).await?;
                self.apply_locked(intent, amount, Some(&mut source), Some(&mut destination))
            }
            (Some(src), None) => {
                let mut source = self.accounts.lock_for_update(src).await?;
                self.apply_locked(intent, amount, Some(&mut source), None)
            }
            (None, Some(dst)) => {
                let mut destination = self.accounts.lock_for_update(dst).await?;
                self.apply_locked(intent, amount, None, Some(&mut destination))
            }
            (None, None) => Err(Error::InvalidIntent(
                "At least one of source/destination is required".to_string(),
            )),
        }
    }

    fn apply_locked(
        &self,
        intent: &TransferIntent,
        amount: Decimal,
        mut source: Option<&mut LockedAccount>,
        mut destination: Option<&mut LockedAccount>,
    ) -> Result<TransferReceipt> {
        // Re-check under lock: the losing side of a same-key race finds
        // the winner's entry here
        if self.log.lookup(&intent.idempotency_key)?.is_some() {
            return Err(Error::DuplicateKey(intent.idempotency_key.clone()));
        }
        if let Some(reference) = &intent.external_reference {
            if self.log.lookup_external(reference, intent.reason)?.is_some() {
                return Err(Error::DuplicateKey(reference.clone()));
            }
        }

        if let Some(source) = source.as_deref_mut() {
            self.accounts.apply_delta(source, -amount)?;
        }
        if let Some(destination) = destination.as_deref_mut() {
            self.accounts.apply_delta(destination, amount)?;
        }

        let mut resulting_balances = Vec::with_capacity(2);
        let mut touched: Vec<&Account> = Vec::with_capacity(2);
        if let Some(source) = source.as_deref() {
            resulting_balances.push((source.account.id, source.account.balance));
            touched.push(&source.account);
        }
        if let Some(destination) = destination.as_deref() {
            resulting_balances.push((destination.account.id, destination.account.balance));
            touched.push(&destination.account);
        }

        let entry = TransferLogEntry {
            id: self.storage.alloc_transfer_id(),
            idempotency_key: intent.idempotency_key.clone(),
            source: intent.source,
            destination: intent.destination,
            amount,
            reason: intent.reason,
            external_reference: intent.external_reference.clone(),
            status: TransferStatus::Applied,
            resulting_balances,
            created_at: Utc::now(),
        };

        // One atomic batch: the log entry and the balance writes become
        // visible together or not at all
        self.storage.commit_transfer(&entry, &touched)?;

        Ok(TransferReceipt::from_entry(&entry, ReceiptStatus::Applied))
    }

    fn validate(intent: &TransferIntent, amount: Decimal) -> Result<()> {
        if intent.idempotency_key.is_empty() {
            return Err(Error::InvalidIntent(
                "Idempotency key must not be empty".to_string(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidIntent("Amount must be positive".to_string()));
        }
        if intent.source.is_none() && intent.destination.is_none() {
            return Err(Error::InvalidIntent(
                "At least one of source/destination is required".to_string(),
            ));
        }
        if intent.source.is_some() && intent.source == intent.destination {
            return Err(Error::InvalidIntent(
                "Source and destination must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// REJECTED: persist the terminal outcome so an identical retry
    /// rejects deterministically instead of being reprocessed
    fn record_rejection(&self, intent: &TransferIntent, err: &Error) -> Result<()> {
        let Some(reason) = err.reject_reason() else {
            return Ok(());
        };

        let entry = TransferLogEntry {
            id: self.storage.alloc_transfer_id(),
            idempotency_key: intent.idempotency_key.clone(),
            source: intent.source,
            destination: intent.destination,
            amount: quantize8(intent.amount),
            reason: intent.reason,
            external_reference: intent.external_reference.clone(),
            status: TransferStatus::Rejected(reason),
            resulting_balances: vec![],
            created_at: Utc::now(),
        };

        match self.storage.commit_transfer(&entry, &[]) {
            Ok(()) => Ok(()),
            // A concurrent call already answered for this key
            Err(Error::DuplicateKey(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    fn replay(entry: &TransferLogEntry) -> Result<TransferReceipt> {
        match &entry.status {
            TransferStatus::Applied => {
                Ok(TransferReceipt::from_entry(entry, ReceiptStatus::Duplicate))
            }
            TransferStatus::Rejected(reason) => Err(reason.clone().into()),
        }
    }

    fn find_winner(&self, intent: &TransferIntent) -> Result<TransferLogEntry> {
        if let Some(entry) = self.log.lookup(&intent.idempotency_key)? {
            return Ok(entry);
        }
        if let Some(reference) = &intent.external_reference {
            if let Some(entry) = self.log.lookup_external(reference, intent.reason)? {
                return Ok(entry);
            }
        }
        Err(Error::Concurrency(
            "Winning entry not visible after duplicate-key collision".to_string(),
        ))
    }
}
