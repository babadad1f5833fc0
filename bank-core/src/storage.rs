//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Per-user balance records (key: account id)
//! - `transfers` - Append-only transfer log (key: sequential id)
//! - `idempotency` - Unique index idempotency key -> transfer id
//! - `external_refs` - Unique index external reference -> transfer id
//!   (applied entries only, so a corrected retry of a rejected intent
//!   can still claim the reference)
//! - `created_index` - (created_at, id) keys for cursor pagination
//! - `account_index` - (account id, transfer id) keys for per-account history
//!
//! All writes belonging to one transfer go through a single `WriteBatch`:
//! the log entry and the balance mutations become visible together or
//! not at all. Commits serialize through one writer mutex, so the
//! check-then-insert on the unique indices is atomic even for intents
//! that share no account lock (two keys claiming one external
//! reference).

use crate::{
    config::ExternalRefScope,
    error::{Error, Result},
    types::{Account, AccountId, ReasonCode, TransferLogEntry, TransferStatus},
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSFERS: &str = "transfers";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_EXTERNAL_REFS: &str = "external_refs";
const CF_CREATED_INDEX: &str = "created_index";
const CF_ACCOUNT_INDEX: &str = "account_index";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    next_transfer_id: AtomicU64,
    external_ref_scope: ExternalRefScope,
    // Single-writer commit path: held across the unique-index checks and
    // the batch write in `commit_transfer`. Never held across an await.
    commit_lock: Mutex<()>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy transfer log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_TRANSFERS, Self::cf_options_transfers()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_EXTERNAL_REFS, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_CREATED_INDEX, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_ACCOUNT_INDEX, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let storage = Self {
            db: Arc::new(db),
            next_transfer_id: AtomicU64::new(1),
            external_ref_scope: config.external_ref_scope,
            commit_lock: Mutex::new(()),
        };
        storage.recover_next_transfer_id()?;

        tracing::info!(path = ?path, "Opened bank storage");

        Ok(storage)
    }

    // Column family options

    fn cf_options_accounts() -> Options {
        let mut opts = Options::default();
        // Accounts are frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transfers() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups on indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Rebuild the sequence counter from the last persisted transfer
    fn recover_next_transfer_id(&self) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSFERS)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);
        if let Some(item) = iter.next() {
            let (key, _) = item?;
            if key.len() == 8 {
                let last = u64::from_be_bytes(key[..8].try_into().unwrap());
                self.next_transfer_id.store(last + 1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Allocate the next sequential transfer id
    pub fn alloc_transfer_id(&self) -> u64 {
        self.next_transfer_id.fetch_add(1, Ordering::SeqCst)
    }

    // Account operations

    /// Get account by id
    pub fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self.db.get_cf(cf, id.to_be_bytes())?;
        match value {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Put account (registration and archival; transfer-driven balance
    /// writes go through `commit_transfer` instead)
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db.put_cf(cf, account.id.to_be_bytes(), value)?;
        Ok(())
    }

    // Transfer log operations

    /// Get transfer entry by sequential id
    pub fn get_transfer(&self, id: u64) -> Result<Option<TransferLogEntry>> {
        let cf = self.cf_handle(CF_TRANSFERS)?;
        let value = self.db.get_cf(cf, id.to_be_bytes())?;
        match value {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Point read through the idempotency index
    pub fn transfer_by_key(&self, key: &str) -> Result<Option<TransferLogEntry>> {
        let cf = self.cf_handle(CF_IDEMPOTENCY)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(id_bytes) => {
                let id = decode_u64(&id_bytes)?;
                self.get_transfer(id)
            }
            None => Ok(None),
        }
    }

    /// Point read through the external-reference index
    pub fn transfer_by_external_ref(
        &self,
        reference: &str,
        reason: ReasonCode,
    ) -> Result<Option<TransferLogEntry>> {
        let cf = self.cf_handle(CF_EXTERNAL_REFS)?;
        let key = self.external_ref_key(reference, reason);
        match self.db.get_cf(cf, key)? {
            Some(id_bytes) => {
                let id = decode_u64(&id_bytes)?;
                self.get_transfer(id)
            }
            None => Ok(None),
        }
    }

    /// Commit one transfer atomically: log entry, unique indices,
    /// secondary indices, and the mutated accounts in a single batch.
    ///
    /// Fails with `DuplicateKey` when the idempotency key or external
    /// reference is already claimed; the caller resolves that by
    /// re-reading the winner's entry.
    pub fn commit_transfer(
        &self,
        entry: &TransferLogEntry,
        accounts: &[&Account],
    ) -> Result<()> {
        let cf_idempotency = self.cf_handle(CF_IDEMPOTENCY)?;

        // Single-writer section: account locks only serialize intents
        // that share an account, so intents with different keys claiming
        // the same external reference (or concurrent rejections of one
        // key) meet here. The mutex makes check-then-insert atomic.
        let _commit = self.commit_lock.lock();

        if self
            .db
            .get_cf(cf_idempotency, entry.idempotency_key.as_bytes())?
            .is_some()
        {
            return Err(Error::DuplicateKey(entry.idempotency_key.clone()));
        }

        let applied = matches!(entry.status, TransferStatus::Applied);

        if applied {
            if let Some(reference) = &entry.external_reference {
                let cf_refs = self.cf_handle(CF_EXTERNAL_REFS)?;
                let ref_key = self.external_ref_key(reference, entry.reason);
                if self.db.get_cf(cf_refs, &ref_key)?.is_some() {
                    return Err(Error::DuplicateKey(reference.clone()));
                }
            }
        }

        let mut batch = WriteBatch::default();
        let id_bytes = entry.id.to_be_bytes();

        // 1. Log entry
        let cf_transfers = self.cf_handle(CF_TRANSFERS)?;
        batch.put_cf(cf_transfers, id_bytes, bincode::serialize(entry)?);

        // 2. Unique indices
        batch.put_cf(cf_idempotency, entry.idempotency_key.as_bytes(), id_bytes);
        if applied {
            if let Some(reference) = &entry.external_reference {
                let cf_refs = self.cf_handle(CF_EXTERNAL_REFS)?;
                batch.put_cf(cf_refs, self.external_ref_key(reference, entry.reason), id_bytes);
            }
        }

        // 3. Pagination and history indices
        let cf_created = self.cf_handle(CF_CREATED_INDEX)?;
        batch.put_cf(cf_created, created_index_key(entry), []);

        let cf_account_idx = self.cf_handle(CF_ACCOUNT_INDEX)?;
        for account in entry.touched_accounts() {
            batch.put_cf(cf_account_idx, account_index_key(account, entry.id), []);
        }

        // 4. Mutated balances
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for account in accounts {
            batch.put_cf(
                cf_accounts,
                account.id.to_be_bytes(),
                bincode::serialize(*account)?,
            );
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            transfer_id = entry.id,
            idempotency_key = %entry.idempotency_key,
            reason = %entry.reason,
            applied,
            "Transfer committed"
        );

        Ok(())
    }

    // Cursor scans (no offsets)

    /// Newest-first scan over (created_at, id); `cursor` is exclusive.
    pub fn scan_created_desc(
        &self,
        limit: usize,
        cursor: Option<(i64, u64)>,
    ) -> Result<Vec<TransferLogEntry>> {
        let cf = self.cf_handle(CF_CREATED_INDEX)?;

        let upper = cursor.map(|(nanos, id)| {
            // ids start at 1, so id-1 never wraps
            let mut key = Vec::with_capacity(16);
            key.extend_from_slice(&(nanos as u64).to_be_bytes());
            key.extend_from_slice(&id.saturating_sub(1).to_be_bytes());
            key
        });

        let mode = match &upper {
            Some(key) => IteratorMode::From(key.as_slice(), Direction::Reverse),
            None => IteratorMode::End,
        };

        let mut entries = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, mode) {
            if entries.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if key.len() != 16 {
                continue;
            }
            let id = u64::from_be_bytes(key[8..16].try_into().unwrap());
            if let Some(entry) = self.get_transfer(id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// Newest-first per-account history; `before_id` is exclusive.
    pub fn scan_account_desc(
        &self,
        account: AccountId,
        limit: usize,
        before_id: Option<u64>,
    ) -> Result<Vec<TransferLogEntry>> {
        let cf = self.cf_handle(CF_ACCOUNT_INDEX)?;
        let prefix = account.to_be_bytes();

        let upper_id = before_id.map(|id| id.saturating_sub(1)).unwrap_or(u64::MAX);
        let mut upper = Vec::with_capacity(16);
        upper.extend_from_slice(&prefix);
        upper.extend_from_slice(&upper_id.to_be_bytes());

        let mut entries = Vec::with_capacity(limit);
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(upper.as_slice(), Direction::Reverse))
        {
            if entries.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if key.len() != 16 || key[..8] != prefix {
                break;
            }
            let id = u64::from_be_bytes(key[8..16].try_into().unwrap());
            if let Some(entry) = self.get_transfer(id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let cf_transfers = self.cf_handle(CF_TRANSFERS)?;

        Ok(StorageStats {
            total_accounts: self.approximate_count(cf_accounts)?,
            total_transfers: self.approximate_count(cf_transfers)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    fn external_ref_key(&self, reference: &str, reason: ReasonCode) -> Vec<u8> {
        match self.external_ref_scope {
            ExternalRefScope::Global => reference.as_bytes().to_vec(),
            ExternalRefScope::PerReason => {
                let mut key = vec![reason as u8, b'|'];
                key.extend_from_slice(reference.as_bytes());
                key
            }
        }
    }
}

fn created_index_key(entry: &TransferLogEntry) -> Vec<u8> {
    let nanos = entry.created_at.timestamp_nanos_opt().unwrap_or(0);
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&(nanos as u64).to_be_bytes());
    key.extend_from_slice(&entry.id.to_be_bytes());
    key
}

fn account_index_key(account: AccountId, transfer_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&account.to_be_bytes());
    key.extend_from_slice(&transfer_id.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage("Malformed index value".to_string()))?;
    Ok(u64::from_be_bytes(array))
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of accounts
    pub total_accounts: u64,
    /// Approximate number of transfer log entries
    pub total_transfers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quantize8;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_entry(id: u64, key: &str) -> TransferLogEntry {
        TransferLogEntry {
            id,
            idempotency_key: key.to_string(),
            source: None,
            destination: Some(AccountId::new(42)),
            amount: quantize8(Decimal::new(100_00000000, 8)),
            reason: ReasonCode::TaskReward,
            external_reference: None,
            status: TransferStatus::Applied,
            resulting_balances: vec![(AccountId::new(42), Decimal::new(100_00000000, 8))],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_account_round_trip() {
        let (storage, _temp) = test_storage();

        let account = Account::new(AccountId::new(42), Utc::now());
        storage.put_account(&account).unwrap();

        let retrieved = storage.get_account(AccountId::new(42)).unwrap().unwrap();
        assert_eq!(retrieved.id, account.id);
        assert_eq!(retrieved.balance, Decimal::ZERO);
        assert!(storage.get_account(AccountId::new(7)).unwrap().is_none());
    }

    #[test]
    fn test_commit_and_lookup_by_key() {
        let (storage, _temp) = test_storage();

        let mut account = Account::new(AccountId::new(42), Utc::now());
        account.balance = Decimal::new(100_00000000, 8);

        let id = storage.alloc_transfer_id();
        let entry = test_entry(id, "t1");
        storage.commit_transfer(&entry, &[&account]).unwrap();

        let by_key = storage.transfer_by_key("t1").unwrap().unwrap();
        assert_eq!(by_key.id, id);

        let stored = storage.get_account(AccountId::new(42)).unwrap().unwrap();
        assert_eq!(stored.balance, Decimal::new(100_00000000, 8));
    }

    #[test]
    fn test_duplicate_key_rejected_on_commit() {
        let (storage, _temp) = test_storage();
        let account = Account::new(AccountId::new(42), Utc::now());

        let entry = test_entry(storage.alloc_transfer_id(), "t1");
        storage.commit_transfer(&entry, &[&account]).unwrap();

        let second = test_entry(storage.alloc_transfer_id(), "t1");
        let result = storage.commit_transfer(&second, &[&account]);
        assert!(matches!(result, Err(Error::DuplicateKey(_))));
    }

    #[test]
    fn test_external_ref_unique_for_applied() {
        let (storage, _temp) = test_storage();
        let account = Account::new(AccountId::new(42), Utc::now());

        let mut entry = test_entry(storage.alloc_transfer_id(), "d1");
        entry.external_reference = Some("txhash-1".to_string());
        storage.commit_transfer(&entry, &[&account]).unwrap();

        let found = storage
            .transfer_by_external_ref("txhash-1", ReasonCode::TaskReward)
            .unwrap();
        assert!(found.is_some());

        let mut second = test_entry(storage.alloc_transfer_id(), "d2");
        second.external_reference = Some("txhash-1".to_string());
        let result = storage.commit_transfer(&second, &[&account]);
        assert!(matches!(result, Err(Error::DuplicateKey(_))));
    }

    #[test]
    fn test_failed_commit_leaves_no_trace() {
        let (storage, _temp) = test_storage();
        let mut account = Account::new(AccountId::new(42), Utc::now());
        account.balance = Decimal::new(100_00000000, 8);

        let mut winner = test_entry(storage.alloc_transfer_id(), "d1");
        winner.external_reference = Some("txhash-1".to_string());
        storage.commit_transfer(&winner, &[&account]).unwrap();

        // A second entry claiming the same reference fails to commit;
        // neither its log entry nor its balance write may be visible
        let mut mutated = account.clone();
        mutated.balance = Decimal::new(999_00000000, 8);
        let mut loser = test_entry(storage.alloc_transfer_id(), "d2");
        loser.external_reference = Some("txhash-1".to_string());

        let result = storage.commit_transfer(&loser, &[&mutated]);
        assert!(matches!(result, Err(Error::DuplicateKey(_))));

        assert!(storage.transfer_by_key("d2").unwrap().is_none());
        assert!(storage.get_transfer(loser.id).unwrap().is_none());
        let stored = storage.get_account(AccountId::new(42)).unwrap().unwrap();
        assert_eq!(stored.balance, Decimal::new(100_00000000, 8));
    }

    #[test]
    fn test_sequence_recovered_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let first_id;
        {
            let storage = Storage::open(&config).unwrap();
            let account = Account::new(AccountId::new(42), Utc::now());
            first_id = storage.alloc_transfer_id();
            let entry = test_entry(first_id, "t1");
            storage.commit_transfer(&entry, &[&account]).unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.alloc_transfer_id(), first_id + 1);
    }

    #[test]
    fn test_scan_created_desc_with_cursor() {
        let (storage, _temp) = test_storage();
        let account = Account::new(AccountId::new(42), Utc::now());

        for i in 0..5 {
            let entry = test_entry(storage.alloc_transfer_id(), &format!("t{}", i));
            storage.commit_transfer(&entry, &[&account]).unwrap();
        }

        let first_page = storage.scan_created_desc(2, None).unwrap();
        assert_eq!(first_page.len(), 2);
        assert!(first_page[0].id > first_page[1].id);

        let last = &first_page[1];
        let cursor = Some((last.created_at.timestamp_nanos_opt().unwrap(), last.id));
        let second_page = storage.scan_created_desc(10, cursor).unwrap();
        assert_eq!(second_page.len(), 3);
        assert!(second_page.iter().all(|e| e.id < last.id));
    }

    #[test]
    fn test_scan_account_desc() {
        let (storage, _temp) = test_storage();
        let account = Account::new(AccountId::new(42), Utc::now());
        let other = Account::new(AccountId::new(7), Utc::now());
        storage.put_account(&other).unwrap();

        for i in 0..3 {
            let entry = test_entry(storage.alloc_transfer_id(), &format!("t{}", i));
            storage.commit_transfer(&entry, &[&account]).unwrap();
        }
        let mut foreign = test_entry(storage.alloc_transfer_id(), "other");
        foreign.destination = Some(AccountId::new(7));
        foreign.resulting_balances = vec![(AccountId::new(7), Decimal::ZERO)];
        storage.commit_transfer(&foreign, &[&other]).unwrap();

        let history = storage
            .scan_account_desc(AccountId::new(42), 10, None)
            .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| e.touches(AccountId::new(42))));
    }
}
