//! Transfer log reads: idempotency lookups and cursor pagination
//!
//! The log is write-once; entries are appended inside the engine's
//! atomic commit and never updated or deleted. This module only exposes
//! reads. Pagination is keyset-based over (created_at, id) — no offset
//! scans.

use crate::{
    error::Result,
    storage::Storage,
    types::{AccountId, ReasonCode, TransferLogEntry},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum page size for listings
pub const MAX_PAGE_SIZE: usize = 200;

/// Read-side facade over the persisted transfer log
pub struct TransferLog {
    storage: Arc<Storage>,
}

/// Opaque keyset cursor over (created_at, id), newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// created_at of the last returned entry, in nanoseconds
    pub ts: i64,
    /// id of the last returned entry
    pub id: u64,
}

impl Cursor {
    /// Encode as an opaque token for API responses
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("cursor serialization cannot fail")
    }

    /// Decode a token; malformed tokens read as "no cursor"
    pub fn decode(token: &str) -> Option<Self> {
        serde_json::from_str(token).ok()
    }
}

/// One page of log entries, newest first
#[derive(Debug, Clone)]
pub struct Page {
    /// Entries in (created_at, id) descending order
    pub entries: Vec<TransferLogEntry>,
    /// Cursor for the next page, None when exhausted
    pub next_cursor: Option<Cursor>,
}

impl TransferLog {
    /// Create a log facade over the shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Point read by idempotency key
    pub fn lookup(&self, key: &str) -> Result<Option<TransferLogEntry>> {
        self.storage.transfer_by_key(key)
    }

    /// Point read by external reference, honoring the configured scope
    pub fn lookup_external(
        &self,
        reference: &str,
        reason: ReasonCode,
    ) -> Result<Option<TransferLogEntry>> {
        self.storage.transfer_by_external_ref(reference, reason)
    }

    /// Entry by sequential id
    pub fn get(&self, id: u64) -> Result<Option<TransferLogEntry>> {
        self.storage.get_transfer(id)
    }

    /// Administrative listing, newest first
    pub fn list(&self, limit: usize, cursor: Option<Cursor>) -> Result<Page> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let entries = self
            .storage
            .scan_created_desc(limit, cursor.map(|c| (c.ts, c.id)))?;
        Ok(Self::page_from(entries, limit))
    }

    /// Per-account history, newest first; the cursor is the id of the
    /// last returned entry
    pub fn list_for_account(
        &self,
        account: AccountId,
        limit: usize,
        before_id: Option<u64>,
    ) -> Result<Vec<TransferLogEntry>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.storage.scan_account_desc(account, limit, before_id)
    }

    fn page_from(entries: Vec<TransferLogEntry>, limit: usize) -> Page {
        let next_cursor = if entries.len() == limit {
            entries.last().map(|e| Cursor {
                ts: e.created_at.timestamp_nanos_opt().unwrap_or(0),
                id: e.id,
            })
        } else {
            None
        };
        Page {
            entries,
            next_cursor,
        }
    }
}
