//! EFHC Bank Core
//!
//! Internal balance ledger for EFHC, the platform's fixed-point energy
//! token. Every feature that moves EFHC (exchange, shop, tasks,
//! referrals, lottery, withdrawals) goes through one engine call with a
//! caller-supplied idempotency key.
//!
//! # Invariants
//!
//! - Exactly-once: one idempotency key applies at most one balance move
//! - Non-negativity: user balances never drop below zero
//! - Atomicity: a transfer's log entry and balance writes commit together
//! - Append-only: log entries are never modified or deleted
//! - Quantization: every stored amount has at most 8 decimal places

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod accounts;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use accounts::AccountStore;
pub use config::{Config, ExternalRefScope};
pub use engine::LedgerEngine;
pub use error::{Error, Result};
pub use log::{Cursor, Page, TransferLog};
pub use metrics::Metrics;
pub use types::{
    quantize8, Account, AccountId, ReasonCode, ReceiptStatus, RejectReason, TransferIntent,
    TransferLogEntry, TransferReceipt, TransferStatus,
};
