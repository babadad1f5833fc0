//! Error types for the bank ledger

use crate::types::{AccountId, RejectReason};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported intent (caller bug, not retried)
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    /// Referenced account does not exist
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Debit would drive the balance negative
    #[error("Insufficient balance on {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Account that lacked funds
        account: AccountId,
        /// Amount the intent tried to debit
        requested: Decimal,
        /// Spendable balance at the time of the attempt
        available: Decimal,
    },

    /// Unique-index collision; internal only, resolved to a duplicate
    /// receipt by the engine
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (lock poisoned, task cancelled)
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

impl Error {
    /// Terminal errors are persisted as rejected log entries so a retry
    /// with the same key rejects deterministically. Infrastructure
    /// errors are transient and must be retried by the caller.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::InvalidIntent(_) | Error::NotFound(_) | Error::InsufficientBalance { .. }
        )
    }

    /// Persisted form of a terminal error; None for transient errors.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Error::InvalidIntent(msg) => Some(RejectReason::InvalidIntent(msg.clone())),
            Error::NotFound(account) => Some(RejectReason::NotFound(*account)),
            Error::InsufficientBalance {
                account,
                requested,
                available,
            } => Some(RejectReason::InsufficientBalance {
                account: *account,
                requested: *requested,
                available: *available,
            }),
            _ => None,
        }
    }
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InvalidIntent(msg) => Error::InvalidIntent(msg),
            RejectReason::NotFound(account) => Error::NotFound(account),
            RejectReason::InsufficientBalance {
                account,
                requested,
                available,
            } => Error::InsufficientBalance {
                account,
                requested,
                available,
            },
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(Error::InvalidIntent("zero amount".into()).is_terminal());
        assert!(Error::NotFound(AccountId::new(1)).is_terminal());
        assert!(!Error::Storage("db unreachable".into()).is_terminal());
        assert!(!Error::DuplicateKey("k".into()).is_terminal());
    }

    #[test]
    fn test_reject_reason_roundtrip() {
        let err = Error::InsufficientBalance {
            account: AccountId::new(9),
            requested: Decimal::from(50),
            available: Decimal::from(10),
        };
        let reason = err.reject_reason().unwrap();
        let back: Error = reason.into();
        assert!(matches!(back, Error::InsufficientBalance { .. }));
    }
}
