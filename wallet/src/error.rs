//! Error types for wallet services

use thiserror::Error;

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet errors
#[derive(Error, Debug)]
pub enum Error {
    /// Bank engine error
    #[error("Bank error: {0}")]
    Bank(#[from] bank_core::Error),

    /// Invalid feature-level input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown withdrawal request
    #[error("Unknown withdrawal request: {0}")]
    UnknownWithdrawal(String),

    /// Withdrawal is not in a state that permits the operation
    #[error("Withdrawal {id} is {state}, cannot {operation}")]
    WithdrawalState {
        /// Client-supplied withdrawal identifier
        id: String,
        /// Current lifecycle state
        state: String,
        /// Operation that was attempted
        operation: String,
    },
}

impl Error {
    /// True when the underlying bank rejection was a balance shortfall
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            Error::Bank(bank_core::Error::InsufficientBalance { .. })
        )
    }
}
