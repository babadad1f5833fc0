//! EFHC Wallet Services
//!
//! Feature-facing adapters over the bank engine. Each service owns the
//! deterministic idempotency keys for its domain so that any retry of a
//! business action (a resubmitted exchange request, a re-scanned deposit,
//! a double-clicked shop order) de-duplicates inside the bank instead of
//! double-moving EFHC.
//!
//! # Services
//!
//! - **Exchange**: credits generated energy as EFHC, 1 kWh → 1 EFHC, one-way
//! - **Deposits**: credits on-chain EFHC deposits keyed by transaction hash
//! - **Tasks**: pays task rewards, once per approved submission
//! - **Referrals**: pays the inviter bonus, once per invited user
//! - **Shop**: charges orders against the user balance
//! - **Lottery**: charges ticket purchases
//! - **Withdrawals**: hold/refund lifecycle for off-platform payouts
//!
//! # Example
//!
//! ```no_run
//! use bank_core::{AccountId, Config, LedgerEngine};
//! use wallet::ExchangeService;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> wallet::Result<()> {
//!     let engine = Arc::new(LedgerEngine::open(Config::default()).await?);
//!     let exchange = ExchangeService::new(engine.clone());
//!
//!     let user = AccountId::new(100);
//!     engine.accounts().create_account(user)?;
//!     exchange.credit_generation(user, "req-1", Decimal::from(3), Decimal::from(5)).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod deposits;
pub mod error;
pub mod exchange;
pub mod keys;
pub mod lottery;
pub mod referrals;
pub mod shop;
pub mod tasks;
pub mod withdraw;

// Re-exports
pub use deposits::DepositService;
pub use error::{Error, Result};
pub use exchange::ExchangeService;
pub use lottery::LotteryService;
pub use referrals::ReferralService;
pub use shop::ShopService;
pub use tasks::TaskService;
pub use withdraw::{WithdrawRequest, WithdrawService, WithdrawState};
