//! Core types for the EFHC bank ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Fractional digits carried by every EFHC amount.
pub const EFHC_DECIMALS: u32 = 8;

/// Quantize an amount to exactly 8 fractional digits, truncating toward
/// zero. All balance math goes through this helper; no floating point is
/// used anywhere.
pub fn quantize8(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(EFHC_DECIMALS, RoundingStrategy::ToZero)
}

/// Account identifier (Telegram user id in production)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountId(i64);

impl AccountId {
    /// Create new account ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Big-endian key bytes for storage indices
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business reason attached to every transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReasonCode {
    /// External EFHC entering circulation: energy converted 1:1 or an
    /// on-chain deposit credit (the set carries no separate deposit code)
    Exchange = 1,
    /// Shop purchase charge
    ShopPurchase = 2,
    /// Task completion reward
    TaskReward = 3,
    /// Referral bonus
    ReferralBonus = 4,
    /// Lottery ticket sale
    LotteryTicket = 5,
    /// Withdrawal hold or refund
    Withdrawal = 6,
    /// Manual adjustment by an administrator
    AdminAdjustment = 7,
}

impl ReasonCode {
    /// Stable string code
    pub fn code(&self) -> &'static str {
        match self {
            ReasonCode::Exchange => "exchange",
            ReasonCode::ShopPurchase => "shop_purchase",
            ReasonCode::TaskReward => "task_reward",
            ReasonCode::ReferralBonus => "referral_bonus",
            ReasonCode::LotteryTicket => "lottery_ticket",
            ReasonCode::Withdrawal => "withdrawal",
            ReasonCode::AdminAdjustment => "admin_adjustment",
        }
    }

    /// Parse from string code
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exchange" => Some(ReasonCode::Exchange),
            "shop_purchase" => Some(ReasonCode::ShopPurchase),
            "task_reward" => Some(ReasonCode::TaskReward),
            "referral_bonus" => Some(ReasonCode::ReferralBonus),
            "lottery_ticket" => Some(ReasonCode::LotteryTicket),
            "withdrawal" => Some(ReasonCode::Withdrawal),
            "admin_adjustment" => Some(ReasonCode::AdminAdjustment),
            _ => None,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Durable per-user balance record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,

    /// EFHC balance (never negative)
    pub balance: Decimal,

    /// Reserved sub-amount not spendable by transfers
    pub locked: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Soft-archival flag; archived accounts reject new transfers
    pub archived: bool,
}

impl Account {
    /// New account with zero balance
    pub fn new(id: AccountId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            balance: Decimal::ZERO,
            locked: Decimal::ZERO,
            created_at,
            archived: false,
        }
    }

    /// Spendable balance (total minus reserved)
    pub fn available(&self) -> Decimal {
        self.balance - self.locked
    }
}

/// A money-moving intent submitted to the engine
///
/// `source: None` means system mint (e.g. task reward); `destination:
/// None` means system burn (e.g. withdrawal hold). At least one side
/// must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Caller-supplied globally unique key; the exactly-once anchor
    pub idempotency_key: String,

    /// Debited account, or None for a system mint
    pub source: Option<AccountId>,

    /// Credited account, or None for a system burn
    pub destination: Option<AccountId>,

    /// Positive amount, quantized to 8 fractional digits by the engine
    pub amount: Decimal,

    /// Business reason
    pub reason: ReasonCode,

    /// External reference (e.g. TON tx hash), unique when present
    pub external_reference: Option<String>,
}

impl TransferIntent {
    /// System mint into `destination`
    pub fn mint(
        key: impl Into<String>,
        destination: AccountId,
        amount: Decimal,
        reason: ReasonCode,
    ) -> Self {
        Self {
            idempotency_key: key.into(),
            source: None,
            destination: Some(destination),
            amount,
            reason,
            external_reference: None,
        }
    }

    /// System burn out of `source`
    pub fn burn(
        key: impl Into<String>,
        source: AccountId,
        amount: Decimal,
        reason: ReasonCode,
    ) -> Self {
        Self {
            idempotency_key: key.into(),
            source: Some(source),
            destination: None,
            amount,
            reason,
            external_reference: None,
        }
    }

    /// Transfer between two user accounts
    pub fn between(
        key: impl Into<String>,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
        reason: ReasonCode,
    ) -> Self {
        Self {
            idempotency_key: key.into(),
            source: Some(source),
            destination: Some(destination),
            amount,
            reason,
            external_reference: None,
        }
    }

    /// Attach an external reference
    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }
}

/// Why a transfer was rejected (persisted so retries reject again)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Malformed or unsupported intent
    InvalidIntent(String),
    /// Referenced account does not exist or is archived
    NotFound(AccountId),
    /// Debit would drive the source below its reserved floor
    InsufficientBalance {
        /// Account that lacked funds
        account: AccountId,
        /// Amount the intent tried to debit
        requested: Decimal,
        /// Spendable balance at the time of the attempt
        available: Decimal,
    },
}

/// Persisted outcome of a processed intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Balances moved
    Applied,
    /// Terminal rejection; balances untouched
    Rejected(RejectReason),
}

/// Append-only transfer log entry; exactly one per idempotency key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLogEntry {
    /// Sequential id (allocation order == commit order)
    pub id: u64,

    /// The idempotency key this entry answers for
    pub idempotency_key: String,

    /// Debited account, None for mints
    pub source: Option<AccountId>,

    /// Credited account, None for burns
    pub destination: Option<AccountId>,

    /// Quantized amount
    pub amount: Decimal,

    /// Business reason
    pub reason: ReasonCode,

    /// External reference, unique when present
    pub external_reference: Option<String>,

    /// Outcome of the first (and only) processing of this key
    pub status: TransferStatus,

    /// Balances of the touched accounts after apply (empty when rejected)
    pub resulting_balances: Vec<(AccountId, Decimal)>,

    /// Commit timestamp
    pub created_at: DateTime<Utc>,
}

impl TransferLogEntry {
    /// Whether the given account appears on either side
    pub fn touches(&self, account: AccountId) -> bool {
        self.source == Some(account) || self.destination == Some(account)
    }

    /// Accounts whose indices this entry lands in
    pub fn touched_accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.source.into_iter().chain(self.destination)
    }
}

/// Receipt status returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// Balances moved in this call
    Applied,
    /// A prior call with the same key already moved them
    Duplicate,
}

/// Result of a successful `execute_transfer` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Applied now, or replayed from the log
    pub status: ReceiptStatus,

    /// Log entry answering for this key
    pub log_entry_id: u64,

    /// Balances of the touched accounts after apply
    pub resulting_balances: HashMap<AccountId, Decimal>,
}

impl TransferReceipt {
    pub(crate) fn from_entry(entry: &TransferLogEntry, status: ReceiptStatus) -> Self {
        Self {
            status,
            log_entry_id: entry.id,
            resulting_balances: entry.resulting_balances.iter().copied().collect(),
        }
    }
}
