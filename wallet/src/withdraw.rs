//! Withdrawal lifecycle
//!
//! A withdrawal holds the full amount the moment it is requested, so the
//! user cannot spend funds that an operator is about to pay out. The
//! hold burns EFHC under `{key}:hold`; a rejection or cancellation mints
//! it back under `{key}:refund`. Both legs are idempotent in the bank,
//! so crashing between the state update and the money move and retrying
//! cannot double-burn or double-refund.
//!
//! ```text
//! Requested → Approved → Paid
//!     ↘ Rejected (refund)
//!     ↘ Canceled (refund)
//! ```
//!
//! Request state itself lives in memory; after a restart,
//! `recover_outstanding` rebuilds it from the transfer log — every
//! applied hold without a matching refund is an open request.

use crate::{
    error::{Error, Result},
    keys,
};
use bank_core::log::MAX_PAGE_SIZE;
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a withdrawal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawState {
    /// Hold placed, awaiting operator review
    Requested,
    /// Operator approved, awaiting off-platform payout
    Approved,
    /// Operator rejected, hold refunded
    Rejected,
    /// User canceled before review, hold refunded
    Canceled,
    /// Payout confirmed off-platform
    Paid,
}

impl fmt::Display for WithdrawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawState::Requested => "requested",
            WithdrawState::Approved => "approved",
            WithdrawState::Rejected => "rejected",
            WithdrawState::Canceled => "canceled",
            WithdrawState::Paid => "paid",
        };
        write!(f, "{}", s)
    }
}

/// One withdrawal request
#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    /// Client-supplied stable identifier, also the key prefix for both
    /// money legs
    pub client_key: String,
    /// Requesting user
    pub user: AccountId,
    /// Amount held for payout
    pub amount: Decimal,
    /// Current lifecycle state
    pub state: WithdrawState,
    /// Off-platform payout reference, set when marked paid
    pub payout_reference: Option<String>,
    /// When the hold was placed
    pub requested_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}

/// Manages withdrawal requests and their hold/refund legs
pub struct WithdrawService {
    engine: Arc<LedgerEngine>,
    requests: DashMap<String, WithdrawRequest>,
}

impl WithdrawService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self {
            engine,
            requests: DashMap::new(),
        }
    }

    /// Place a withdrawal request, holding the full amount.
    ///
    /// Retrying with the same `client_key` returns the existing request;
    /// the hold leg itself de-duplicates in the bank.
    pub async fn request(
        &self,
        user: AccountId,
        client_key: &str,
        amount: Decimal,
    ) -> Result<WithdrawRequest> {
        if client_key.is_empty() {
            return Err(Error::InvalidRequest(
                "Withdrawal key must not be empty".to_string(),
            ));
        }
        if let Some(existing) = self.requests.get(client_key) {
            return Ok(existing.clone());
        }

        let hold = TransferIntent::burn(
            keys::withdraw_hold(client_key),
            user,
            amount,
            ReasonCode::Withdrawal,
        );
        self.engine.execute_transfer(hold).await?;

        let now = Utc::now();
        let request = WithdrawRequest {
            client_key: client_key.to_string(),
            user,
            amount,
            state: WithdrawState::Requested,
            payout_reference: None,
            requested_at: now,
            updated_at: now,
        };
        // A racing request for the same key already holds once in the
        // bank; keep whichever registry entry landed first
        let entry = self
            .requests
            .entry(client_key.to_string())
            .or_insert(request);
        tracing::info!(user = %user, client_key, %amount, "Withdrawal requested");
        Ok(entry.clone())
    }

    /// Approve a requested withdrawal for payout
    pub fn approve(&self, client_key: &str) -> Result<WithdrawRequest> {
        self.transition(client_key, "approve", |state| match state {
            WithdrawState::Requested => Some(WithdrawState::Approved),
            WithdrawState::Approved => Some(WithdrawState::Approved),
            _ => None,
        })
    }

    /// Confirm the off-platform payout of an approved withdrawal,
    /// recording the payout reference (e.g. the on-chain tx hash)
    pub fn mark_paid(&self, client_key: &str, payout_reference: &str) -> Result<WithdrawRequest> {
        let paid = self.transition(client_key, "mark paid", |state| match state {
            WithdrawState::Approved => Some(WithdrawState::Paid),
            WithdrawState::Paid => Some(WithdrawState::Paid),
            _ => None,
        })?;
        if paid.payout_reference.as_deref() != Some(payout_reference) {
            if let Some(mut entry) = self.requests.get_mut(client_key) {
                entry.payout_reference = Some(payout_reference.to_string());
                return Ok(entry.clone());
            }
        }
        Ok(paid)
    }

    /// Reject a requested withdrawal and refund the hold
    pub async fn reject(&self, client_key: &str) -> Result<WithdrawRequest> {
        self.refund_into(client_key, "reject", WithdrawState::Rejected)
            .await
    }

    /// Cancel a requested withdrawal and refund the hold
    pub async fn cancel(&self, client_key: &str) -> Result<WithdrawRequest> {
        self.refund_into(client_key, "cancel", WithdrawState::Canceled)
            .await
    }

    /// Look up a withdrawal request
    pub fn get(&self, client_key: &str) -> Option<WithdrawRequest> {
        self.requests.get(client_key).map(|r| r.clone())
    }

    /// Rebuild the registry from the transfer log after a restart.
    ///
    /// Walks the log for applied withdrawal holds lacking a matching
    /// refund and registers each as `Requested`. Holds whose payout was
    /// already confirmed off-platform come back as `Requested` too; the
    /// operator re-approves and re-marks them against payout records
    /// instead of refunding. Returns the recovered requests.
    pub fn recover_outstanding(&self) -> Result<Vec<WithdrawRequest>> {
        let log = self.engine.log();
        let mut recovered = Vec::new();
        let mut cursor = None;

        loop {
            let page = log.list(MAX_PAGE_SIZE, cursor)?;
            for entry in &page.entries {
                if entry.reason != ReasonCode::Withdrawal
                    || !matches!(entry.status, TransferStatus::Applied)
                {
                    continue;
                }
                let Some(client_key) = entry.idempotency_key.strip_suffix(":hold") else {
                    continue;
                };
                let Some(user) = entry.source else {
                    continue;
                };
                if log.lookup(&keys::withdraw_refund(client_key))?.is_some() {
                    continue;
                }
                if self.requests.contains_key(client_key) {
                    continue;
                }

                let request = WithdrawRequest {
                    client_key: client_key.to_string(),
                    user,
                    amount: entry.amount,
                    state: WithdrawState::Requested,
                    payout_reference: None,
                    requested_at: entry.created_at,
                    updated_at: entry.created_at,
                };
                self.requests.insert(client_key.to_string(), request.clone());
                recovered.push(request);
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(count = recovered.len(), "Recovered outstanding withdrawals");
        Ok(recovered)
    }

    async fn refund_into(
        &self,
        client_key: &str,
        operation: &str,
        target: WithdrawState,
    ) -> Result<WithdrawRequest> {
        let request = self
            .get(client_key)
            .ok_or_else(|| Error::UnknownWithdrawal(client_key.to_string()))?;

        match request.state {
            WithdrawState::Requested => {}
            state if state == target => return Ok(request),
            state => {
                return Err(Error::WithdrawalState {
                    id: client_key.to_string(),
                    state: state.to_string(),
                    operation: operation.to_string(),
                })
            }
        }

        // Refund first; if the state update is lost a retry replays the
        // refund as a duplicate and only flips the state
        let refund = TransferIntent::mint(
            keys::withdraw_refund(client_key),
            request.user,
            request.amount,
            ReasonCode::Withdrawal,
        );
        self.engine.execute_transfer(refund).await?;

        self.transition(client_key, operation, |state| match state {
            WithdrawState::Requested => Some(target),
            state if state == target => Some(target),
            _ => None,
        })
    }

    fn transition(
        &self,
        client_key: &str,
        operation: &str,
        next: impl Fn(WithdrawState) -> Option<WithdrawState>,
    ) -> Result<WithdrawRequest> {
        let mut entry = self
            .requests
            .get_mut(client_key)
            .ok_or_else(|| Error::UnknownWithdrawal(client_key.to_string()))?;

        match next(entry.state) {
            Some(state) => {
                if entry.state != state {
                    entry.state = state;
                    entry.updated_at = Utc::now();
                    tracing::info!(client_key, %state, "Withdrawal state changed");
                }
                Ok(entry.clone())
            }
            None => Err(Error::WithdrawalState {
                id: client_key.to_string(),
                state: entry.state.to_string(),
                operation: operation.to_string(),
            }),
        }
    }
}
