//! Referral bonus payouts
//!
//! The inviter earns one bonus per invited user, keyed by the invited
//! account so that repeated qualification events (first deposit retried,
//! verification re-run) cannot pay twice.

use crate::{error::Result, keys};
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferReceipt};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Pays inviter bonuses
pub struct ReferralService {
    engine: Arc<LedgerEngine>,
}

impl ReferralService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Pay `inviter` the bonus for `invited` qualifying
    pub async fn pay_bonus(
        &self,
        inviter: AccountId,
        invited: AccountId,
        bonus: Decimal,
    ) -> Result<TransferReceipt> {
        let intent = TransferIntent::mint(
            keys::referral_bonus(invited),
            inviter,
            bonus,
            ReasonCode::ReferralBonus,
        );
        let receipt = self.engine.execute_transfer(intent).await?;

        tracing::debug!(
            inviter = %inviter,
            invited = %invited,
            %bonus,
            status = ?receipt.status,
            "Referral bonus paid"
        );
        Ok(receipt)
    }
}
