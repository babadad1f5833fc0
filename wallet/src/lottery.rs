//! Lottery ticket purchases
//!
//! A ticket slot is identified by (lottery id, ticket number); charging
//! it twice is a no-op, so a stuck client retrying a purchase cannot be
//! billed for two tickets.

use crate::{error::Result, keys};
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferReceipt};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Charges lottery ticket purchases
pub struct LotteryService {
    engine: Arc<LedgerEngine>,
}

impl LotteryService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Charge `buyer` for one ticket slot in a lottery
    pub async fn buy_ticket(
        &self,
        buyer: AccountId,
        lottery_id: i64,
        ticket_no: u32,
        price: Decimal,
    ) -> Result<TransferReceipt> {
        let intent = TransferIntent::burn(
            keys::lottery_ticket(lottery_id, ticket_no),
            buyer,
            price,
            ReasonCode::LotteryTicket,
        );
        let receipt = self.engine.execute_transfer(intent).await?;

        tracing::debug!(
            buyer = %buyer,
            lottery_id,
            ticket_no,
            %price,
            status = ?receipt.status,
            "Lottery ticket charged"
        );
        Ok(receipt)
    }
}
