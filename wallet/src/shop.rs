//! Shop order charging
//!
//! An order charges the buyer's balance exactly once, keyed by order id.
//! The charge burns EFHC out of circulation; fulfilment happens off the
//! ledger once the charge receipt comes back.

use crate::{error::Result, keys};
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferReceipt};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Charges shop orders against user balances
pub struct ShopService {
    engine: Arc<LedgerEngine>,
}

impl ShopService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Charge `price` to `buyer` for one order.
    ///
    /// A double-submitted order returns the original receipt; a buyer
    /// without funds gets `InsufficientBalance` and nothing moves.
    pub async fn charge_order(
        &self,
        buyer: AccountId,
        order_id: i64,
        price: Decimal,
    ) -> Result<TransferReceipt> {
        let intent = TransferIntent::burn(
            keys::shop_charge(order_id),
            buyer,
            price,
            ReasonCode::ShopPurchase,
        );
        let receipt = self.engine.execute_transfer(intent).await?;

        tracing::debug!(
            buyer = %buyer,
            order_id,
            %price,
            status = ?receipt.status,
            "Order charged"
        );
        Ok(receipt)
    }
}
