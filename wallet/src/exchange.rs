//! Energy exchange service
//!
//! Converts generated energy into EFHC at a fixed one-to-one rate:
//! 1 kWh → 1 EFHC. The conversion is one-way; EFHC never converts back
//! into kWh. Each metering request carries a stable request id, so a
//! re-delivered reading credits the user exactly once.

use crate::{
    error::{Error, Result},
    keys,
};
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferReceipt};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Credits generated energy as EFHC
pub struct ExchangeService {
    engine: Arc<LedgerEngine>,
}

impl ExchangeService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Convert `kwh` of the user's generated energy into EFHC.
    ///
    /// `available_kwh` is the energy balance reported by the metering
    /// service; requesting more than that fails before any bank call.
    /// `request_id` must be stable across retries of the same
    /// conversion request; the amount quantizes to 8 decimal places
    /// toward zero.
    pub async fn credit_generation(
        &self,
        user: AccountId,
        request_id: &str,
        kwh: Decimal,
        available_kwh: Decimal,
    ) -> Result<TransferReceipt> {
        if request_id.is_empty() {
            return Err(Error::InvalidRequest(
                "Exchange request id must not be empty".to_string(),
            ));
        }
        if kwh > available_kwh {
            return Err(Error::InvalidRequest(format!(
                "Requested {} kWh exceeds available {}",
                kwh, available_kwh
            )));
        }

        // 1 kWh → 1 EFHC
        let intent = TransferIntent::mint(
            keys::exchange(user, request_id),
            user,
            kwh,
            ReasonCode::Exchange,
        );
        let receipt = self.engine.execute_transfer(intent).await?;

        tracing::debug!(
            user = %user,
            request_id,
            %kwh,
            status = ?receipt.status,
            "Energy credited"
        );
        Ok(receipt)
    }
}
