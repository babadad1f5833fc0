//! On-chain deposit crediting
//!
//! The chain watcher reports confirmed EFHC deposits by transaction
//! hash. The hash doubles as both the idempotency key and the external
//! reference, so a hash credits exactly once even across watcher
//! restarts or two watchers scanning the same block range.

use crate::{
    error::{Error, Result},
    keys,
};
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferReceipt};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Credits confirmed on-chain deposits
pub struct DepositService {
    engine: Arc<LedgerEngine>,
}

impl DepositService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Credit one confirmed deposit identified by its transaction hash
    pub async fn credit_deposit(
        &self,
        user: AccountId,
        tx_hash: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        if tx_hash.is_empty() {
            return Err(Error::InvalidRequest(
                "Deposit transaction hash must not be empty".to_string(),
            ));
        }

        // Deposits book under the exchange reason: the reason set is
        // closed and has no separate deposit code, and both flows are
        // external EFHC entering circulation
        let intent = TransferIntent::mint(
            keys::deposit(tx_hash),
            user,
            amount,
            ReasonCode::Exchange,
        )
        .with_external_reference(tx_hash);
        let receipt = self.engine.execute_transfer(intent).await?;

        tracing::info!(
            user = %user,
            tx_hash,
            %amount,
            status = ?receipt.status,
            "Deposit credited"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::{Config, ReceiptStatus};

    async fn create_test_service() -> (DepositService, Arc<LedgerEngine>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let engine = Arc::new(LedgerEngine::open(config).await.unwrap());
        (DepositService::new(engine.clone()), engine, temp_dir)
    }

    #[tokio::test]
    async fn test_deposit_credits_balance() {
        let (service, engine, _temp) = create_test_service().await;
        let user = AccountId::new(5);
        engine.accounts().create_account(user).unwrap();

        let amount: Decimal = "12.00000000".parse().unwrap();
        service.credit_deposit(user, "0xdead", amount).await.unwrap();
        assert_eq!(engine.balance_of(user).unwrap(), amount);
    }

    #[tokio::test]
    async fn test_rescanned_hash_credits_once() {
        let (service, engine, _temp) = create_test_service().await;
        let user = AccountId::new(5);
        engine.accounts().create_account(user).unwrap();

        let amount = Decimal::from(3);
        service.credit_deposit(user, "0xbeef", amount).await.unwrap();
        let replay = service.credit_deposit(user, "0xbeef", amount).await.unwrap();

        assert_eq!(replay.status, ReceiptStatus::Duplicate);
        assert_eq!(engine.balance_of(user).unwrap(), amount);
    }

    #[tokio::test]
    async fn test_hash_is_unique_across_log() {
        let (service, engine, _temp) = create_test_service().await;
        let user = AccountId::new(5);
        engine.accounts().create_account(user).unwrap();

        service
            .credit_deposit(user, "0xcafe", Decimal::from(2))
            .await
            .unwrap();

        // The hash claims the external reference index, booked under
        // the exchange reason
        let entry = engine
            .log()
            .lookup_external("0xcafe", ReasonCode::Exchange)
            .unwrap()
            .unwrap();
        assert_eq!(entry.reason, ReasonCode::Exchange);
        assert_eq!(entry.external_reference.as_deref(), Some("0xcafe"));
    }
}
