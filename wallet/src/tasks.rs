//! Task reward payouts
//!
//! When a moderator approves a task submission, the submission id pays
//! out exactly once regardless of how many approval events fire.

use crate::{error::Result, keys};
use bank_core::{AccountId, LedgerEngine, ReasonCode, TransferIntent, TransferReceipt};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Pays rewards for approved task submissions
pub struct TaskService {
    engine: Arc<LedgerEngine>,
}

impl TaskService {
    /// Create the service over a shared bank engine
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Pay the reward for one approved submission
    pub async fn pay_reward(
        &self,
        user: AccountId,
        submission_id: i64,
        reward: Decimal,
    ) -> Result<TransferReceipt> {
        let intent = TransferIntent::mint(
            keys::task_payout(submission_id),
            user,
            reward,
            ReasonCode::TaskReward,
        );
        let receipt = self.engine.execute_transfer(intent).await?;

        tracing::debug!(
            user = %user,
            submission_id,
            %reward,
            status = ?receipt.status,
            "Task reward paid"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::{Config, ReceiptStatus};

    async fn create_test_service() -> (TaskService, Arc<LedgerEngine>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let engine = Arc::new(LedgerEngine::open(config).await.unwrap());
        (TaskService::new(engine.clone()), engine, temp_dir)
    }

    #[tokio::test]
    async fn test_double_approval_pays_once() {
        let (service, engine, _temp) = create_test_service().await;
        let user = AccountId::new(8);
        engine.accounts().create_account(user).unwrap();

        let reward: Decimal = "0.50000000".parse().unwrap();
        service.pay_reward(user, 31, reward).await.unwrap();
        let replay = service.pay_reward(user, 31, reward).await.unwrap();

        assert_eq!(replay.status, ReceiptStatus::Duplicate);
        assert_eq!(engine.balance_of(user).unwrap(), reward);
    }

    #[tokio::test]
    async fn test_distinct_submissions_pay_separately() {
        let (service, engine, _temp) = create_test_service().await;
        let user = AccountId::new(8);
        engine.accounts().create_account(user).unwrap();

        let reward = Decimal::ONE;
        service.pay_reward(user, 1, reward).await.unwrap();
        service.pay_reward(user, 2, reward).await.unwrap();

        assert_eq!(engine.balance_of(user).unwrap(), Decimal::from(2));
    }
}
