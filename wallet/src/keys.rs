//! Deterministic idempotency keys
//!
//! Every wallet service derives its bank idempotency key from stable
//! business identifiers, never from timestamps or random values. Two
//! invocations of the same business action therefore always produce the
//! same key, and the bank's transfer log collapses them into one move.

use bank_core::AccountId;

/// Key for crediting one energy-exchange request
pub fn exchange(user: AccountId, request_id: &str) -> String {
    format!("exchange:{}:{}", user.value(), request_id)
}

/// Key for crediting one on-chain EFHC deposit
pub fn deposit(tx_hash: &str) -> String {
    format!("deposit:efhc:{}", tx_hash)
}

/// Key for paying out one approved task submission
pub fn task_payout(submission_id: i64) -> String {
    format!("task_submission:{}:payout", submission_id)
}

/// Key for the inviter bonus of one invited user
pub fn referral_bonus(invited: AccountId) -> String {
    format!("referral:{}:bonus", invited.value())
}

/// Key for charging one shop order
pub fn shop_charge(order_id: i64) -> String {
    format!("shop_order:{}:charge", order_id)
}

/// Key for charging one lottery ticket
pub fn lottery_ticket(lottery_id: i64, ticket_no: u32) -> String {
    format!("lottery:{}:ticket:{}", lottery_id, ticket_no)
}

/// Key for placing the hold of one withdrawal request
pub fn withdraw_hold(client_key: &str) -> String {
    format!("{}:hold", client_key)
}

/// Key for refunding one rejected or canceled withdrawal request
pub fn withdraw_refund(client_key: &str) -> String {
    format!("{}:refund", client_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let user = AccountId::new(42);
        assert_eq!(exchange(user, "req-7"), exchange(user, "req-7"));
        assert_eq!(deposit("0xabc"), "deposit:efhc:0xabc");
        assert_eq!(task_payout(15), "task_submission:15:payout");
        assert_eq!(referral_bonus(AccountId::new(9)), "referral:9:bonus");
        assert_eq!(shop_charge(3), "shop_order:3:charge");
        assert_eq!(lottery_ticket(2, 17), "lottery:2:ticket:17");
    }

    #[test]
    fn test_hold_and_refund_keys_differ() {
        let hold = withdraw_hold("wd-1");
        let refund = withdraw_refund("wd-1");
        assert_ne!(hold, refund);
        assert_eq!(hold, "wd-1:hold");
        assert_eq!(refund, "wd-1:refund");
    }
}
