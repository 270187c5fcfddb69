/// Extension methods for credit_transactions entity
///
/// This file contains ledger logic that complements the entity in
/// entity/src/credit_transactions.rs
use entity::credit_transactions;

use super::owner::Owner;

/// Extension trait for CreditTransaction model
pub trait CreditTransactionExt {
    /// The owner this row belongs to
    fn owner(&self) -> Owner;

    /// Positive rows add credits
    fn is_grant(&self) -> bool;

    /// Negative rows remove credits
    fn is_consumption(&self) -> bool;
}

impl CreditTransactionExt for credit_transactions::Model {
    fn owner(&self) -> Owner {
        Owner::from_parts(self.owner_kind, self.owner_id)
    }

    fn is_grant(&self) -> bool {
        self.amount > 0
    }

    fn is_consumption(&self) -> bool {
        self.amount < 0
    }
}

/// Fold a log slice into a balance.
///
/// Returns the final balance and the lowest running total seen along the way.
pub fn fold_balance<'a, I>(transactions: I) -> (i64, i64)
where
    I: IntoIterator<Item = &'a credit_transactions::Model>,
{
    transactions
        .into_iter()
        .fold((0i64, 0i64), |(total, low), tx| {
            let total = total.saturating_add(tx.amount);
            (total, low.min(total))
        })
}
