use crate::{error::LedgerResult, models::owner::Owner};
use entity::{credit_transactions, prelude::CreditTransactions};
use sea_orm::{entity::*, query::*, DatabaseConnection, DatabaseTransaction, Select};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Append-only store for credit transactions.
///
/// Rows are inserted and read, never updated or deleted.
pub struct LedgerStore {
    db: DatabaseConnection,
}

impl LedgerStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append one transaction inside the caller's database transaction.
    ///
    /// `sequence` must be the owner's next log position; the caller holds the
    /// owner's balance lock while choosing it.
    #[instrument(skip(self, txn, reason))]
    pub async fn append(
        &self,
        txn: &DatabaseTransaction,
        owner: Owner,
        sequence: i64,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<credit_transactions::Model> {
        let new_transaction = credit_transactions::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_kind: Set(owner.kind()),
            owner_id: Set(owner.id()),
            sequence: Set(sequence),
            amount: Set(amount),
            reason: Set(reason.map(|s| s.to_string())),
            created_at: Set(time::OffsetDateTime::now_utc()),
        };

        let inserted = new_transaction.insert(txn).await?;

        debug!(
            owner = %owner,
            transaction_id = %inserted.id,
            sequence,
            amount,
            "Appended credit transaction"
        );

        Ok(inserted)
    }

    /// Every transaction of an owner in append order (oldest first)
    #[instrument(skip(self))]
    pub async fn transactions_for(
        &self,
        owner: Owner,
    ) -> LedgerResult<Vec<credit_transactions::Model>> {
        Ok(Self::owner_log(owner).all(&self.db).await?)
    }

    /// Same as `transactions_for`, read through an open transaction
    pub async fn transactions_for_in_txn(
        &self,
        owner: Owner,
        txn: &DatabaseTransaction,
    ) -> LedgerResult<Vec<credit_transactions::Model>> {
        Ok(Self::owner_log(owner).all(txn).await?)
    }

    fn owner_log(owner: Owner) -> Select<CreditTransactions> {
        CreditTransactions::find()
            .filter(credit_transactions::Column::OwnerKind.eq(owner.kind()))
            .filter(credit_transactions::Column::OwnerId.eq(owner.id()))
            .order_by_asc(credit_transactions::Column::Sequence)
    }
}
