use crate::{
    error::{LedgerError, LedgerResult},
    models::{
        credit_transactions_ext::fold_balance,
        credits::{BalanceAudit, BalanceSnapshot},
        owner::Owner,
    },
    services::ledger_store::LedgerStore,
};
use entity::{credit_balances, credit_transactions, prelude::CreditBalances};
use sea_orm::{
    entity::*, query::*, sea_query::OnConflict, DatabaseConnection, DatabaseTransaction, DbErr,
    Select, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Maintains the materialized per-owner balance next to the ledger.
///
/// The `credit_balances` row of an owner doubles as that owner's lock: every
/// write path takes it with `SELECT ... FOR UPDATE` before reading or changing
/// the balance.
pub struct BalanceAggregator {
    db: DatabaseConnection,
    store: LedgerStore,
}

impl BalanceAggregator {
    pub fn new(db: DatabaseConnection) -> Self {
        let store = LedgerStore::new(db.clone());
        Self { db, store }
    }

    /// Current unspent credits of an owner (0 for an owner with no history)
    #[instrument(skip(self))]
    pub async fn balance_of(&self, owner: Owner) -> LedgerResult<i64> {
        Ok(self.snapshot(owner).await?.unspent_credits)
    }

    /// Balance plus the log position it was derived from
    pub async fn snapshot(&self, owner: Owner) -> LedgerResult<BalanceSnapshot> {
        let balance = Self::owner_balance(owner).one(&self.db).await?;

        Ok(balance
            .map(|row| BalanceSnapshot {
                owner,
                unspent_credits: row.unspent_credits,
                last_sequence: row.last_sequence,
            })
            .unwrap_or_else(|| BalanceSnapshot::empty(owner)))
    }

    /// Find or create the owner's balance row and lock it for the rest of `txn`
    pub async fn lock_for_update(
        &self,
        txn: &DatabaseTransaction,
        owner: Owner,
    ) -> LedgerResult<credit_balances::Model> {
        let balance = Self::locked_owner_balance(owner).one(txn).await?;

        if let Some(balance) = balance {
            return Ok(balance);
        }

        // First write for this owner: insert (no-op if another transaction races) then re-lock
        let now = time::OffsetDateTime::now_utc();
        let new_balance = credit_balances::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_kind: Set(owner.kind()),
            owner_id: Set(owner.id()),
            unspent_credits: Set(0),
            last_sequence: Set(0),
            last_transaction_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        CreditBalances::insert(new_balance)
            .on_conflict(
                OnConflict::columns([
                    credit_balances::Column::OwnerKind,
                    credit_balances::Column::OwnerId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;

        Self::locked_owner_balance(owner)
            .one(txn)
            .await?
            .ok_or_else(|| {
                LedgerError::from(DbErr::RecordNotFound(format!(
                    "credit balance for {} missing after insert",
                    owner
                )))
            })
    }

    /// Reject a consumption the locked balance cannot cover
    pub fn ensure_sufficient(
        &self,
        balance: &credit_balances::Model,
        owner: Owner,
        amount: i64,
    ) -> LedgerResult<()> {
        if balance.unspent_credits < amount {
            return Err(LedgerError::InsufficientCredits {
                owner,
                requested: amount,
                available: balance.unspent_credits,
            });
        }
        Ok(())
    }

    /// Fold a freshly appended transaction into the locked balance row
    pub async fn apply(
        &self,
        txn: &DatabaseTransaction,
        balance: credit_balances::Model,
        transaction: &credit_transactions::Model,
    ) -> LedgerResult<credit_balances::Model> {
        let unspent = balance
            .unspent_credits
            .checked_add(transaction.amount)
            .ok_or(LedgerError::InvalidAmount(transaction.amount))?;

        if unspent < 0 {
            return Err(LedgerError::InsufficientCredits {
                owner: Owner::from_parts(balance.owner_kind, balance.owner_id),
                requested: -transaction.amount,
                available: balance.unspent_credits,
            });
        }

        let mut balance_active: credit_balances::ActiveModel = balance.into();
        balance_active.unspent_credits = Set(unspent);
        balance_active.last_sequence = Set(transaction.sequence);
        balance_active.last_transaction_id = Set(Some(transaction.id));
        balance_active.updated_at = Set(time::OffsetDateTime::now_utc());

        Ok(balance_active.update(txn).await?)
    }

    /// Recompute the balance from an empty state by folding the whole log
    #[instrument(skip(self))]
    pub async fn replay(&self, owner: Owner) -> LedgerResult<i64> {
        let transactions = self.store.transactions_for(owner).await?;
        Ok(fold_balance(&transactions).0)
    }

    /// Compare the materialized balance against a replay of the log.
    ///
    /// Both reads happen under a shared lock on the balance row, so no writer
    /// can slip in between them.
    #[instrument(skip(self))]
    pub async fn audit(&self, owner: Owner) -> LedgerResult<BalanceAudit> {
        let txn = self.db.begin().await?;

        let materialized = Self::owner_balance(owner)
            .lock_shared()
            .one(&txn)
            .await?
            .map(|row| row.unspent_credits)
            .unwrap_or(0);
        let transactions = self.store.transactions_for_in_txn(owner, &txn).await?;

        txn.commit().await?;

        let (replayed, lowest_running_total) = fold_balance(&transactions);
        Ok(BalanceAudit {
            owner,
            materialized,
            replayed,
            lowest_running_total,
            transaction_count: transactions.len(),
        })
    }

    /// Overwrite the materialized balance with the replayed one.
    ///
    /// Returns the audit taken before the repair.
    #[instrument(skip(self))]
    pub async fn rebuild(&self, owner: Owner) -> LedgerResult<BalanceAudit> {
        let txn = self.db.begin().await?;

        let balance = self.lock_for_update(&txn, owner).await?;
        let transactions = self.store.transactions_for_in_txn(owner, &txn).await?;
        let (replayed, lowest_running_total) = fold_balance(&transactions);

        let audit = BalanceAudit {
            owner,
            materialized: balance.unspent_credits,
            replayed,
            lowest_running_total,
            transaction_count: transactions.len(),
        };

        if !audit.is_consistent() {
            warn!(
                owner = %owner,
                materialized = audit.materialized,
                replayed = audit.replayed,
                lowest_running_total = audit.lowest_running_total,
                "Materialized credit balance diverged from ledger"
            );
        }

        let last = transactions.last();
        let mut balance_active: credit_balances::ActiveModel = balance.into();
        balance_active.unspent_credits = Set(replayed);
        balance_active.last_sequence = Set(last.map(|tx| tx.sequence).unwrap_or(0));
        balance_active.last_transaction_id = Set(last.map(|tx| tx.id));
        balance_active.updated_at = Set(time::OffsetDateTime::now_utc());
        balance_active.update(&txn).await?;

        txn.commit().await?;

        info!(owner = %owner, unspent_credits = replayed, "Rebuilt credit balance from ledger");

        Ok(audit)
    }

    fn owner_balance(owner: Owner) -> Select<CreditBalances> {
        CreditBalances::find()
            .filter(credit_balances::Column::OwnerKind.eq(owner.kind()))
            .filter(credit_balances::Column::OwnerId.eq(owner.id()))
    }

    /// The owner's balance row as `SELECT ... FOR UPDATE`
    fn locked_owner_balance(owner: Owner) -> Select<CreditBalances> {
        Self::owner_balance(owner).lock_exclusive()
    }
}
