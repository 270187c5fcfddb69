use crate::{
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    models::{
        credits::{BalanceAudit, BalanceSnapshot, CreditOperation, CreditReceipt},
        owner::Owner,
    },
    services::{bounded, balance_aggregator::BalanceAggregator, ledger_store::LedgerStore},
};
use entity::credit_transactions;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Public entry point for changing and reading credit balances.
///
/// Every grant and consumption runs in one database transaction that holds
/// the owner's balance lock from the sufficiency check until commit.
pub struct CreditsService {
    db: DatabaseConnection,
    store: LedgerStore,
    balances: BalanceAggregator,
    operation_timeout: Duration,
}

impl CreditsService {
    pub fn new(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        Self {
            store: LedgerStore::new(db.clone()),
            balances: BalanceAggregator::new(db.clone()),
            operation_timeout: config.operation_timeout(),
            db,
        }
    }

    /// Add credits to an owner. Returns the new transaction id.
    #[instrument(skip(self, reason))]
    pub async fn grant(
        &self,
        owner: Owner,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<Uuid> {
        let receipt = self
            .apply_operation(owner, CreditOperation::Add, amount, reason)
            .await?;
        Ok(receipt.transaction_id)
    }

    /// Remove credits from an owner, failing with `InsufficientCredits`
    /// (and writing nothing) when the balance does not cover `amount`.
    #[instrument(skip(self, reason))]
    pub async fn consume(
        &self,
        owner: Owner,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<Uuid> {
        let receipt = self
            .apply_operation(owner, CreditOperation::Remove, amount, reason)
            .await?;
        Ok(receipt.transaction_id)
    }

    /// Grant or consume, returning the committed row and the balance after it
    #[instrument(skip(self, reason))]
    pub async fn apply_operation(
        &self,
        owner: Owner,
        operation: CreditOperation,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<CreditReceipt> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let delta = match operation {
            CreditOperation::Add => amount,
            CreditOperation::Remove => -amount,
        };

        let receipt = bounded(self.operation_timeout, self.record(owner, delta, reason)).await?;

        info!(
            owner = %owner,
            transaction_id = %receipt.transaction_id,
            amount = receipt.amount,
            unspent_credits = receipt.unspent_credits,
            "Recorded credit {}",
            match operation {
                CreditOperation::Add => "grant",
                CreditOperation::Remove => "consumption",
            }
        );

        Ok(receipt)
    }

    async fn record(
        &self,
        owner: Owner,
        delta: i64,
        reason: Option<&str>,
    ) -> LedgerResult<CreditReceipt> {
        let txn = self.db.begin().await?;

        // 1. Serialize with every other writer of this owner
        let balance = self.balances.lock_for_update(&txn, owner).await?;

        // 2. Consumptions must be covered by the locked balance
        if delta < 0 {
            if let Err(err) = self.balances.ensure_sufficient(&balance, owner, -delta) {
                txn.rollback().await?;
                warn!(
                    owner = %owner,
                    requested = -delta,
                    available = balance.unspent_credits,
                    "Rejected credit consumption"
                );
                return Err(err);
            }
        }

        // 3. Append to the log, then move the materialized balance in the same txn
        let transaction = self
            .store
            .append(&txn, owner, balance.last_sequence + 1, delta, reason)
            .await?;
        let balance = self.balances.apply(&txn, balance, &transaction).await?;

        txn.commit().await?;

        Ok(CreditReceipt {
            transaction_id: transaction.id,
            owner,
            amount: transaction.amount,
            unspent_credits: balance.unspent_credits,
            sequence: transaction.sequence,
        })
    }

    /// Current unspent credits (`unspent_credits_count`)
    #[instrument(skip(self))]
    pub async fn balance_of(&self, owner: Owner) -> LedgerResult<i64> {
        bounded(self.operation_timeout, self.balances.balance_of(owner)).await
    }

    pub async fn snapshot(&self, owner: Owner) -> LedgerResult<BalanceSnapshot> {
        bounded(self.operation_timeout, self.balances.snapshot(owner)).await
    }

    /// Audit trail of an owner, oldest first
    #[instrument(skip(self))]
    pub async fn history(&self, owner: Owner) -> LedgerResult<Vec<credit_transactions::Model>> {
        bounded(self.operation_timeout, self.store.transactions_for(owner)).await
    }

    /// Balance recomputed from the log alone
    pub async fn replay(&self, owner: Owner) -> LedgerResult<i64> {
        bounded(self.operation_timeout, self.balances.replay(owner)).await
    }

    pub async fn audit(&self, owner: Owner) -> LedgerResult<BalanceAudit> {
        bounded(self.operation_timeout, self.balances.audit(owner)).await
    }

    pub async fn rebuild(&self, owner: Owner) -> LedgerResult<BalanceAudit> {
        bounded(self.operation_timeout, self.balances.rebuild(owner)).await
    }
}
