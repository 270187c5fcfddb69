use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{credit_transactions_ext::CreditTransactionExt, owner::Owner};

/// Read-only view of one ledger row
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransactionRecord {
    pub id: Uuid,
    pub owner: Owner,
    pub sequence: i64,
    pub amount: i64,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl From<&entity::credit_transactions::Model> for CreditTransactionRecord {
    fn from(model: &entity::credit_transactions::Model) -> Self {
        Self {
            id: model.id,
            owner: model.owner(),
            sequence: model.sequence,
            amount: model.amount,
            reason: model.reason.clone(),
            created_at: model.created_at,
        }
    }
}

/// Balance of an owner together with the log position it reflects
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub owner: Owner,
    pub unspent_credits: i64,
    pub last_sequence: i64,
}

impl BalanceSnapshot {
    pub fn empty(owner: Owner) -> Self {
        Self {
            owner,
            unspent_credits: 0,
            last_sequence: 0,
        }
    }
}

/// Outcome of one committed grant or consumption
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreditReceipt {
    pub transaction_id: Uuid,
    pub owner: Owner,
    /// Signed delta as recorded in the ledger
    pub amount: i64,
    pub unspent_credits: i64,
    pub sequence: i64,
}

/// Result of comparing the materialized balance with a replay of the log
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAudit {
    pub owner: Owner,
    pub materialized: i64,
    pub replayed: i64,
    pub lowest_running_total: i64,
    pub transaction_count: usize,
}

impl BalanceAudit {
    /// Materialized value matches the log and the log never went negative
    pub fn is_consistent(&self) -> bool {
        self.materialized == self.replayed && self.lowest_running_total >= 0
    }
}

/// Whose balance an admin request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreditScope {
    #[default]
    User,
    Organization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditOperation {
    Add,
    Remove,
}

/// Request to add or remove credits from the credits tool
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreditAdjustmentRequest {
    #[serde(default)]
    pub scope: CreditScope,

    pub operation: CreditOperation,

    pub amount: i64,

    #[validate(length(min = 1, max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAdjustmentData {
    pub transaction_id: Uuid,
    pub owner: Owner,
    pub operation: CreditOperation,
    pub amount: i64,
    pub unspent_credits: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistoryQuery {
    #[serde(default)]
    pub scope: CreditScope,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistoryData {
    pub owner: Owner,
    pub unspent_credits: i64,
    pub transactions: Vec<CreditTransactionRecord>,
}
