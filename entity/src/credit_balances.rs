use super::sea_orm_active_enums::OwnerKind;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Materialized running balance, one row per owner.
///
/// Only written in the same database transaction as the `credit_transactions`
/// insert that produced the delta.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub unspent_credits: i64,
    pub last_sequence: i64,
    pub last_transaction_id: Option<Uuid>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
