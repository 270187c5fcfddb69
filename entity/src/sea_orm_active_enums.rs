use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discriminator for the polymorphic owner of ledger rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "organization")]
    Organization,
}
