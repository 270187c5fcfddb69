//! SeaORM entities for the credit ledger schema

pub mod prelude;

pub mod credit_balances;
pub mod credit_transactions;
pub mod organization_memberships;
pub mod organizations;
pub mod sea_orm_active_enums;
pub mod users;
