pub use super::credit_balances::Entity as CreditBalances;
pub use super::credit_transactions::Entity as CreditTransactions;
pub use super::organization_memberships::Entity as OrganizationMemberships;
pub use super::organizations::Entity as Organizations;
pub use super::users::Entity as Users;
