// Service modules
pub mod balance_aggregator;
pub mod credits_service;
pub mod directory_service;
pub mod ledger_store;
pub mod organization_service;

pub use balance_aggregator::BalanceAggregator;
pub use credits_service::CreditsService;
pub use directory_service::DirectoryService;
pub use ledger_store::LedgerStore;
pub use organization_service::OrganizationService;

use crate::error::{LedgerResult, StorageFailure};
use std::{future::Future, time::Duration};

/// Run a storage operation with an upper time bound.
///
/// On expiry the future is dropped, which rolls back any open transaction.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: F) -> LedgerResult<T>
where
    F: Future<Output = LedgerResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Ledger operation timed out");
            Err(StorageFailure::Timeout(limit).into())
        }
    }
}
