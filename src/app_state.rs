use crate::{
    config::Config,
    services::{CreditsService, DirectoryService, OrganizationService},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub credits_service: Arc<CreditsService>,
    pub organization_service: Arc<OrganizationService>,
    pub directory_service: Arc<DirectoryService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database; acquiring a connection is bounded like every ledger operation
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_millis(config.database.acquire_timeout_ms))
            .sqlx_logging(false);
        let db = Database::connect(options).await?;

        if config.database.run_migrations {
            Migrator::up(&db, None).await?;
            tracing::info!("Applied pending migrations");
        }

        Ok(Self::with_connection(db, config))
    }

    /// Wire services onto an existing connection
    pub fn with_connection(db: DatabaseConnection, config: Config) -> Self {
        let credits_service = Arc::new(CreditsService::new(db.clone(), &config.ledger));
        let organization_service = Arc::new(OrganizationService::new(
            db.clone(),
            credits_service.clone(),
            &config.ledger,
        ));
        let directory_service = Arc::new(DirectoryService::new(db.clone()));

        Self {
            db,
            credits_service,
            organization_service,
            directory_service,
            config: Arc::new(config),
        }
    }
}
