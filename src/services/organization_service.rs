use crate::{
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    models::owner::{OrganizationContext, Owner},
    services::{bounded, credits_service::CreditsService},
};
use entity::{organization_memberships, prelude::OrganizationMemberships};
use sea_orm::{entity::*, query::*, DatabaseConnection};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Resolves a user's organization and routes organization-scoped credit
/// operations to the organization's own shared balance.
///
/// Only reads membership; it never creates or removes one.
pub struct OrganizationService {
    db: DatabaseConnection,
    credits: Arc<CreditsService>,
    operation_timeout: Duration,
}

impl OrganizationService {
    pub fn new(db: DatabaseConnection, credits: Arc<CreditsService>, config: &LedgerConfig) -> Self {
        Self {
            db,
            credits,
            operation_timeout: config.operation_timeout(),
        }
    }

    /// Current organization state of a user
    #[instrument(skip(self))]
    pub async fn context_for(&self, user_id: Uuid) -> LedgerResult<OrganizationContext> {
        let membership = bounded(self.operation_timeout, async {
            Ok::<_, LedgerError>(OrganizationMemberships::find()
                .filter(organization_memberships::Column::UserId.eq(user_id))
                .filter(organization_memberships::Column::RevokedAt.is_null())
                .one(&self.db)
                .await?)
        })
        .await?;

        let context = match membership {
            Some(membership) => OrganizationContext::HasOrganization(membership.organization_id),
            None => OrganizationContext::NoOrganization,
        };
        debug!(user_id = %user_id, ?context, "Resolved organization context");

        Ok(context)
    }

    pub async fn has_organization(&self, user_id: Uuid) -> LedgerResult<bool> {
        Ok(self.context_for(user_id).await?.has_organization())
    }

    /// Ledger owner of the user's organization
    pub async fn organization_of(&self, user_id: Uuid) -> LedgerResult<Owner> {
        self.context_for(user_id)
            .await?
            .owner()
            .ok_or(LedgerError::NoOrganization(user_id))
    }

    /// Add credits to the shared balance of the user's organization
    #[instrument(skip(self, reason))]
    pub async fn grant_to_organization_of(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<Uuid> {
        let organization = self.organization_of(user_id).await?;
        self.credits.grant(organization, amount, reason).await
    }

    /// Remove credits from the shared balance of the user's organization.
    ///
    /// Members' personal balances are never touched.
    #[instrument(skip(self, reason))]
    pub async fn consume_from_organization_of(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<Uuid> {
        let organization = self.organization_of(user_id).await?;
        self.credits.consume(organization, amount, reason).await
    }

    pub async fn organization_balance_of(&self, user_id: Uuid) -> LedgerResult<i64> {
        let organization = self.organization_of(user_id).await?;
        self.credits.balance_of(organization).await
    }
}
