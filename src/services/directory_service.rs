use crate::error::{LedgerError, LedgerResult};
use entity::{
    organization_memberships, organizations,
    prelude::{OrganizationMemberships, Users},
    users,
};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, TransactionTrait};
use tracing::{info, instrument};
use uuid::Uuid;

/// Users, organizations and memberships backing the credits tool
pub struct DirectoryService {
    db: DatabaseConnection,
}

impl DirectoryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_user(&self, email: &str) -> LedgerResult<users::Model> {
        let existing = Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(LedgerError::Conflict(format!(
                "User with email {} already exists",
                email
            )));
        }

        let user = users::ActiveModel {
            id: Set(Uuid::now_v7()),
            email: Set(email.to_string()),
            created_at: Set(time::OffsetDateTime::now_utc()),
        }
        .insert(&self.db)
        .await?;

        info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    pub async fn find_user(&self, user_id: Uuid) -> LedgerResult<Option<users::Model>> {
        Ok(Users::find_by_id(user_id).one(&self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_organization(&self, name: &str) -> LedgerResult<organizations::Model> {
        let organization = organizations::ActiveModel {
            id: Set(Uuid::now_v7()),
            name: Set(name.to_string()),
            created_at: Set(time::OffsetDateTime::now_utc()),
        }
        .insert(&self.db)
        .await?;

        info!(organization_id = %organization.id, "Created organization");
        Ok(organization)
    }

    /// Attach a user to an organization.
    ///
    /// A user has at most one active membership; a revoked one is reused.
    #[instrument(skip(self))]
    pub async fn add_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> LedgerResult<organization_memberships::Model> {
        let txn = self.db.begin().await?;
        let now = time::OffsetDateTime::now_utc();

        let existing = OrganizationMemberships::find()
            .filter(organization_memberships::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&txn)
            .await?;

        let membership = match existing {
            Some(membership) if membership.revoked_at.is_none() => {
                txn.rollback().await?;
                return Err(LedgerError::Conflict(format!(
                    "User {} already belongs to organization {}",
                    user_id, membership.organization_id
                )));
            }
            Some(membership) => {
                let mut membership_active: organization_memberships::ActiveModel =
                    membership.into();
                membership_active.organization_id = Set(organization_id);
                membership_active.created_at = Set(now);
                membership_active.revoked_at = Set(None);
                membership_active.update(&txn).await?
            }
            None => {
                organization_memberships::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    user_id: Set(user_id),
                    organization_id: Set(organization_id),
                    created_at: Set(now),
                    revoked_at: Set(None),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;

        info!(
            user_id = %user_id,
            organization_id = %organization_id,
            "Added organization membership"
        );
        Ok(membership)
    }

    /// Revoke the user's active membership. Returns false when there was none.
    #[instrument(skip(self))]
    pub async fn revoke_membership(&self, user_id: Uuid) -> LedgerResult<bool> {
        let result = OrganizationMemberships::update_many()
            .col_expr(
                organization_memberships::Column::RevokedAt,
                Expr::value(Some(time::OffsetDateTime::now_utc())),
            )
            .filter(organization_memberships::Column::UserId.eq(user_id))
            .filter(organization_memberships::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
