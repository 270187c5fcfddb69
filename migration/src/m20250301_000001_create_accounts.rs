use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Users are the personal credit owners
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_uuid(Users::Id))
                    .col(string(Users::Email).unique_key())
                    .col(timestamp_with_time_zone(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(pk_uuid(Organizations::Id))
                    .col(string(Organizations::Name))
                    .col(timestamp_with_time_zone(Organizations::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // A user belongs to zero or one organization
        manager
            .create_table(
                Table::create()
                    .table(OrganizationMemberships::Table)
                    .if_not_exists()
                    .col(pk_uuid(OrganizationMemberships::Id))
                    .col(uuid(OrganizationMemberships::UserId).unique_key())
                    .col(uuid(OrganizationMemberships::OrganizationId))
                    .col(timestamp_with_time_zone(OrganizationMemberships::CreatedAt))
                    .col(timestamp_with_time_zone_null(
                        OrganizationMemberships::RevokedAt,
                    ))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organization_memberships_user_id")
                            .from(
                                OrganizationMemberships::Table,
                                OrganizationMemberships::UserId,
                            )
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organization_memberships_organization_id")
                            .from(
                                OrganizationMemberships::Table,
                                OrganizationMemberships::OrganizationId,
                            )
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_organization_memberships_organization_id")
                    .table(OrganizationMemberships::Table)
                    .col(OrganizationMemberships::OrganizationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(OrganizationMemberships::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OrganizationMemberships {
    Table,
    Id,
    UserId,
    OrganizationId,
    CreatedAt,
    RevokedAt,
}
