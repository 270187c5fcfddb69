use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only transaction log (source of truth for balances).
        // owner_id is polymorphic over users and organizations, so no foreign key.
        manager
            .create_table(
                Table::create()
                    .table(CreditTransactions::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditTransactions::Id))
                    .col(string_len(CreditTransactions::OwnerKind, 16))
                    .col(uuid(CreditTransactions::OwnerId))
                    .col(big_integer(CreditTransactions::Sequence))
                    .col(big_integer(CreditTransactions::Amount))
                    .col(text_null(CreditTransactions::Reason))
                    .col(timestamp_with_time_zone(CreditTransactions::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Append order per owner; also rejects two writers claiming the same slot
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_transactions_owner_sequence")
                    .table(CreditTransactions::Table)
                    .col(CreditTransactions::OwnerKind)
                    .col(CreditTransactions::OwnerId)
                    .col(CreditTransactions::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Materialized running balance, one row per owner
        manager
            .create_table(
                Table::create()
                    .table(CreditBalances::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditBalances::Id))
                    .col(string_len(CreditBalances::OwnerKind, 16))
                    .col(uuid(CreditBalances::OwnerId))
                    .col(big_integer(CreditBalances::UnspentCredits).default(0))
                    .col(big_integer(CreditBalances::LastSequence).default(0))
                    .col(uuid_null(CreditBalances::LastTransactionId))
                    .col(timestamp_with_time_zone(CreditBalances::CreatedAt))
                    .col(timestamp_with_time_zone(CreditBalances::UpdatedAt))
                    .check(Expr::col(CreditBalances::UnspentCredits).gte(0))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credit_balances_owner")
                    .table(CreditBalances::Table)
                    .col(CreditBalances::OwnerKind)
                    .col(CreditBalances::OwnerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CreditTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CreditTransactions {
    Table,
    Id,
    OwnerKind,
    OwnerId,
    Sequence,
    Amount,
    Reason,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CreditBalances {
    Table,
    Id,
    OwnerKind,
    OwnerId,
    UnspentCredits,
    LastSequence,
    LastTransactionId,
    CreatedAt,
    UpdatedAt,
}
