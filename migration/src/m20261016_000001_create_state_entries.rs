use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Single key/value table backing every persisted record:
        // community/<id>, modules/<course_id>, subscribers/<course_id>
        manager
            .create_table(
                Table::create()
                    .table(StateEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StateEntries::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StateEntries::Value).json().not_null())
                    .col(
                        ColumnDef::new(StateEntries::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StateEntries::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum StateEntries {
    Table,
    Key,
    Value,
    UpdatedAt,
}
