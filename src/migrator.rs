use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_return_requests_table::Migration),
            Box::new(m20240101_000002_create_return_status_changes_table::Migration),
        ]
    }
}

mod m20240101_000001_create_return_requests_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_return_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReturnRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::OrderId).string().not_null())
                        .col(ColumnDef::new(ReturnRequests::Email).string().not_null())
                        .col(ColumnDef::new(ReturnRequests::Reason).text().not_null())
                        .col(ColumnDef::new(ReturnRequests::Status).string().not_null())
                        .col(
                            ColumnDef::new(ReturnRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Status lookup goes by order id, listings go by creation order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_requests_order_id")
                        .table(ReturnRequests::Table)
                        .col(ReturnRequests::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_requests_created_at")
                        .table(ReturnRequests::Table)
                        .col(ReturnRequests::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum ReturnRequests {
        Table,
        Id,
        OrderId,
        Email,
        Reason,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_return_status_changes_table {
    use super::m20240101_000001_create_return_requests_table::ReturnRequests;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_return_status_changes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReturnStatusChanges::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnStatusChanges::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnStatusChanges::ReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnStatusChanges::FromStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnStatusChanges::ToStatus)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnStatusChanges::ChangedBy).string().null())
                        .col(ColumnDef::new(ReturnStatusChanges::Note).text().null())
                        .col(
                            ColumnDef::new(ReturnStatusChanges::ChangedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_status_changes_return_id")
                                .from(ReturnStatusChanges::Table, ReturnStatusChanges::ReturnId)
                                .to(ReturnRequests::Table, ReturnRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_return_status_changes_return_id")
                        .table(ReturnStatusChanges::Table)
                        .col(ReturnStatusChanges::ReturnId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnStatusChanges::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReturnStatusChanges {
        Table,
        Id,
        ReturnId,
        FromStatus,
        ToStatus,
        ChangedBy,
        Note,
        ChangedAt,
    }
}
