use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_stock_movements_table::Migration),
            Box::new(m20240101_000003_create_stock_alerts_table::Migration),
        ]
    }
}

mod m20240101_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string_len(255).not_null())
                        .col(
                            ColumnDef::new(Products::Sku)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Products::Stock).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Products::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(10),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Sku,
        Description,
        Price,
        Stock,
        LowStockThreshold,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_movements_table {
    use super::m20240101_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::StockAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).text().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_product_id")
                                .from(StockMovements::Table, StockMovements::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_product_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        ProductId,
        MovementType,
        Quantity,
        StockAfter,
        Reason,
        CreatedAt,
    }
}

mod m20240101_000003_create_stock_alerts_table {
    use super::m20240101_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_alerts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAlerts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAlerts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockAlerts::ProductId).integer().not_null())
                        .col(ColumnDef::new(StockAlerts::Stock).integer().not_null())
                        .col(ColumnDef::new(StockAlerts::Threshold).integer().not_null())
                        .col(
                            ColumnDef::new(StockAlerts::Resolved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StockAlerts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_alerts_product_id")
                                .from(StockAlerts::Table, StockAlerts::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_alerts_product_id")
                        .table(StockAlerts::Table)
                        .col(StockAlerts::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_alerts_resolved")
                        .table(StockAlerts::Table)
                        .col(StockAlerts::Resolved)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockAlerts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockAlerts {
        Table,
        Id,
        ProductId,
        Stock,
        Threshold,
        Resolved,
        CreatedAt,
    }
}
