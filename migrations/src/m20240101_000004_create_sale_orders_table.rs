use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users_table::Users;
use super::m20240101_000002_create_customers_table::Customers;
use crate::decimal_column;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240101_000004_create_sale_orders_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SaleOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SaleOrders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SaleOrders::OrderNumber)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SaleOrders::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(SaleOrders::SalespersonId).uuid().not_null())
                    .col(ColumnDef::new(SaleOrders::ManagerId).uuid().null())
                    .col(ColumnDef::new(SaleOrders::WarehouseId).uuid().null())
                    .col(
                        ColumnDef::new(SaleOrders::Status)
                            .string_len(32)
                            .not_null()
                            .default("draft"),
                    )
                    .col(&mut decimal_column(manager, SaleOrders::Subtotal, 14, 2))
                    .col(&mut decimal_column(manager, SaleOrders::TaxRate, 5, 4))
                    .col(&mut decimal_column(manager, SaleOrders::TaxAmount, 14, 2))
                    .col(&mut decimal_column(manager, SaleOrders::Total, 14, 2))
                    .col(ColumnDef::new(SaleOrders::Notes).text().null())
                    .col(ColumnDef::new(SaleOrders::RejectionReason).text().null())
                    .col(
                        ColumnDef::new(SaleOrders::SubmittedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SaleOrders::ApprovedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SaleOrders::RejectedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SaleOrders::FulfilledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SaleOrders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SaleOrders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sale_orders_customer_id")
                            .from(SaleOrders::Table, SaleOrders::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sale_orders_salesperson_id")
                            .from(SaleOrders::Table, SaleOrders::SalespersonId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sale_orders_status")
                    .table(SaleOrders::Table)
                    .col(SaleOrders::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sale_orders_salesperson_id")
                    .table(SaleOrders::Table)
                    .col(SaleOrders::SalespersonId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SaleOrders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SaleOrders {
    Table,
    Id,
    OrderNumber,
    CustomerId,
    SalespersonId,
    ManagerId,
    WarehouseId,
    Status,
    Subtotal,
    TaxRate,
    TaxAmount,
    Total,
    Notes,
    RejectionReason,
    SubmittedAt,
    ApprovedAt,
    RejectedAt,
    FulfilledAt,
    CreatedAt,
    UpdatedAt,
}
