pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_users_table;
mod m20240101_000002_create_customers_table;
mod m20240101_000003_create_products_table;
mod m20240101_000004_create_sale_orders_table;
mod m20240101_000005_create_order_items_table;
mod m20240101_000006_create_order_status_history_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_customers_table::Migration),
            Box::new(m20240101_000003_create_products_table::Migration),
            Box::new(m20240101_000004_create_sale_orders_table::Migration),
            Box::new(m20240101_000005_create_order_items_table::Migration),
            Box::new(m20240101_000006_create_order_status_history_table::Migration),
        ]
    }
}

/// Money and rate columns. SQLite has no exact decimal storage, so those
/// columns are declared REAL there and NUMERIC(precision, scale) elsewhere.
pub(crate) fn decimal_column<T>(manager: &SchemaManager, column: T, precision: u32, scale: u32) -> ColumnDef
where
    T: IntoIden,
{
    let mut def = ColumnDef::new(column);
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Sqlite => {
            def.double();
        }
        _ => {
            def.decimal_len(precision, scale);
        }
    }
    def.not_null();
    def
}
