//! Lock table identifiers and bootstrap
//!
//! The table is created lazily, once, by the store; its name is
//! configurable so several applications can share one database without
//! sharing a lock namespace.

use sea_orm::sea_query::{Alias, ColumnDef, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, DeriveIden};

use crate::error::Result;

/// Table name used when the caller does not configure one
pub const DEFAULT_TABLE_NAME: &str = "verrou";

/// Columns of the lock table
#[derive(DeriveIden)]
pub(crate) enum LockColumn {
    Key,
    Owner,
    Expiration,
}

pub(crate) fn table_statement(table_name: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(table_name))
        .if_not_exists()
        .col(
            ColumnDef::new(LockColumn::Key)
                .string_len(255)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(LockColumn::Owner).string().not_null())
        .col(ColumnDef::new(LockColumn::Expiration).big_integer().null())
        .to_owned()
}

/// Create the lock table if it doesn't exist
pub(crate) async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    table_name: &str,
) -> Result<()> {
    let stmt = table_statement(table_name);
    db.execute(db.get_database_backend().build(&stmt)).await?;
    tracing::debug!(table = table_name, "lock table ready");
    Ok(())
}
