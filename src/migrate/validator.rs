use sqlx::SqliteConnection;
use tracing::info;

use super::statement::quote_ident;
use crate::error::MigrationError;

/// Fails unless `table` in the destination has no rows.
pub async fn check_empty(
    dest: &mut SqliteConnection,
    table: &'static str,
) -> Result<(), MigrationError> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let rows: i64 = sqlx::query_scalar(&sql)
        .fetch_one(dest)
        .await
        .map_err(MigrationError::query(format!(
            "unable to verify that the destination {table} table is empty"
        )))?;

    info!(
        target: "notifications_migrator",
        event = "table_empty_check",
        table,
        rows
    );

    if rows > 0 {
        return Err(MigrationError::TableNotEmpty { table, rows });
    }
    Ok(())
}
