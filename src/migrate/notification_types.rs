use std::collections::BTreeSet;

use sqlx::SqliteConnection;

use super::statement::BulkInsert;
use super::validator::check_empty;
use crate::error::MigrationError;

/// Natural key of a notification type.
///
/// Shared by the type stage and the notification stage so both agree on the
/// key independently of the database's `lower()` (ASCII-only in SQLite).
pub fn normalize_type_name(raw: &str) -> String {
    raw.to_lowercase()
}

/// Promotes the distinct notification type strings found in the source into
/// rows of the destination `notification_types` table.
pub async fn migrate_notification_types(
    source: &mut SqliteConnection,
    dest: &mut SqliteConnection,
) -> Result<u64, MigrationError> {
    check_empty(dest, "notification_types").await?;

    let raw: Vec<String> = sqlx::query_scalar("SELECT DISTINCT type FROM notifications")
        .fetch_all(&mut *source)
        .await
        .map_err(MigrationError::query(
            "unable to read notification types from the source database",
        ))?;

    let names: BTreeSet<String> = raw.iter().map(|t| normalize_type_name(t)).collect();

    let mut insert = BulkInsert::new("notification_types", &["name"]);
    for name in names {
        insert.push_row([name]);
    }

    insert
        .execute(dest)
        .await
        .map_err(MigrationError::query(
            "unable to insert notification types into the destination database",
        ))
}
