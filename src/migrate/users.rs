use sqlx::SqliteConnection;

use super::statement::BulkInsert;
use super::validator::check_empty;
use crate::error::MigrationError;

/// Copies every source username into the destination `users` table.
///
/// Usernames are unique in the source, so no further de-duplication happens
/// here. Destination identities are assigned by the destination on insert.
pub async fn migrate_users(
    source: &mut SqliteConnection,
    dest: &mut SqliteConnection,
) -> Result<u64, MigrationError> {
    check_empty(dest, "users").await?;

    let usernames: Vec<String> =
        sqlx::query_scalar("SELECT username FROM users ORDER BY username")
            .fetch_all(&mut *source)
            .await
            .map_err(MigrationError::query(
                "unable to read usernames from the source database",
            ))?;

    let mut insert = BulkInsert::new("users", &["username"]);
    for username in usernames {
        insert.push_row([username]);
    }

    insert
        .execute(dest)
        .await
        .map_err(MigrationError::query(
            "unable to insert users into the destination database",
        ))
}
