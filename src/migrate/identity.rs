use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::info;

use crate::error::MigrationError;

/// Natural key to destination identity, scoped to a single run.
#[derive(Debug, Clone)]
pub struct IdentityMap {
    kind: &'static str,
    ids: HashMap<String, String>,
}

impl IdentityMap {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            ids: HashMap::new(),
        }
    }

    /// What the keys name ("user", "notification type"); used in errors.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn insert(&mut self, key: impl Into<String>, id: impl Into<String>) {
        self.ids.insert(key.into(), id.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    /// Looks up `key` on behalf of notification `notification_id`.
    pub fn resolve(&self, notification_id: &str, key: &str) -> Result<&str, MigrationError> {
        self.get(key)
            .ok_or_else(|| MigrationError::UnresolvedReference {
                id: notification_id.to_string(),
                kind: self.kind,
                key: key.to_string(),
            })
    }
}

/// Username to destination user identity.
pub async fn load_user_ids(dest: &mut SqliteConnection) -> Result<IdentityMap, MigrationError> {
    load(
        dest,
        "user",
        "SELECT CAST(id AS TEXT), username FROM users",
        "unable to load the user ID map",
    )
    .await
}

/// Normalized type name to destination notification type identity.
pub async fn load_notification_type_ids(
    dest: &mut SqliteConnection,
) -> Result<IdentityMap, MigrationError> {
    load(
        dest,
        "notification type",
        "SELECT CAST(id AS TEXT), name FROM notification_types",
        "unable to load the notification type ID map",
    )
    .await
}

async fn load(
    dest: &mut SqliteConnection,
    kind: &'static str,
    sql: &'static str,
    operation: &'static str,
) -> Result<IdentityMap, MigrationError> {
    let rows: Vec<(String, String)> = sqlx::query_as(sql)
        .fetch_all(dest)
        .await
        .map_err(MigrationError::query(operation))?;

    let mut map = IdentityMap::new(kind);
    for (id, key) in rows {
        map.insert(key, id);
    }

    info!(
        target: "notifications_migrator",
        event = "identity_map_loaded",
        kind,
        entries = map.len()
    );
    Ok(map)
}
