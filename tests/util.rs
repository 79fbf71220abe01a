#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::path::Path;

use serde_json::json;
use sqlx::{Connection, SqliteConnection};

pub const LEGACY_SCHEMA: &str = include_str!("fixtures/legacy_schema.sql");
pub const DESTINATION_SCHEMA: &str = include_str!("fixtures/destination_schema.sql");

pub async fn memory_db(schema: &str) -> SqliteConnection {
    let mut conn = SqliteConnection::connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::raw_sql(schema)
        .execute(&mut conn)
        .await
        .expect("apply schema");
    conn
}

/// Creates `name` under `dir` with `schema` applied and returns its URI.
pub async fn file_db(dir: &Path, name: &str, schema: &str) -> String {
    let path = dir.join(name);
    let mut conn = SqliteConnection::connect(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .expect("create sqlite file");
    sqlx::raw_sql(schema)
        .execute(&mut conn)
        .await
        .expect("apply schema");
    conn.close().await.expect("close sqlite file");
    format!("sqlite://{}", path.display())
}

pub async fn open(uri: &str) -> SqliteConnection {
    SqliteConnection::connect(uri).await.expect("open sqlite file")
}

pub async fn seed_user(conn: &mut SqliteConnection, username: &str) -> i64 {
    sqlx::query("INSERT INTO users (username) VALUES (?1)")
        .bind(username)
        .execute(conn)
        .await
        .expect("insert legacy user")
        .last_insert_rowid()
}

#[derive(Debug, Clone)]
pub struct LegacyNotification {
    pub uuid: String,
    pub kind: String,
    pub user_id: i64,
    pub subject: Option<String>,
    pub seen: bool,
    pub deleted: bool,
    pub date_created: String,
    pub message: String,
}

impl LegacyNotification {
    pub fn new(uuid: &str, kind: &str, user_id: i64, date_created: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            kind: kind.to_string(),
            user_id,
            subject: Some(format!("subject of {uuid}")),
            seen: false,
            deleted: false,
            date_created: date_created.to_string(),
            message: json!({ "message": { "text": format!("body of {uuid}") } }).to_string(),
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }
}

pub async fn seed_notification(conn: &mut SqliteConnection, n: &LegacyNotification) {
    sqlx::query(
        "INSERT INTO notifications (uuid, type, user_id, subject, seen, deleted, date_created, message) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&n.uuid)
    .bind(&n.kind)
    .bind(n.user_id)
    .bind(&n.subject)
    .bind(n.seen)
    .bind(n.deleted)
    .bind(&n.date_created)
    .bind(&n.message)
    .execute(conn)
    .await
    .expect("insert legacy notification");
}

pub async fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(conn)
        .await
        .expect("count rows")
}
