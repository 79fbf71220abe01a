use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::identity::{load_notification_type_ids, load_user_ids, IdentityMap};
use super::notification_types::normalize_type_name;
use super::payload::rewrite_outgoing;
use super::validator::check_empty;
use crate::error::MigrationError;

const PROGRESS_EVERY: u64 = 1_000;

// date_created is RFC 3339 text with mixed offsets and precision, so rows are
// ordered by the instant it names. Ties are broken by uuid so reruns insert in
// the same order. The LEFT JOIN keeps notifications whose user row is missing
// so they fail in `transform` instead of being skipped.
const SOURCE_QUERY: &str = "\
SELECT n.uuid, n.type, n.user_id, u.username, n.subject, n.seen, n.deleted, n.date_created, n.message \
FROM notifications n \
LEFT JOIN users u ON n.user_id = u.id \
ORDER BY julianday(n.date_created), n.uuid";

const INSERT_SQL: &str = "\
INSERT INTO notifications (\
id, notification_type_id, user_id, subject, seen, deleted, time_created, incoming_json, outgoing_json\
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

/// A notification as read from the legacy store.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNotification {
    pub id: String,
    /// Already normalized with [`normalize_type_name`].
    pub notification_type: String,
    pub legacy_user_id: i64,
    /// `None` when the legacy user row is missing.
    pub username: Option<String>,
    pub subject: Option<String>,
    pub seen: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

impl SourceNotification {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let raw_type: String = row.try_get("type")?;
        Ok(Self {
            id: row.try_get("uuid")?,
            notification_type: normalize_type_name(&raw_type),
            legacy_user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            subject: row.try_get("subject")?,
            seen: row.try_get("seen")?,
            deleted: row.try_get("deleted")?,
            created_at: row.try_get("date_created")?,
            message: row.try_get("message")?,
        })
    }
}

/// A row ready for the destination `notifications` table.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    pub notification_type_id: String,
    pub user_id: String,
    pub subject: Option<String>,
    pub seen: bool,
    pub deleted: bool,
    pub time_created: DateTime<Utc>,
    pub incoming_json: String,
    pub outgoing_json: String,
}

/// Resolves foreign keys and rewrites the payload of one notification.
pub fn transform(
    notification: SourceNotification,
    types: &IdentityMap,
    users: &IdentityMap,
) -> Result<NotificationRecord, MigrationError> {
    let notification_type_id = types
        .resolve(&notification.id, &notification.notification_type)?
        .to_string();
    let username = notification.username.as_deref().ok_or_else(|| {
        MigrationError::UnresolvedReference {
            id: notification.id.clone(),
            kind: "legacy user id",
            key: notification.legacy_user_id.to_string(),
        }
    })?;
    let user_id = users.resolve(&notification.id, username)?.to_string();

    let outgoing_json = rewrite_outgoing(&notification.message, &notification.id).map_err(
        |source| MigrationError::Payload {
            id: notification.id.clone(),
            source,
        },
    )?;

    Ok(NotificationRecord {
        id: notification.id,
        notification_type_id,
        user_id,
        subject: notification.subject,
        seen: notification.seen,
        deleted: notification.deleted,
        time_created: notification.created_at,
        incoming_json: notification.message,
        outgoing_json,
    })
}

async fn insert(
    dest: &mut SqliteConnection,
    record: &NotificationRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(INSERT_SQL)
        .bind(&record.id)
        .bind(&record.notification_type_id)
        .bind(&record.user_id)
        .bind(&record.subject)
        .bind(record.seen)
        .bind(record.deleted)
        .bind(record.time_created)
        .bind(&record.incoming_json)
        .bind(&record.outgoing_json)
        .execute(dest)
        .await?;
    Ok(())
}

/// Streams source notifications oldest first and inserts them one at a time.
///
/// Must run after users and notification types have been migrated in the same
/// destination transaction: the identity maps are read back from `dest`.
pub async fn migrate_notifications(
    source: &mut SqliteConnection,
    dest: &mut SqliteConnection,
) -> Result<u64, MigrationError> {
    check_empty(dest, "notifications").await?;

    let types = load_notification_type_ids(dest).await?;
    let users = load_user_ids(dest).await?;

    let mut rows = sqlx::query(SOURCE_QUERY).fetch(&mut *source);
    let mut inserted: u64 = 0;

    while let Some(row) = rows.try_next().await.map_err(MigrationError::query(
        "unable to read notifications from the source database",
    ))? {
        let notification = SourceNotification::from_row(&row).map_err(MigrationError::query(
            "unable to decode a notification from the source database",
        ))?;
        let record = transform(notification, &types, &users)?;

        insert(dest, &record)
            .await
            .map_err(|source| MigrationError::Query {
                operation: format!(
                    "unable to insert notification {} into the destination database",
                    record.id
                ),
                source,
            })?;

        debug!(
            target: "notifications_migrator",
            event = "notification_rewritten",
            id = %record.id,
            time_created = %record.time_created
        );

        inserted += 1;
        if inserted % PROGRESS_EVERY == 0 {
            info!(
                target: "notifications_migrator",
                event = "notification_progress",
                inserted
            );
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn maps() -> (IdentityMap, IdentityMap) {
        let mut types = IdentityMap::new("notification type");
        types.insert("info", "t-1");
        let mut users = IdentityMap::new("user");
        users.insert("alice", "u-1");
        (types, users)
    }

    fn sample() -> SourceNotification {
        SourceNotification {
            id: "abc-123".into(),
            notification_type: "info".into(),
            legacy_user_id: 1,
            username: Some("alice".into()),
            subject: Some("hello".into()),
            seen: false,
            deleted: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            message: r#"{"message":{"text":"hi"}}"#.into(),
        }
    }

    #[test]
    fn transform_resolves_keys_and_rewrites_payload() {
        let (types, users) = maps();
        let record = transform(sample(), &types, &users).unwrap();

        assert_eq!(record.id, "abc-123");
        assert_eq!(record.notification_type_id, "t-1");
        assert_eq!(record.user_id, "u-1");
        assert!(record.deleted);
        assert!(!record.seen);
        assert_eq!(record.incoming_json, r#"{"message":{"text":"hi"}}"#);
        assert_eq!(
            record.outgoing_json,
            r#"{"message":{"text":"hi","id":"abc-123"}}"#
        );
    }

    #[test]
    fn transform_reports_unknown_user() {
        let (types, users) = maps();
        let mut notification = sample();
        notification.username = Some("mallory".into());

        let err = transform(notification, &types, &users).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::UnresolvedReference { kind: "user", ref key, .. } if key == "mallory"
        ));
    }

    #[test]
    fn transform_reports_missing_legacy_user() {
        let (types, users) = maps();
        let mut notification = sample();
        notification.legacy_user_id = 42;
        notification.username = None;

        let err = transform(notification, &types, &users).unwrap_err();
        assert_eq!(
            err.to_string(),
            "notification abc-123 references unknown legacy user id \"42\""
        );
    }

    #[test]
    fn transform_reports_unknown_type() {
        let (types, users) = maps();
        let mut notification = sample();
        notification.notification_type = "analysis".into();

        let err = transform(notification, &types, &users).unwrap_err();
        assert_eq!(
            err.to_string(),
            "notification abc-123 references unknown notification type \"analysis\""
        );
    }

    #[test]
    fn transform_names_record_with_bad_payload() {
        let (types, users) = maps();
        let mut notification = sample();
        notification.message = r#"{"message":[1]}"#.into();

        let err = transform(notification, &types, &users).unwrap_err();
        let rendered = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(
            rendered,
            "notification abc-123 has an unusable message payload: \
             \"message\" field is a JSON array, expected an object"
        );
    }
}
