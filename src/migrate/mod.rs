//! Three-stage copy of users, notification types and notifications.
//!
//! Stages run strictly in order against the caller's transactions: users,
//! then notification types, then notifications. Each stage first checks that
//! its destination table is empty. Notifications resolve their user and type
//! through identity maps read back from the destination after the first two
//! stages, so nothing here depends on source identities for those tables.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::info;

use crate::error::{MigrationError, Stage};

pub mod identity;
pub mod notification_types;
pub mod notifications;
pub mod payload;
mod statement;
pub mod users;
pub mod validator;

pub use identity::IdentityMap;
pub use notifications::{NotificationRecord, SourceNotification};
pub use payload::{rewrite_outgoing, PayloadError};

/// Rows written to each destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub users: u64,
    pub notification_types: u64,
    pub notifications: u64,
}

impl MigrationReport {
    fn record(&mut self, stage: Stage, rows: u64) {
        match stage {
            Stage::Users => self.users = rows,
            Stage::NotificationTypes => self.notification_types = rows,
            Stage::Notifications => self.notifications = rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Started(Stage),
    Finished { stage: Stage, rows: u64 },
}

pub type ProgressCallback = Arc<dyn Fn(StageEvent) + Send + Sync>;

/// Runs every stage against the two open transactions.
///
/// Neither transaction is committed or rolled back here.
pub async fn run_migration(
    source: &mut Transaction<'_, Sqlite>,
    dest: &mut Transaction<'_, Sqlite>,
) -> Result<MigrationReport, MigrationError> {
    run_migration_with_progress(source, dest, None).await
}

pub async fn run_migration_with_progress(
    source: &mut Transaction<'_, Sqlite>,
    dest: &mut Transaction<'_, Sqlite>,
    progress: Option<&ProgressCallback>,
) -> Result<MigrationReport, MigrationError> {
    let source = source.as_mut();
    let dest = dest.as_mut();
    let mut report = MigrationReport::default();

    for stage in Stage::ALL {
        if let Some(cb) = progress {
            cb(StageEvent::Started(stage));
        }
        info!(
            target: "notifications_migrator",
            event = "stage_start",
            stage = stage.table()
        );
        let start = Instant::now();

        let rows = run_stage(stage, source, dest)
            .await
            .map_err(|err| err.in_stage(stage))?;
        report.record(stage, rows);

        info!(
            target: "notifications_migrator",
            event = "stage_done",
            stage = stage.table(),
            rows,
            duration_ms = start.elapsed().as_millis() as u64
        );
        if let Some(cb) = progress {
            cb(StageEvent::Finished { stage, rows });
        }
    }

    Ok(report)
}

async fn run_stage(
    stage: Stage,
    source: &mut SqliteConnection,
    dest: &mut SqliteConnection,
) -> Result<u64, MigrationError> {
    match stage {
        Stage::Users => users::migrate_users(source, dest).await,
        Stage::NotificationTypes => {
            notification_types::migrate_notification_types(source, dest).await
        }
        Stage::Notifications => notifications::migrate_notifications(source, dest).await,
    }
}
