use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::MigrationError;
use crate::migrate::{run_migration_with_progress, MigrationReport, ProgressCallback};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Which of the two databases an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbRole {
    Source,
    Destination,
}

impl fmt::Display for DbRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbRole::Source => f.write_str("source database"),
            DbRole::Destination => f.write_str("destination database"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{role}: unsupported connection URI {uri:?}, expected a sqlite: URI")]
    UnsupportedScheme { role: DbRole, uri: String },
    #[error("{role}: invalid connection URI")]
    InvalidUri {
        role: DbRole,
        #[source]
        source: sqlx::Error,
    },
    #[error("{role}: unable to initialize the database")]
    Connect {
        role: DbRole,
        #[source]
        source: sqlx::Error,
    },
    #[error("{role}: unable to begin a transaction")]
    Begin {
        role: DbRole,
        #[source]
        source: sqlx::Error,
    },
    #[error("destination database commit failed")]
    Commit(#[source] sqlx::Error),
    #[error("destination database rollback failed")]
    Rollback(#[source] sqlx::Error),
    #[error("database migration failed")]
    Migration(#[from] MigrationError),
}

/// What to do with the destination transaction after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    #[default]
    Commit,
    DryRun,
}

/// Connection options for one side of the migration.
///
/// The source is opened read-only; neither side is created when missing.
pub fn connect_options(role: DbRole, uri: &str) -> Result<SqliteConnectOptions, DbError> {
    if !uri.starts_with("sqlite:") {
        return Err(DbError::UnsupportedScheme {
            role,
            uri: uri.to_string(),
        });
    }
    let opts = SqliteConnectOptions::from_str(uri)
        .map_err(|source| DbError::InvalidUri { role, source })?
        .create_if_missing(false)
        .busy_timeout(BUSY_TIMEOUT)
        .log_statements(log::LevelFilter::Off);

    Ok(match role {
        DbRole::Source => opts.read_only(true),
        DbRole::Destination => opts.foreign_keys(true),
    })
}

/// Opens a connection, retrying transient failures until `timeout` elapses.
pub async fn connect(
    role: DbRole,
    uri: &str,
    timeout: Duration,
) -> Result<SqliteConnection, DbError> {
    let opts = connect_options(role, uri)?;
    let start = Instant::now();
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt: u32 = 1;

    loop {
        match opts.connect().await {
            Ok(conn) => {
                info!(
                    target: "notifications_migrator",
                    event = "db_open",
                    role = %role,
                    attempt
                );
                return Ok(conn);
            }
            Err(err) if is_transient(&err) && start.elapsed() + backoff <= timeout => {
                warn!(
                    target: "notifications_migrator",
                    event = "db_connect_retry",
                    role = %role,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
            Err(source) => return Err(DbError::Connect { role, source }),
        }
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        // SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map_or(false, |code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

/// Runs the migration between two open connections.
///
/// The source transaction only provides a consistent snapshot and is always
/// rolled back. The destination transaction is committed only when every
/// stage succeeded and `mode` is [`CommitMode::Commit`].
pub async fn transfer(
    source: &mut SqliteConnection,
    dest: &mut SqliteConnection,
    mode: CommitMode,
    progress: Option<&ProgressCallback>,
) -> Result<MigrationReport, DbError> {
    let mut source_tx = source.begin().await.map_err(|source| DbError::Begin {
        role: DbRole::Source,
        source,
    })?;
    let mut dest_tx = dest.begin().await.map_err(|source| DbError::Begin {
        role: DbRole::Destination,
        source,
    })?;
    info!(target: "notifications_migrator", event = "db_tx_begin");

    let outcome = run_migration_with_progress(&mut source_tx, &mut dest_tx, progress).await;

    if let Err(err) = source_tx.rollback().await {
        warn!(
            target: "notifications_migrator",
            event = "db_tx_rollback_failed",
            role = %DbRole::Source,
            error = %err
        );
    }

    match (outcome, mode) {
        (Ok(report), CommitMode::Commit) => {
            dest_tx.commit().await.map_err(DbError::Commit)?;
            info!(
                target: "notifications_migrator",
                event = "db_tx_commit",
                users = report.users,
                notification_types = report.notification_types,
                notifications = report.notifications
            );
            Ok(report)
        }
        (Ok(report), CommitMode::DryRun) => {
            dest_tx.rollback().await.map_err(DbError::Rollback)?;
            info!(
                target: "notifications_migrator",
                event = "db_tx_rollback",
                reason = "dry_run"
            );
            Ok(report)
        }
        (Err(err), _) => {
            if let Err(rb) = dest_tx.rollback().await {
                error!(
                    target: "notifications_migrator",
                    event = "db_tx_rollback_failed",
                    role = %DbRole::Destination,
                    error = %rb
                );
            } else {
                warn!(
                    target: "notifications_migrator",
                    event = "db_tx_rollback",
                    reason = "migration_failed"
                );
            }
            Err(err.into())
        }
    }
}
