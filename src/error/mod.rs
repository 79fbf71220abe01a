use std::fmt;

use thiserror::Error;

use crate::migrate::payload::PayloadError;

/// One of the three ordered migration steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Users,
    NotificationTypes,
    Notifications,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Users, Stage::NotificationTypes, Stage::Notifications];

    /// Destination table written by this stage.
    pub fn table(self) -> &'static str {
        match self {
            Stage::Users => "users",
            Stage::NotificationTypes => "notification_types",
            Stage::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Users => "user",
            Stage::NotificationTypes => "notification type",
            Stage::Notifications => "notification",
        };
        f.write_str(label)
    }
}

/// Failures raised by the migration core.
///
/// Each variant describes only its own layer; the underlying cause is exposed
/// through `source()` so callers can render the whole chain (`{:#}` on an
/// `anyhow::Error`).
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("the destination {table} table is not empty (row count: {rows})")]
    TableNotEmpty { table: &'static str, rows: i64 },
    #[error("{operation}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("notification {id} has an unusable message payload")]
    Payload {
        id: String,
        #[source]
        source: PayloadError,
    },
    #[error("notification {id} references unknown {kind} {key:?}")]
    UnresolvedReference {
        id: String,
        kind: &'static str,
        key: String,
    },
    #[error("{stage} migration failed")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<MigrationError>,
    },
}

impl MigrationError {
    pub(crate) fn query(
        operation: impl Into<String>,
    ) -> impl FnOnce(sqlx::Error) -> MigrationError {
        let operation = operation.into();
        move |source| MigrationError::Query { operation, source }
    }

    pub(crate) fn in_stage(self, stage: Stage) -> MigrationError {
        MigrationError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Stage that failed, when the error has been wrapped by the orchestrator.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MigrationError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost migration error, skipping stage wrappers.
    pub fn root(&self) -> &MigrationError {
        match self {
            MigrationError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}
