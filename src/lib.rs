//! Moves users, notification types and notifications from the legacy
//! notifications database into the reshaped destination schema.
//!
//! [`run_migration`] is the core: it takes two open transactions and either
//! populates the destination tables or fails with a stage-scoped error.
//! [`db::transfer`] wraps it with the transaction lifecycle used by the
//! command-line tool.

pub mod db;
pub mod error;
pub mod logging;
pub mod migrate;

pub use db::{connect, transfer, CommitMode, DbError, DbRole};
pub use error::{MigrationError, Stage};
pub use migrate::{
    run_migration, run_migration_with_progress, MigrationReport, ProgressCallback, StageEvent,
};
