//! State store for TuneSweep
//!
//! All pipeline stages communicate exclusively through this embedded
//! SQLite database; each stage can be re-run and resumes from what the
//! store already holds.

mod engine;
mod migrations;
pub mod tables;

pub use engine::Db;
pub use migrations::{get_migration_version, run_migrations};
pub use tables::*;
