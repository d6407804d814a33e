//! TuneSweep - deduplicate and reorganize messy music libraries
//!
//! A five-stage pipeline over a persistent SQLite state store:
//! scan discovers audio files, meta extracts and enriches their
//! metadata, cluster groups files that are the same recording, plan
//! scores each group and picks where the winner should live, and
//! execute materializes the winners with verification. Every stage is
//! a function of the store and can be interrupted and re-run.

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod models;
pub mod utils;

pub use config::Settings;
pub use db::Db;
pub use error::SweepError;
