//! Table operation modules

mod cluster_table;
mod execution_table;
mod file_table;
mod metadata_table;
mod plan_table;

pub use cluster_table::ClusterTable;
pub use execution_table::ExecutionTable;
pub use file_table::{FileTable, UpsertOutcome};
pub use metadata_table::MetadataTable;
pub use plan_table::PlanTable;
