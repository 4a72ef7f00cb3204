//! autopart Library
//!
//! This library provides the automatic partition layout planner used by an
//! unattended Linux installer.

pub mod cli;
pub mod config_file;
pub mod disk;
pub mod engine;
pub mod error;
pub mod partition;
pub mod types;

// Re-export main types for convenience
pub use config_file::{KeepList, PlanOptions, PlanRequest};
pub use disk::{Disk, ExistingPartition, NoShrink, ProbedShrinkOracle, ShrinkEstimate, ShrinkOracle};
pub use error::{PlannerError, Result};
pub use partition::{CryptParams, DesiredPartition, SizePolicy};
pub use types::{DiskLabel, Filesystem, PartitionKind, PlanMode};

// Planner entry point
pub use engine::materialize::{plan_layout, partition_path, Layout, PartitionRecord};
