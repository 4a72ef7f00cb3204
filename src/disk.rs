//! Probed disk descriptions
//!
//! A `Disk` is what the hardware prober hands the planner: geometry,
//! partition-table capabilities and the existing layout. Everything is in
//! cylinders; `cylinder_size` converts back to bytes.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::types::{fsid, DiskLabel, Filesystem, PartitionKind};

/// Free-space estimate for a FAT/NTFS partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkEstimate {
    /// Bytes currently occupied by data
    pub used_bytes: u64,
    /// Size the partition can be shrunk to
    pub proposed_bytes: u64,
}

/// A partition already present on a disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingPartition {
    pub number: u32,
    /// First cylinder
    pub start: u64,
    /// Length in cylinders
    pub length: u64,
    pub fsid: u32,
    #[serde(default)]
    pub kind: PartitionKind,
    #[serde(default)]
    pub filesystem: Option<Filesystem>,
    /// Marked for deletion by a previous step
    #[serde(default)]
    pub delete: bool,
    /// Shrink estimate attached by the prober, consumed by `ProbedShrinkOracle`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrink: Option<ShrinkEstimate>,
}

impl ExistingPartition {
    /// Create a primary partition with the given geometry and ID
    pub fn new(number: u32, start: u64, length: u64, fsid: u32) -> Self {
        Self {
            number,
            start,
            length,
            fsid,
            kind: PartitionKind::Primary,
            filesystem: None,
            delete: false,
            shrink: None,
        }
    }

    /// Builder: set the partition role
    pub fn with_kind(mut self, kind: PartitionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: set the detected filesystem
    pub fn with_filesystem(mut self, filesystem: Filesystem) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    /// Builder: attach a shrink estimate
    pub fn with_shrink(mut self, estimate: ShrinkEstimate) -> Self {
        self.shrink = Some(estimate);
        self
    }

    /// Last cylinder (inclusive)
    pub fn end(&self) -> u64 {
        self.start + self.length.saturating_sub(1)
    }

    pub fn is_extended(&self) -> bool {
        self.kind == PartitionKind::Extended || fsid::is_extended(self.fsid)
    }
}

/// A physical disk and its partition-table capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Device path, e.g. `/dev/sda`
    pub device: String,
    /// Bytes per cylinder
    pub cylinder_size: u64,
    /// Total cylinders
    pub cylinders: u64,
    #[serde(default)]
    pub label: DiskLabel,
    pub max_primary: u32,
    pub max_logical: u32,
    pub extended_supported: bool,
    #[serde(default)]
    pub partitions: Vec<ExistingPartition>,
}

impl Disk {
    /// Create an empty disk, taking slot limits from the label
    pub fn new(device: impl Into<String>, label: DiskLabel, cylinder_size: u64, cylinders: u64) -> Self {
        Self {
            device: device.into(),
            cylinder_size,
            cylinders,
            label,
            max_primary: label.max_primary(),
            max_logical: label.max_logical(),
            extended_supported: label.has_extended(),
            partitions: Vec::new(),
        }
    }

    /// Builder: add an existing partition
    pub fn with_partition(mut self, partition: ExistingPartition) -> Self {
        self.partitions.push(partition);
        self
    }

    /// Total size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.cylinders.saturating_mul(self.cylinder_size)
    }

    /// Number of whole cylinders needed to hold `bytes`
    pub fn cylinders_for(&self, bytes: u64) -> u64 {
        if self.cylinder_size == 0 {
            return 0;
        }
        bytes.div_ceil(self.cylinder_size)
    }

    pub fn partition(&self, number: u32) -> Option<&ExistingPartition> {
        self.partitions.iter().find(|p| p.number == number)
    }

    /// Check geometry and existing-layout consistency.
    ///
    /// Rejects a zero cylinder size, partitions outside the disk, duplicate
    /// numbers and overlapping primaries. Logical partitions must lie inside
    /// the extended container.
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(PlannerError::invalid_disk("device path is empty"));
        }
        if self.cylinder_size == 0 {
            return Err(PlannerError::invalid_disk(format!(
                "{}: cylinder size is zero",
                self.device
            )));
        }
        if self.max_primary == 0 {
            return Err(PlannerError::invalid_disk(format!(
                "{}: no primary slots",
                self.device
            )));
        }

        let mut numbers: Vec<u32> = self.partitions.iter().map(|p| p.number).collect();
        numbers.sort_unstable();
        if numbers.windows(2).any(|w| w[0] == w[1]) {
            return Err(PlannerError::invalid_disk(format!(
                "{}: duplicate partition numbers",
                self.device
            )));
        }

        for p in &self.partitions {
            if p.number == 0 || p.length == 0 {
                return Err(PlannerError::invalid_disk(format!(
                    "{}: partition {} has no number or no length",
                    self.device, p.number
                )));
            }
            if p.end() >= self.cylinders {
                return Err(PlannerError::invalid_disk(format!(
                    "{}: partition {} ends beyond cylinder {}",
                    self.device, p.number, self.cylinders
                )));
            }
        }

        let mut outer: Vec<&ExistingPartition> = self
            .partitions
            .iter()
            .filter(|p| p.kind != PartitionKind::Logical)
            .collect();
        outer.sort_by_key(|p| p.start);
        if outer.windows(2).any(|w| w[1].start <= w[0].end()) {
            return Err(PlannerError::invalid_disk(format!(
                "{}: overlapping primary partitions",
                self.device
            )));
        }

        let logicals = self
            .partitions
            .iter()
            .filter(|p| p.kind == PartitionKind::Logical);
        for p in logicals {
            let inside = self
                .partitions
                .iter()
                .any(|e| e.is_extended() && e.start <= p.start && p.end() <= e.end());
            if !inside {
                return Err(PlannerError::invalid_disk(format!(
                    "{}: logical partition {} is outside the extended partition",
                    self.device, p.number
                )));
            }
        }

        Ok(())
    }
}

/// Estimates how far a Windows partition can be shrunk.
pub trait ShrinkOracle {
    fn estimate_shrink(&self, disk: &Disk, partition: &ExistingPartition) -> Option<ShrinkEstimate>;
}

/// Oracle answering from estimates the prober attached to each partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbedShrinkOracle;

impl ShrinkOracle for ProbedShrinkOracle {
    fn estimate_shrink(&self, _disk: &Disk, partition: &ExistingPartition) -> Option<ShrinkEstimate> {
        partition.shrink
    }
}

/// Oracle that never allows shrinking.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShrink;

impl ShrinkOracle for NoShrink {
    fn estimate_shrink(&self, _disk: &Disk, _partition: &ExistingPartition) -> Option<ShrinkEstimate> {
        None
    }
}
