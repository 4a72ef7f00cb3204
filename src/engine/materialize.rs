//! Partition Materializer
//!
//! Turns the winning `Solution` into the concrete change set an executor
//! applies: one `PartitionRecord` per deleted, shrunk, reused or newly
//! created partition, plus the extended containers the search planned.
//!
//! # Record Order
//!
//! | Step | Records                                   |
//! |------|-------------------------------------------|
//! | 1    | partitions removed before placement       |
//! | 2    | the shrunk Windows partition              |
//! | 3    | per region: reused or new partitions, a planned extended container, logicals |
//!
//! The list is finally sorted by partition number (stable, so a deletion
//! precedes a new partition that takes over its number).
//!
//! # Boot Correction
//!
//! An automatic `/boot` is dropped again when `/` ends below the boot limit.
//! New partitions of the same pool numbered after it move down one slot, so
//! no number is skipped. `Layout::weight` still reports the score the disk
//! was chosen with.
//!
//! # Design
//!
//! - **Pure logic**: no I/O; the records only describe what to do
//! - **Single output**: `Layout` is the only value that leaves the planner

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::config_file::PlanOptions;
use crate::disk::{Disk, ShrinkOracle};
use crate::engine::gaps::Region;
use crate::engine::search::Solution;
use crate::engine::select::select;
use crate::engine::sizing::Requirements;
use crate::error::{PlannerError, Result};
use crate::partition::{CryptParams, DesiredPartition};
use crate::types::{fsid, Filesystem, PartitionKind, PlanMode};

// ============================================================================
// Output Types
// ============================================================================

/// One partition-table change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Partition device path, e.g. `/dev/sda3` or `/dev/nvme0n1p3`
    pub device: String,
    pub number: u32,
    pub start: u64,
    pub cylinders: u64,
    pub kind: PartitionKind,
    pub mount: Option<String>,
    pub fsid: u32,
    pub filesystem: Option<Filesystem>,
    pub format: bool,
    pub fstab_options: Option<String>,
    pub lvm_group: Option<String>,
    pub raid_name: Option<String>,
    pub crypt: Option<CryptParams>,
    /// Partition does not exist yet
    pub create: bool,
    /// Existing partition is shrunk to `cylinders`
    pub resize: bool,
    /// Existing partition is removed
    pub delete: bool,
}

impl PartitionRecord {
    /// Last cylinder (inclusive)
    pub fn end(&self) -> u64 {
        self.start + self.cylinders.saturating_sub(1)
    }

    fn for_existing(disk: &Disk, number: u32) -> Option<Self> {
        let p = disk.partition(number)?;
        Some(Self {
            device: partition_path(&disk.device, p.number),
            number: p.number,
            start: p.start,
            cylinders: p.length,
            kind: p.kind,
            mount: None,
            fsid: p.fsid,
            filesystem: p.filesystem,
            format: false,
            fstab_options: None,
            lvm_group: None,
            raid_name: None,
            crypt: None,
            create: false,
            resize: false,
            delete: false,
        })
    }

    fn for_desired(
        device: &str,
        number: u32,
        start: u64,
        cylinders: u64,
        kind: PartitionKind,
        desired: &DesiredPartition,
    ) -> Self {
        Self {
            device: partition_path(device, number),
            number,
            start,
            cylinders,
            kind,
            mount: desired.mount.clone(),
            fsid: desired.fsid(),
            filesystem: desired.effective_filesystem(),
            format: desired.format,
            fstab_options: desired.fstab_options.clone(),
            lvm_group: desired.lvm_group.clone(),
            raid_name: desired.raid_name.clone(),
            crypt: desired.crypt.clone(),
            create: true,
            resize: false,
            delete: false,
        }
    }
}

impl fmt::Display for PartitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.delete {
            "delete"
        } else if self.resize {
            "shrink"
        } else if self.create {
            "create"
        } else {
            "reuse"
        };
        write!(
            f,
            "{} {} ({}, id {:#04x}) cylinders {}..={}",
            action,
            self.device,
            self.kind,
            self.fsid,
            self.start,
            self.end()
        )?;
        if let Some(fs) = self.filesystem {
            write!(f, " {}", fs)?;
        }
        if let Some(mount) = &self.mount {
            write!(f, " on {}", mount)?;
        }
        if let Some(group) = &self.lvm_group {
            write!(f, " [lvm {}]", group)?;
        }
        if let Some(raid) = &self.raid_name {
            write!(f, " [raid {}]", raid)?;
        }
        Ok(())
    }
}

/// The planner's result: which disk to use and what to do to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub device: String,
    pub disk_index: usize,
    pub mode: PlanMode,
    /// Score the disk was selected with; the `/boot` correction leaves it as is
    pub weight: i64,
    pub records: Vec<PartitionRecord>,
}

impl Layout {
    /// Records of partitions that end up on the disk
    pub fn partitions(&self) -> impl Iterator<Item = &PartitionRecord> {
        self.records.iter().filter(|r| !r.delete)
    }

    /// Serialize the layout for an executor
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get a human-readable summary of the layout
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Partition Layout: {}", self.mode),
            format!("  Target: {}", self.device),
            format!("  Weight: {}", self.weight),
            format!("  Changes ({}):", self.records.len()),
        ];
        for (i, record) in self.records.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, record));
        }
        lines.join("\n")
    }
}

// ============================================================================
// Planning Entry Point
// ============================================================================

/// Plan a layout for `desired` on the best of `disks`.
///
/// # Errors
///
/// Returns `PlannerError::NoFeasibleLayout` when no disk can hold the
/// request under any strategy.
pub fn plan_layout(
    disks: &[Disk],
    desired: &[DesiredPartition],
    options: &PlanOptions,
    oracle: &dyn ShrinkOracle,
) -> Result<Layout> {
    let selection = select(disks, desired, options, oracle).ok_or_else(|| {
        PlannerError::no_feasible_layout(format!(
            "{} partition(s) do not fit on any of {} disk(s)",
            desired.iter().filter(|p| !p.is_placeholder()).count(),
            disks.len()
        ))
    })?;

    let disk = &disks[selection.disk_index];
    let records = materialize(disk, &selection.requirements, &selection.solution);
    info!(
        disk = %disk.device,
        mode = %selection.solution.mode,
        records = records.len(),
        "layout planned"
    );

    Ok(Layout {
        device: selection.device,
        disk_index: selection.disk_index,
        mode: selection.solution.mode,
        weight: selection.solution.weight,
        records,
    })
}

// ============================================================================
// Materialization
// ============================================================================

/// Convert a solution on `disk` into partition records sorted by number.
pub fn materialize(disk: &Disk, req: &Requirements, solution: &Solution) -> Vec<PartitionRecord> {
    let gap = &solution.gap;
    let mut records = Vec::new();

    for &number in &gap.deleted {
        if let Some(mut record) = PartitionRecord::for_existing(disk, number) {
            record.delete = true;
            records.push(record);
        }
    }

    if let Some(resized) = gap.resized {
        if let Some(mut record) = PartitionRecord::for_existing(disk, resized.number) {
            record.cylinders = resized.new_cylinders;
            record.resize = true;
            records.push(record);
        }
    }

    for region in &gap.regions {
        materialize_region(&disk.device, region, req, &mut records);
    }

    remove_boot(&mut records, req, disk, &gap.deleted);

    records.sort_by_key(|r| r.number);
    records
}

fn materialize_region(device: &str, region: &Region, req: &Requirements, records: &mut Vec<PartitionRecord>) {
    if region.exists {
        for placement in &region.placements {
            let desired = req.desired_of(placement.part);
            let mut record = PartitionRecord::for_desired(
                device,
                placement.number,
                region.start,
                region.cylinders,
                placement.kind,
                desired,
            );
            record.create = false;
            records.push(record);
        }
        return;
    }

    let mut cursor = region.start;
    let mut container = region.create_extended;
    for placement in &region.placements {
        if placement.kind == PartitionKind::Logical {
            // emitted once, in front of the first logical
            if let Some(number) = container.take() {
                records.push(extended_container(device, number, cursor, region.end));
            }
        }
        let desired = req.desired_of(placement.part);
        records.push(PartitionRecord::for_desired(
            device,
            placement.number,
            cursor,
            placement.cylinders,
            placement.kind,
            desired,
        ));
        cursor += placement.cylinders;
    }
}

/// New extended container spanning from the first logical to the region end
fn extended_container(device: &str, number: u32, start: u64, end: u64) -> PartitionRecord {
    PartitionRecord {
        device: partition_path(device, number),
        number,
        start,
        cylinders: end - start + 1,
        kind: PartitionKind::Extended,
        mount: None,
        fsid: fsid::EXTENDED_LBA,
        filesystem: None,
        format: false,
        fstab_options: None,
        lvm_group: None,
        raid_name: None,
        crypt: None,
        create: true,
        resize: false,
        delete: false,
    }
}

/// Drop the automatic `/boot` when the root partition ends below the boot
/// limit anyway. A newly created root next to it absorbs its cylinders, and
/// new partitions numbered after it move down to close the gap.
fn remove_boot(records: &mut Vec<PartitionRecord>, req: &Requirements, disk: &Disk, deleted: &[u32]) {
    let Some(limit) = req.boot_limit_cylinder else {
        return;
    };
    if !req.desired.iter().any(|p| p.auto_added && p.is_mount("/boot")) {
        return;
    }
    let is_mount = |r: &PartitionRecord, path: &str| !r.delete && r.mount.as_deref() == Some(path);
    let (Some(boot), Some(root)) = (
        records.iter().position(|r| is_mount(r, "/boot")),
        records.iter().position(|r| is_mount(r, "/")),
    ) else {
        return;
    };
    if records[root].end() >= limit {
        return;
    }

    let boot_record = records[boot].clone();
    let root_record = &mut records[root];
    if root_record.create && boot_record.create && root_record.kind == boot_record.kind {
        if boot_record.end() + 1 == root_record.start {
            root_record.start = boot_record.start;
            root_record.cylinders += boot_record.cylinders;
        } else if root_record.end() + 1 == boot_record.start {
            root_record.cylinders += boot_record.cylinders;
        }
    }
    debug!(
        root_end = records[root].end(),
        limit, "root ends below the boot limit, dropping automatic /boot"
    );
    records.remove(boot);
    if boot_record.create {
        let logical = boot_record.kind == PartitionKind::Logical;
        close_number_gap(records, disk, deleted, boot_record.number, logical);
    }
}

/// Renumber new partitions above `hole` in the same pool (logical, or
/// primary and extended) to the lowest numbers no surviving partition holds.
fn close_number_gap(records: &mut [PartitionRecord], disk: &Disk, deleted: &[u32], hole: u32, logical: bool) {
    let movable = |r: &PartitionRecord| {
        r.create && !r.delete && r.number > hole && (r.kind == PartitionKind::Logical) == logical
    };
    let mut order: Vec<usize> = (0..records.len()).filter(|&i| movable(&records[i])).collect();
    order.sort_by_key(|&i| records[i].number);
    // untouched existing partitions have no record but keep their numbers
    let fixed: Vec<u32> = records
        .iter()
        .filter(|&r| !r.delete && !movable(r))
        .map(|r| r.number)
        .chain(
            disk.partitions
                .iter()
                .filter(|p| !deleted.contains(&p.number))
                .map(|p| p.number),
        )
        .collect();

    let mut next = hole;
    for i in order {
        while fixed.contains(&next) {
            next += 1;
        }
        let record = &mut records[i];
        if record.number != next {
            debug!(from = record.number, to = next, "renumbering after /boot removal");
            record.number = next;
            record.device = partition_path(&disk.device, next);
        }
        next += 1;
    }
}

/// Get the device path of partition `number` on `disk`.
///
/// Devices whose name ends in a digit get a `p` separator.
pub fn partition_path(disk: &str, number: u32) -> String {
    // NVMe, MMC and loop devices use 'p' separator (e.g., /dev/nvme0n1p1)
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, number)
    } else {
        format!("{}{}", disk, number)
    }
}

// ============================================================================
// Tests
// ============================================================================
