//! Per-disk cylinder requirements
//!
//! Size policies are expressed in bytes or percentages; the search works in
//! whole cylinders of one particular disk. `requirements` converts every
//! placeable desired partition into a `SizedPartition` for that disk and, if a
//! boot cylinder limit is configured, inserts the automatic `/boot`.

use tracing::debug;

use crate::config_file::PlanOptions;
use crate::disk::Disk;
use crate::partition::{DesiredPartition, SizePolicy};
use crate::types::PartitionKind;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Bounds for an automatically sized swap partition
const AUTO_SWAP_MIN: u64 = 256 * MIB;
const AUTO_SWAP_MAX: u64 = 2 * GIB;

/// Cylinder requirements of one desired partition on one disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedPartition {
    /// Index into `Requirements::desired`
    pub desired: usize,
    /// Cylinders the placement needs at least
    pub min_cylinders: u64,
    /// Explicit target size; `None` means "as large as possible"
    pub want_cylinders: Option<u64>,
    pub max_cylinders: Option<u64>,
    /// Grows toward `want_cylinders` in the first distribution pass
    pub grow: bool,
    /// Highest allowed start cylinder
    pub max_start: Option<u64>,
    pub reuse: Option<u32>,
    pub kind: Option<PartitionKind>,
    pub swap: bool,
}

impl SizedPartition {
    /// Whether the partition only absorbs leftover space
    pub fn maximizes(&self) -> bool {
        self.want_cylinders.is_none()
    }
}

/// Desired partitions (with any automatic additions) and their sizes on a disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    pub desired: Vec<DesiredPartition>,
    /// Placeable partitions only; placeholders are left out
    pub parts: Vec<SizedPartition>,
    /// Cylinder the automatic `/boot` must end below
    pub boot_limit_cylinder: Option<u64>,
}

impl Requirements {
    pub fn desired_of(&self, part: usize) -> &DesiredPartition {
        &self.desired[self.parts[part].desired]
    }
}

/// Compute the cylinder requirements of `desired` on `disk`.
pub fn requirements(disk: &Disk, desired: &[DesiredPartition], options: &PlanOptions) -> Requirements {
    let mut list = desired.to_vec();
    let boot_limit_cylinder = try_add_boot(disk, &mut list, options);

    let percent_sum: u64 = list
        .iter()
        .filter(|p| !p.is_placeholder())
        .filter_map(|p| match p.size {
            SizePolicy::Percent(pct) => Some(u64::from(pct)),
            _ => None,
        })
        .sum();
    // Percentages summing over 100 are scaled down proportionally
    let percent_base = percent_sum.max(100);

    let parts = list
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_placeholder())
        .map(|(index, p)| size_one(disk, index, p, percent_base, options))
        .collect();

    Requirements { desired: list, parts, boot_limit_cylinder }
}

fn size_one(
    disk: &Disk,
    index: usize,
    p: &DesiredPartition,
    percent_base: u64,
    options: &PlanOptions,
) -> SizedPartition {
    let fixed = |bytes: u64| disk.cylinders_for(bytes).max(1);

    let (min_cylinders, want_cylinders, grow) = match p.size {
        SizePolicy::Fixed(bytes) if p.grow => (fixed(bytes), None, false),
        SizePolicy::Fixed(bytes) => (fixed(bytes), Some(fixed(bytes)), false),
        SizePolicy::Percent(pct) => {
            let want = (disk.cylinders * u64::from(pct) / percent_base).max(1);
            (1, Some(want), true)
        }
        SizePolicy::Max => (1, None, false),
        SizePolicy::Suspend => {
            let bytes = options.ram_bytes + options.ram_bytes / 10;
            (fixed(bytes), Some(fixed(bytes)), false)
        }
        SizePolicy::Auto => match auto_size(p, options) {
            Some(bytes) => (fixed(bytes), Some(fixed(bytes)), false),
            None => (1, None, false),
        },
    };

    let max_cylinders = p
        .max_size
        .map(|bytes| (bytes / disk.cylinder_size.max(1)).max(min_cylinders));

    SizedPartition {
        desired: index,
        min_cylinders,
        want_cylinders,
        max_cylinders,
        grow: grow || (p.grow && want_cylinders.is_some()),
        max_start: p.max_cylinder,
        reuse: p.reuse,
        kind: p.kind,
        swap: p.is_swap(),
    }
}

/// Byte size of an `Auto` partition, or `None` when it should maximize
fn auto_size(p: &DesiredPartition, options: &PlanOptions) -> Option<u64> {
    if p.is_swap() {
        Some(options.ram_bytes.clamp(AUTO_SWAP_MIN, AUTO_SWAP_MAX))
    } else if p.is_mount("/boot") {
        Some(options.boot_size_bytes)
    } else {
        None
    }
}

/// Insert a `/boot` below the firmware limit when `/` could end up beyond it.
///
/// Returns the limit in cylinders when an automatic `/boot` was added.
fn try_add_boot(disk: &Disk, list: &mut Vec<DesiredPartition>, options: &PlanOptions) -> Option<u64> {
    let limit = options.boot_limit_bytes?;
    let placeable = |p: &&DesiredPartition| !p.is_placeholder();
    let has_root = list.iter().filter(placeable).any(|p| p.is_mount("/"));
    let has_boot = list.iter().filter(placeable).any(|p| p.is_mount("/boot"));
    if !has_root || has_boot || disk.size_bytes() <= limit {
        return None;
    }

    let limit_cylinder = limit / disk.cylinder_size.max(1);
    let boot_cylinders = disk.cylinders_for(options.boot_size_bytes).max(1);
    if boot_cylinders > limit_cylinder {
        return None;
    }

    debug!(
        disk = %disk.device,
        limit_cylinder,
        "adding automatic /boot below the boot limit"
    );
    let mut boot = DesiredPartition::new("/boot", SizePolicy::Fixed(options.boot_size_bytes))
        .with_max_cylinder(limit_cylinder - boot_cylinders);
    boot.auto_added = true;
    list.insert(0, boot);
    Some(limit_cylinder)
}
