//! Gap analysis: existing layout → ordered regions
//!
//! A disk is described to the search as an ordered list of `Region`s: free
//! cylinder ranges ("gaps") and existing partitions that may be reused. The
//! interior of an existing extended partition is scanned separately, so
//! regions inside it are marked `extended` and can only host logical
//! partitions.
//!
//! # Slot budgets
//!
//! | Pool           | Numbers                                   |
//! |----------------|-------------------------------------------|
//! | primary        | `1..=max_primary` not used by a survivor  |
//! | logical        | above the highest surviving logical       |
//!
//! A new extended container consumes one primary number, so it is only
//! possible while the primary pool is non-empty.

use tracing::debug;

use crate::config_file::KeepList;
use crate::disk::{Disk, ExistingPartition};
use crate::partition::DesiredPartition;
use crate::types::{fsid, PartitionKind};

/// One desired partition placed into a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Index into `Requirements::parts`
    pub part: usize,
    /// Partition number it will get (the existing number when reused)
    pub number: u32,
    pub cylinders: u64,
    pub kind: PartitionKind,
}

/// A contiguous cylinder range: free, or an existing reusable partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    /// Last cylinder (inclusive)
    pub end: u64,
    pub cylinders: u64,
    /// Occupied by an existing partition
    pub exists: bool,
    /// Existing partition may be reused
    pub reuse: bool,
    /// Lies inside an existing extended partition
    pub extended: bool,
    /// Existing swap partition
    pub swap: bool,
    pub number: Option<u32>,
    pub fsid: Option<u32>,
    pub kind: Option<PartitionKind>,
    /// Number reserved for an extended container planned in this region
    pub create_extended: Option<u32>,
    pub placements: Vec<Placement>,
}

impl Region {
    fn free(start: u64, end: u64, extended: bool) -> Self {
        Self {
            start,
            end,
            cylinders: end - start + 1,
            exists: false,
            reuse: false,
            extended,
            swap: false,
            number: None,
            fsid: None,
            kind: None,
            create_extended: None,
            placements: Vec::new(),
        }
    }

    fn existing(p: &ExistingPartition, extended: bool) -> Self {
        Self {
            start: p.start,
            end: p.end(),
            cylinders: p.length,
            exists: true,
            reuse: true,
            extended,
            swap: p.fsid == fsid::LINUX_SWAP,
            number: Some(p.number),
            fsid: Some(p.fsid),
            kind: Some(p.kind),
            create_extended: None,
            placements: Vec::new(),
        }
    }

    /// Cylinders already handed to placements
    pub fn used(&self) -> u64 {
        self.placements.iter().map(|p| p.cylinders).sum()
    }

    pub fn remaining(&self) -> u64 {
        self.cylinders.saturating_sub(self.used())
    }

    /// Start cylinder the next placement would get
    pub fn next_start(&self) -> u64 {
        self.start + self.used()
    }

    pub fn has_logical(&self) -> bool {
        self.placements.iter().any(|p| p.kind == PartitionKind::Logical)
    }
}

/// A Windows partition shrunk to make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizedPartition {
    pub number: u32,
    pub old_cylinders: u64,
    pub new_cylinders: u64,
}

/// Everything the search needs to know about one candidate disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapInfo {
    pub regions: Vec<Region>,
    pub free_primary: Vec<u32>,
    pub free_logical: Vec<u32>,
    /// A new extended container may still be created
    pub extended_possible: bool,
    /// An extended container already exists (and survives)
    pub extended_exists: bool,
    pub cylinder_size: u64,
    pub disk_cylinders: u64,
    pub free_bytes: u64,
    /// Existing partitions removed before analysis
    pub deleted: Vec<u32>,
    pub resized: Option<ResizedPartition>,
}

impl GapInfo {
    /// Whether any free primary or usable logical number is left
    pub fn has_slack(&self) -> bool {
        let logical_usable =
            self.extended_exists || self.regions.iter().any(|r| r.create_extended.is_some());
        !self.free_primary.is_empty() || (logical_usable && !self.free_logical.is_empty())
    }
}

/// Analyze `disk` into regions and slot pools.
///
/// `include_existing_linux` makes Linux-native and swap partitions reusable;
/// partitions pinned by a desired partition's reuse id are reusable always.
/// With `prefer_remove`, unprotected partitions are marked deleted first.
pub fn analyze(
    disk: &Disk,
    desired: &[DesiredPartition],
    include_existing_linux: bool,
    prefer_remove: bool,
    keep: &KeepList,
) -> GapInfo {
    let pinned: Vec<u32> = desired
        .iter()
        .filter(|p| !p.is_placeholder())
        .filter_map(|p| p.reuse)
        .collect();

    let mut partitions = disk.partitions.clone();
    if prefer_remove {
        mark_removable(&mut partitions, &pinned, keep);
    }
    let mut deleted: Vec<u32> = partitions.iter().filter(|p| p.delete).map(|p| p.number).collect();
    deleted.sort_unstable();

    let mut live: Vec<&ExistingPartition> = partitions.iter().filter(|p| !p.delete).collect();
    live.sort_by_key(|p| p.start);

    let extended = if disk.extended_supported {
        live.iter().copied().find(|p| p.is_extended())
    } else {
        None
    };
    let is_logical = |p: &ExistingPartition| {
        p.kind == PartitionKind::Logical || (extended.is_some() && p.number > disk.max_primary)
    };

    let reusable = |p: &ExistingPartition| {
        pinned.contains(&p.number) || (include_existing_linux && fsid::is_linux_reusable(p.fsid))
    };

    let mut regions = Vec::new();
    let mut cursor = 0u64;
    for p in live.iter().copied().filter(|p| !is_logical(*p)) {
        if p.start > cursor {
            regions.push(Region::free(cursor, p.start - 1, false));
        }
        if Some(p) == extended {
            let logicals: Vec<&ExistingPartition> =
                live.iter().copied().filter(|l| is_logical(*l)).collect();
            scan_extended(p, &logicals, &reusable, &mut regions);
        } else if reusable(p) {
            regions.push(Region::existing(p, false));
        }
        cursor = cursor.max(p.end() + 1);
    }
    if cursor < disk.cylinders {
        regions.push(Region::free(cursor, disk.cylinders - 1, false));
    }

    let used_primary: Vec<u32> = live
        .iter()
        .copied()
        .filter(|p| !is_logical(*p))
        .map(|p| p.number)
        .collect();
    let free_primary: Vec<u32> = (1..=disk.max_primary)
        .filter(|n| !used_primary.contains(n))
        .collect();

    let free_logical: Vec<u32> = if disk.extended_supported {
        let highest = live
            .iter()
            .copied()
            .filter(|p| is_logical(*p))
            .map(|p| p.number)
            .max()
            .unwrap_or(disk.max_primary);
        (highest + 1..=disk.max_primary + disk.max_logical).collect()
    } else {
        Vec::new()
    };

    let extended_exists = extended.is_some();
    let extended_possible = disk.extended_supported && !extended_exists && !free_primary.is_empty();

    let free_bytes = regions
        .iter()
        .filter(|r| !r.exists)
        .map(|r| r.cylinders * disk.cylinder_size)
        .sum();

    debug!(
        disk = %disk.device,
        regions = regions.len(),
        free_primary = free_primary.len(),
        free_logical = free_logical.len(),
        extended_possible,
        free_bytes,
        "gap analysis"
    );

    GapInfo {
        regions,
        free_primary,
        free_logical,
        extended_possible,
        extended_exists,
        cylinder_size: disk.cylinder_size,
        disk_cylinders: disk.cylinders,
        free_bytes,
        deleted,
        resized: None,
    }
}

/// Emit the regions inside an existing extended partition.
fn scan_extended(
    extended: &ExistingPartition,
    logicals: &[&ExistingPartition],
    reusable: &dyn Fn(&ExistingPartition) -> bool,
    regions: &mut Vec<Region>,
) {
    let mut cursor = extended.start;
    for &l in logicals {
        if l.start > cursor {
            regions.push(Region::free(cursor, l.start - 1, true));
        }
        if reusable(l) {
            regions.push(Region::existing(l, true));
        }
        cursor = cursor.max(l.end() + 1);
    }
    if cursor <= extended.end() {
        regions.push(Region::free(cursor, extended.end(), true));
    }
}

/// Mark every unprotected partition for deletion.
///
/// A partition is protected when any keep list matches it (number, fsid or
/// filesystem), when a desired partition pins it, or when it carries one of
/// the always-protected IDs. The extended container goes too once no logical
/// partition survives inside it.
fn mark_removable(partitions: &mut [ExistingPartition], pinned: &[u32], keep: &KeepList) {
    let protected = |p: &ExistingPartition| {
        keep.numbers.contains(&p.number)
            || keep.fsids.contains(&p.fsid)
            || p.filesystem.is_some_and(|fs| keep.filesystems.contains(&fs))
            || fsid::ALWAYS_PROTECTED.contains(&p.fsid)
            || pinned.contains(&p.number)
    };

    for p in partitions.iter_mut() {
        if !p.delete && !p.is_extended() && !protected(&*p) {
            p.delete = true;
        }
    }

    let logical_survives = partitions
        .iter()
        .any(|p| p.kind == PartitionKind::Logical && !p.delete);
    for p in partitions.iter_mut() {
        if p.is_extended() && !logical_survives && !protected(&*p) {
            p.delete = true;
        }
    }
}
