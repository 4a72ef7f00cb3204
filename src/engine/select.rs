//! Disk selection
//!
//! Each disk is tried under increasingly destructive strategies:
//!
//! | Step | Strategy                        | Mode             |
//! |------|---------------------------------|------------------|
//! | a    | unpartitioned space only        | `free`           |
//! | b    | also reuse existing Linux/swap  | `reuse`          |
//! | c    | shrink a Windows partition      | `resize_windows` |
//! | c'   | delete unprotected partitions   | `desperate`      |
//!
//! Step (b) replaces (a) only with a strictly higher weight. Step (c) runs
//! only when neither (a) nor (b) found anything; `prefer_remove` swaps it for
//! (c'). Across disks the best `(tier, weight)` wins and ties keep the disk
//! that came first.

use std::cmp::Reverse;

use tracing::{debug, info};

use crate::config_file::PlanOptions;
use crate::disk::{Disk, ShrinkOracle};
use crate::engine::gaps::{analyze, ResizedPartition};
use crate::engine::search::{search, Solution};
use crate::engine::sizing::{requirements, Requirements};
use crate::partition::DesiredPartition;
use crate::types::{fsid, PlanMode};

/// The winning disk and how to lay it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub disk_index: usize,
    pub device: String,
    pub solution: Solution,
    /// Requirements the solution was computed for, including any `/boot`
    /// added automatically
    pub requirements: Requirements,
}

fn rank(solution: &Solution) -> (Reverse<u8>, i64) {
    (Reverse(solution.mode.tier()), solution.weight)
}

/// Pick the best disk for `desired`.
///
/// Returns `None` when no disk can hold the request under any strategy.
pub fn select(
    disks: &[Disk],
    desired: &[DesiredPartition],
    options: &PlanOptions,
    oracle: &dyn ShrinkOracle,
) -> Option<Selection> {
    let mut best: Option<Selection> = None;

    for (disk_index, disk) in disks.iter().enumerate() {
        let req = requirements(disk, desired, options);
        let Some(solution) = plan_disk(disk, &req, options, oracle) else {
            info!(disk = %disk.device, "no feasible layout on disk");
            continue;
        };
        info!(
            disk = %disk.device,
            mode = %solution.mode,
            weight = solution.weight,
            "disk candidate"
        );

        let better = best.as_ref().is_none_or(|b| rank(&solution) > rank(&b.solution));
        if better {
            best = Some(Selection {
                disk_index,
                device: disk.device.clone(),
                solution,
                requirements: req,
            });
        }
    }

    if let Some(winner) = &best {
        info!(
            disk = %winner.device,
            mode = %winner.solution.mode,
            weight = winner.solution.weight,
            "selected disk"
        );
    }
    best
}

/// Best solution on a single disk, trying the strategies in order.
pub fn plan_disk(
    disk: &Disk,
    req: &Requirements,
    options: &PlanOptions,
    oracle: &dyn ShrinkOracle,
) -> Option<Solution> {
    let keep = &options.keep;

    let free = search(req, analyze(disk, &req.desired, false, false, keep), PlanMode::Free);
    let reuse = search(req, analyze(disk, &req.desired, true, false, keep), PlanMode::Reuse);
    debug!(
        disk = %disk.device,
        free = free.as_ref().map(|s| s.weight),
        reuse = reuse.as_ref().map(|s| s.weight),
        "non-destructive strategies"
    );

    match (free, reuse) {
        (Some(free), Some(reuse)) if reuse.weight > free.weight => return Some(reuse),
        (Some(free), _) => return Some(free),
        (None, Some(reuse)) => return Some(reuse),
        (None, None) => {}
    }

    if options.prefer_remove {
        let gap = analyze(disk, &req.desired, false, true, keep);
        debug!(
            disk = %disk.device,
            deleted = ?gap.deleted,
            keep_list = !keep.is_empty(),
            "forced removal"
        );
        search(req, gap, PlanMode::Desperate)
    } else {
        resize_windows(disk, req, options, oracle)
    }
}

/// Shrink the Windows partition that frees the most cylinders, then place.
fn resize_windows(
    disk: &Disk,
    req: &Requirements,
    options: &PlanOptions,
    oracle: &dyn ShrinkOracle,
) -> Option<Solution> {
    let mut candidate: Option<ResizedPartition> = None;
    for p in disk.partitions.iter().filter(|p| !p.delete && fsid::is_windows(p.fsid)) {
        let Some(estimate) = oracle.estimate_shrink(disk, p) else {
            continue;
        };
        let floor = disk.cylinders_for(estimate.used_bytes);
        let new_cylinders = disk.cylinders_for(estimate.proposed_bytes).max(floor).max(1);
        if new_cylinders >= p.length {
            continue;
        }
        let freed = p.length - new_cylinders;
        if candidate.is_none_or(|c| freed > c.old_cylinders - c.new_cylinders) {
            candidate = Some(ResizedPartition {
                number: p.number,
                old_cylinders: p.length,
                new_cylinders,
            });
        }
    }

    let Some(resized) = candidate else {
        debug!(disk = %disk.device, "no shrinkable Windows partition");
        return None;
    };
    info!(
        disk = %disk.device,
        number = resized.number,
        old_cylinders = resized.old_cylinders,
        new_cylinders = resized.new_cylinders,
        "shrinking Windows partition"
    );

    let mut shrunk = disk.clone();
    for p in shrunk.partitions.iter_mut().filter(|p| p.number == resized.number) {
        p.length = resized.new_cylinders;
    }

    let mut gap = analyze(&shrunk, &req.desired, true, false, &options.keep);
    gap.resized = Some(resized);
    search(req, gap, PlanMode::ResizeWindows)
}
