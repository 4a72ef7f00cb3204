//! Backtracking placement search
//!
//! Every placeable partition is assigned, in order, to each region that can
//! legally take it. A complete assignment is grown by `normalize_gaps`,
//! weighted by `score`, and kept when it beats the best one so far.
//!
//! # Design
//!
//! One working `GapInfo` is mutated in place and every step is undone on the
//! way back up, so the only copies made are the scoring scratch at each leaf.
//! The best-so-far state lives in a `Search` value owned by a single call.
//!
//! Three cuts shrink the tree without changing the result:
//! - branch and bound: a node whose `score::bound` cannot beat the best
//!   weight under the strict comparison is dropped
//! - feasibility: the remaining partitions' minimum sizes must fit into the
//!   capacity that is still unassigned
//! - interchangeable regions: an empty free region identical to an earlier
//!   empty one is skipped, since swapping their contents scores the same.
//!   Start cylinders matter for `max_cylinder` bounds, so this is off as soon
//!   as any partition carries one

use tracing::{debug, trace};

use crate::engine::distribute::normalize_gaps;
use crate::engine::gaps::{GapInfo, Placement, Region};
use crate::engine::score::{bound, score};
use crate::engine::sizing::{Requirements, SizedPartition};
use crate::types::{PartitionKind, PlanMode};

/// Best placement found on one disk under one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub weight: i64,
    pub mode: PlanMode,
    /// Regions with their final, distributed placements
    pub gap: GapInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Take over the whole existing partition
    Reuse,
    /// Create a new partition of this kind
    New(PartitionKind),
}

struct Search<'a> {
    req: &'a Requirements,
    mode: PlanMode,
    /// Existing numbers reserved by reuse pins
    pinned: Vec<u32>,
    /// `tail_min[i]` is the minimum size of parts `i..`
    tail_min: Vec<u64>,
    /// Empty identical regions may be treated as one
    symmetric: bool,
    best: Option<Solution>,
    nodes: u64,
    pruned: u64,
}

impl<'a> Search<'a> {
    fn new(req: &'a Requirements, mode: PlanMode) -> Self {
        let mut tail_min = vec![0; req.parts.len() + 1];
        for i in (0..req.parts.len()).rev() {
            tail_min[i] = tail_min[i + 1] + req.parts[i].min_cylinders;
        }
        Self {
            req,
            mode,
            pinned: req.parts.iter().filter_map(|p| p.reuse).collect(),
            tail_min,
            symmetric: req.parts.iter().all(|p| p.max_start.is_none()),
            best: None,
            nodes: 0,
            pruned: 0,
        }
    }

    /// Whether nothing below this node can beat the best weight
    fn hopeless(&self, gap: &GapInfo, index: usize) -> bool {
        self.best
            .as_ref()
            .is_some_and(|b| bound(self.req, gap, self.mode, index) <= b.weight)
    }

    fn descend(&mut self, gap: &mut GapInfo, index: usize) {
        self.nodes += 1;
        if self.hopeless(gap, index) || self.tail_min[index] > unassigned_capacity(gap) {
            self.pruned += 1;
            return;
        }
        if index == self.req.parts.len() {
            self.complete(gap);
            return;
        }

        let req = self.req;
        let part = &req.parts[index];
        for r in 0..gap.regions.len() {
            if self.symmetric && has_twin_before(gap, r) {
                continue;
            }
            for step in self.steps(gap, &gap.regions[r], part) {
                let number = apply(gap, r, index, part, step);
                self.descend(gap, index + 1);
                undo(gap, r, step, number);
            }
        }
    }

    fn complete(&mut self, gap: &GapInfo) {
        let mut candidate = gap.clone();
        normalize_gaps(self.req, &mut candidate);
        let weight = score(self.req, &candidate, self.mode);
        trace!(weight, "complete assignment");

        if self.best.as_ref().is_none_or(|b| weight > b.weight) {
            self.best = Some(Solution { weight, mode: self.mode, gap: candidate });
        }
    }

    /// Ways `part` may be placed into `region`, in the order they are tried.
    fn steps(&self, gap: &GapInfo, region: &Region, part: &SizedPartition) -> Vec<Step> {
        if region.exists {
            return if self.may_reuse(region, part) { vec![Step::Reuse] } else { Vec::new() };
        }

        if part.reuse.is_some()
            || region.remaining() < part.min_cylinders
            || part.max_start.is_some_and(|max| region.next_start() > max)
        {
            return Vec::new();
        }

        let primary_ok = part.kind != Some(PartitionKind::Logical) && !gap.free_primary.is_empty();
        let logical_ok = part.kind != Some(PartitionKind::Primary) && !gap.free_logical.is_empty();

        let mut steps = Vec::new();
        if region.extended {
            if logical_ok {
                steps.push(Step::New(PartitionKind::Logical));
            }
        } else if region.create_extended.is_some() {
            if primary_ok && !region.has_logical() {
                steps.push(Step::New(PartitionKind::Primary));
            }
            if logical_ok {
                steps.push(Step::New(PartitionKind::Logical));
            }
        } else if primary_ok {
            steps.push(Step::New(PartitionKind::Primary));
        }
        steps
    }

    fn may_reuse(&self, region: &Region, part: &SizedPartition) -> bool {
        if !region.reuse || !region.placements.is_empty() || region.cylinders < part.min_cylinders {
            return false;
        }
        if part.max_start.is_some_and(|max| region.start > max) {
            return false;
        }
        match part.reuse {
            Some(pin) => region.number == Some(pin),
            None => {
                let reserved = region.number.is_some_and(|n| self.pinned.contains(&n));
                let swap_mismatch = region.swap && !part.swap;
                let kind_mismatch = match part.kind {
                    Some(PartitionKind::Primary) => region.extended,
                    Some(PartitionKind::Logical) => !region.extended,
                    _ => false,
                };
                !reserved && !swap_mismatch && !kind_mismatch
            }
        }
    }
}

/// An earlier region is an empty free twin of region `r`
fn has_twin_before(gap: &GapInfo, r: usize) -> bool {
    let region = &gap.regions[r];
    let empty_free = |x: &Region| !x.exists && x.create_extended.is_none() && x.placements.is_empty();
    empty_free(region)
        && gap.regions[..r]
            .iter()
            .any(|x| empty_free(x) && x.cylinders == region.cylinders && x.extended == region.extended)
}

/// Cylinders not yet handed to any placement
fn unassigned_capacity(gap: &GapInfo) -> u64 {
    gap.regions
        .iter()
        .map(|r| match (r.exists, r.placements.is_empty()) {
            (true, true) => r.cylinders,
            (true, false) => 0,
            (false, _) => r.remaining(),
        })
        .sum()
}

/// Record the placement; returns the number taken from a pool, if any.
fn apply(gap: &mut GapInfo, r: usize, index: usize, part: &SizedPartition, step: Step) -> Option<u32> {
    let (placement, taken) = match step {
        Step::Reuse => {
            let region = &gap.regions[r];
            let placement = Placement {
                part: index,
                number: region.number.unwrap_or_default(),
                cylinders: region.cylinders,
                kind: region.kind.unwrap_or_default(),
            };
            (placement, None)
        }
        Step::New(kind) => {
            let pool = match kind {
                PartitionKind::Logical => &mut gap.free_logical,
                _ => &mut gap.free_primary,
            };
            // pools are sorted; the lowest free number is used
            let number = pool.remove(0);
            let placement = Placement { part: index, number, cylinders: part.min_cylinders, kind };
            (placement, Some(number))
        }
    };
    gap.regions[r].placements.push(placement);
    taken
}

fn undo(gap: &mut GapInfo, r: usize, step: Step, taken: Option<u32>) {
    gap.regions[r].placements.pop();
    if let (Step::New(kind), Some(number)) = (step, taken) {
        let pool = match kind {
            PartitionKind::Logical => &mut gap.free_logical,
            _ => &mut gap.free_primary,
        };
        pool.insert(0, number);
    }
}

/// Find the best placement of `req` on the analyzed disk.
///
/// Returns `None` when no complete assignment exists.
pub fn search(req: &Requirements, gap: GapInfo, mode: PlanMode) -> Option<Solution> {
    explore(req, gap, mode).best
}

fn explore(req: &Requirements, mut gap: GapInfo, mode: PlanMode) -> Search<'_> {
    let mut search = Search::new(req, mode);
    if req.parts.is_empty() {
        search.best = Some(Solution { weight: 0, mode, gap });
        return search;
    }

    let to_create: Vec<&SizedPartition> = req.parts.iter().filter(|p| p.reuse.is_none()).collect();
    let wants_logical = to_create.iter().any(|p| p.kind == Some(PartitionKind::Logical));
    if gap.extended_possible && (to_create.len() > gap.free_primary.len() || wants_logical) {
        let hosts: Vec<usize> = gap
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.exists && !r.extended && r.cylinders > 0)
            .map(|(i, _)| i)
            .collect();
        for r in hosts {
            let mut branch = gap.clone();
            let number = branch.free_primary.remove(0);
            branch.regions[r].create_extended = Some(number);
            branch.extended_possible = false;
            debug!(region = r, number, "trying planned extended partition");
            search.descend(&mut branch, 0);
        }
    }
    search.descend(&mut gap, 0);

    debug!(
        mode = %mode,
        nodes = search.nodes,
        pruned = search.pruned,
        weight = search.best.as_ref().map(|b| b.weight),
        "placement search finished"
    );
    search
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::{KeepList, PlanOptions};
    use crate::disk::{Disk, ExistingPartition};
    use crate::engine::gaps::analyze;
    use crate::engine::sizing::requirements;
    use crate::partition::{DesiredPartition, SizePolicy};
    use crate::types::{fsid, DiskLabel};

    const MIB: u64 = 1024 * 1024;

    fn run(disk: &Disk, desired: &[DesiredPartition], include_linux: bool, mode: PlanMode) -> Option<Solution> {
        let req = requirements(disk, desired, &PlanOptions::default());
        let gap = analyze(disk, &req.desired, include_linux, false, &KeepList::default());
        search(&req, gap, mode)
    }

    fn placements(solution: &Solution) -> Vec<&Placement> {
        solution.gap.regions.iter().flat_map(|r| r.placements.iter()).collect()
    }

    fn empty_disk() -> Disk {
        Disk::new("/dev/sda", DiskLabel::Msdos, MIB, 1000)
    }

    #[test]
    fn test_no_partitions_is_empty_solution() {
        let solution = run(&empty_disk(), &[], false, PlanMode::Free).expect("empty request is feasible");
        assert_eq!(solution.weight, 0);
        assert!(placements(&solution).is_empty());
    }

    #[test]
    fn test_single_max_fills_disk() {
        let desired = vec![DesiredPartition::new("/", SizePolicy::Max)];
        let solution = run(&empty_disk(), &desired, false, PlanMode::Free).expect("fits");
        let placed = placements(&solution);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].number, 1);
        assert_eq!(placed[0].cylinders, 1000);
        assert_eq!(placed[0].kind, PartitionKind::Primary);
    }

    #[test]
    fn test_three_percent_halves() {
        let desired = vec![
            DesiredPartition::new("/a", SizePolicy::Percent(50)),
            DesiredPartition::new("/b", SizePolicy::Percent(50)),
            DesiredPartition::new("/c", SizePolicy::Percent(50)),
        ];
        let solution = run(&empty_disk(), &desired, false, PlanMode::Free).expect("fits");
        for placement in placements(&solution) {
            assert_eq!(placement.cylinders, 333);
        }
    }

    #[test]
    fn test_too_large_is_infeasible() {
        let desired = vec![DesiredPartition::new("/", SizePolicy::Fixed(2000 * MIB))];
        assert!(run(&empty_disk(), &desired, false, PlanMode::Free).is_none());
    }

    #[test]
    fn test_pinned_partition_lands_in_its_region() {
        let disk = empty_disk()
            .with_partition(ExistingPartition::new(1, 0, 400, 0x07))
            .with_partition(ExistingPartition::new(2, 400, 300, fsid::LINUX_NATIVE));
        let desired = vec![
            DesiredPartition::new("/home", SizePolicy::Max).with_reuse(2),
            DesiredPartition::new("/", SizePolicy::Fixed(100 * MIB)),
        ];
        let solution = run(&disk, &desired, false, PlanMode::Free).expect("fits");
        let home = placements(&solution).into_iter().find(|p| p.part == 0).expect("placed");
        assert_eq!(home.number, 2);
        assert_eq!(home.cylinders, 300);
        let root = placements(&solution).into_iter().find(|p| p.part == 1).expect("placed");
        assert_eq!(root.number, 3);
    }

    #[test]
    fn test_five_partitions_plan_an_extended() {
        let desired: Vec<DesiredPartition> = (0..5)
            .map(|i| DesiredPartition::new(format!("/p{i}"), SizePolicy::Fixed(100 * MIB)))
            .collect();
        let solution = run(&empty_disk(), &desired, false, PlanMode::Free).expect("fits");

        let host = solution
            .gap
            .regions
            .iter()
            .find(|r| r.create_extended.is_some())
            .expect("extended planned");
        assert!(host.has_logical());

        let placed = placements(&solution);
        assert_eq!(placed.len(), 5);
        let primaries = placed.iter().filter(|p| p.kind == PartitionKind::Primary).count();
        // the container itself takes one primary number
        assert!(primaries + 1 <= 4);

        // no primary follows a logical within the host region
        let first_logical = host.placements.iter().position(|p| p.kind == PartitionKind::Logical);
        if let Some(first) = first_logical {
            assert!(host.placements[first..].iter().all(|p| p.kind == PartitionKind::Logical));
        }
    }

    #[test]
    fn test_gpt_needs_no_extended() {
        let disk = Disk::new("/dev/nvme0n1", DiskLabel::Gpt, MIB, 1000);
        let desired: Vec<DesiredPartition> = (0..6)
            .map(|i| DesiredPartition::new(format!("/p{i}"), SizePolicy::Fixed(10 * MIB)))
            .collect();
        let solution = run(&disk, &desired, false, PlanMode::Free).expect("fits");
        assert!(solution.gap.regions.iter().all(|r| r.create_extended.is_none()));
        let numbers: Vec<u32> = placements(&solution).iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_max_start_bound_is_respected() {
        let disk = empty_disk().with_partition(ExistingPartition::new(1, 0, 500, 0x07));
        let desired = vec![DesiredPartition::new("/boot", SizePolicy::Fixed(10 * MIB)).with_max_cylinder(100)];
        assert!(run(&disk, &desired, false, PlanMode::Free).is_none());
    }

    #[test]
    fn test_swap_region_only_reused_by_swap() {
        let disk = empty_disk().with_partition(ExistingPartition::new(1, 0, 1000, fsid::LINUX_SWAP));

        let root = vec![DesiredPartition::new("/", SizePolicy::Max)];
        assert!(run(&disk, &root, true, PlanMode::Reuse).is_none());

        let swap = vec![DesiredPartition::new("swap", SizePolicy::Fixed(100 * MIB))];
        let solution = run(&disk, &swap, true, PlanMode::Reuse).expect("swap reuses swap");
        assert_eq!(placements(&solution)[0].number, 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let desired = vec![
            DesiredPartition::new("swap", SizePolicy::Fixed(64 * MIB)),
            DesiredPartition::new("/", SizePolicy::Percent(80)).with_grow(),
            DesiredPartition::new("/home", SizePolicy::Max),
        ];
        let solution = run(&empty_disk(), &desired, false, PlanMode::Free).expect("fits");
        for region in &solution.gap.regions {
            assert!(region.used() <= region.cylinders);
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let desired = vec![
            DesiredPartition::new("/", SizePolicy::Percent(40)),
            DesiredPartition::new("/var", SizePolicy::Percent(40)),
            DesiredPartition::new("swap", SizePolicy::Fixed(50 * MIB)),
        ];
        let a = run(&empty_disk(), &desired, false, PlanMode::Free);
        let b = run(&empty_disk(), &desired, false, PlanMode::Free);
        assert_eq!(a, b);
    }

    #[test]
    fn test_logical_hint_plans_an_extended() {
        let desired = vec![
            DesiredPartition::new("/", SizePolicy::Fixed(100 * MIB)),
            DesiredPartition::new("/home", SizePolicy::Max).with_kind(PartitionKind::Logical),
        ];
        // four free primary slots would hold both, but /home asks for a logical
        let solution = run(&empty_disk(), &desired, false, PlanMode::Free).expect("fits");

        let host = &solution.gap.regions[0];
        assert_eq!(host.create_extended, Some(1));
        let root = placements(&solution).into_iter().find(|p| p.part == 0).expect("placed");
        assert_eq!((root.kind, root.number), (PartitionKind::Primary, 2));
        let home = placements(&solution).into_iter().find(|p| p.part == 1).expect("placed");
        assert_eq!((home.kind, home.number), (PartitionKind::Logical, 5));
        assert_eq!(home.cylinders, 900);
    }

    #[test]
    fn test_primary_hint_stays_out_of_extended() {
        // empty extended 1 over 0..599, free primary space 600..999
        let disk = empty_disk().with_partition(
            ExistingPartition::new(1, 0, 600, fsid::EXTENDED).with_kind(PartitionKind::Extended),
        );

        let unhinted = vec![DesiredPartition::new("/", SizePolicy::Max)];
        let solution = run(&disk, &unhinted, false, PlanMode::Free).expect("fits");
        assert_eq!(placements(&solution)[0].kind, PartitionKind::Logical);

        let hinted = vec![DesiredPartition::new("/", SizePolicy::Max).with_kind(PartitionKind::Primary)];
        let solution = run(&disk, &hinted, false, PlanMode::Free).expect("fits");
        let region = solution
            .gap
            .regions
            .iter()
            .find(|r| !r.placements.is_empty())
            .expect("placed");
        assert!(!region.extended);
        assert_eq!(region.start, 600);
        assert_eq!(region.placements[0].kind, PartitionKind::Primary);
        assert_eq!(region.placements[0].number, 2);

        // with only extended interior left a primary hint cannot be met
        let whole = empty_disk().with_partition(
            ExistingPartition::new(1, 0, 1000, fsid::EXTENDED).with_kind(PartitionKind::Extended),
        );
        assert!(run(&whole, &hinted, false, PlanMode::Free).is_none());
    }

    #[test]
    fn test_maximizing_partition_takes_largest_gap() {
        // gaps 0..299 and 400..999 around Windows
        let disk = empty_disk().with_partition(ExistingPartition::new(1, 300, 100, 0x07));
        let desired = vec![
            DesiredPartition::new("/", SizePolicy::Max),
            DesiredPartition::new("/var", SizePolicy::Fixed(100 * MIB)),
        ];
        let solution = run(&disk, &desired, false, PlanMode::Free).expect("fits");
        let large = &solution.gap.regions[1];
        assert_eq!(large.start, 400);
        assert_eq!(large.placements.len(), 1);
        assert_eq!((large.placements[0].part, large.placements[0].cylinders), (0, 600));
        assert_eq!(solution.weight, 6 + 1 - 5 + 10);
    }

    #[test]
    fn test_many_gaps_stay_within_node_budget() {
        // GPT, 100 MiB cylinders: seven 100 cylinder gaps between six Windows partitions
        let mut disk = Disk::new("/dev/nvme0n1", DiskLabel::Gpt, 100 * MIB, 1000);
        for i in 0..6 {
            disk = disk.with_partition(ExistingPartition::new(i + 1, 100 + u64::from(i) * 150, 50, 0x07));
        }
        let desired: Vec<DesiredPartition> = (0..8)
            .map(|i| {
                let size = if i % 2 == 0 { SizePolicy::Fixed(1000 * MIB) } else { SizePolicy::Max };
                DesiredPartition::new(format!("/p{i}"), size)
            })
            .collect();
        let req = requirements(&disk, &desired, &PlanOptions::default());
        let gap = analyze(&disk, &req.desired, false, false, &KeepList::default());
        assert_eq!(gap.regions.len(), 7);

        let explored = explore(&req, gap, PlanMode::Free);
        // 7^8 leaves without the cuts
        assert!(explored.nodes < 20_000, "visited {} nodes", explored.nodes);

        // four full gaps for the maximizing partitions, the fixed ones share
        // the other three
        let best = explored.best.expect("fits");
        assert_eq!(best.weight, 4 * 10 + 4 * 100 - 3 * 5 + 10);
        for region in &best.gap.regions {
            let maximizing = region.placements.iter().filter(|p| p.part % 2 == 1).count();
            assert!(maximizing <= 1);
            if maximizing == 1 {
                assert_eq!(region.placements.len(), 1);
                assert_eq!(region.placements[0].cylinders, 100);
            }
        }
    }
}
