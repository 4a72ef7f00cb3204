//! Solution weighting
//!
//! A complete, distributed placement is reduced to one `i64`. Higher is
//! better. The terms:
//!
//! | Term                                   | Weight                          |
//! |----------------------------------------|---------------------------------|
//! | mode bias                              | 0 / -100 / -1000 / -1,000,000   |
//! | free region with leftover cylinders    | -5, another -10 if < disk/20    |
//! | under-allocated target size            | -(want - actual) * 100 / actual |
//! | over-allocated target size             | a tenth of the same, mirrored   |
//! | target size requested                  | +want in 100 MiB units          |
//! | "as large as possible" partition       | +actual in 100 MiB units        |
//! | above max size                         | -(excess * 100 / max)           |
//! | planned extended container             | -1, another -100 if empty       |
//! | reuse pin not honored                  | -100                            |
//! | free partition numbers left            | +10, otherwise -10              |

use crate::engine::gaps::GapInfo;
use crate::engine::sizing::Requirements;
use crate::types::PlanMode;

const MIB: u64 = 1024 * 1024;
/// Size rewards are counted in these units
const SIZE_UNIT: u64 = 100 * MIB;

const UNUSED_REGION: i64 = 5;
const SMALL_FRAGMENT: i64 = 10;
const EXTENDED_CREATED: i64 = 1;
const EXTENDED_EMPTY: i64 = 100;
const PIN_MISMATCH: i64 = 100;
const SLACK: i64 = 10;

fn to_weight(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn size_units(cylinders: u64, cylinder_size: u64) -> i64 {
    to_weight(cylinders.saturating_mul(cylinder_size) / SIZE_UNIT)
}

/// Weight of a complete placement.
pub fn score(req: &Requirements, gap: &GapInfo, mode: PlanMode) -> i64 {
    let mut weight = mode.bias();
    let fragment = gap.disk_cylinders / 20;

    for region in gap.regions.iter().filter(|r| r.cylinders > 0) {
        if !region.exists {
            let leftover = region.remaining();
            if leftover > 0 {
                weight -= UNUSED_REGION;
                if leftover < fragment {
                    weight -= SMALL_FRAGMENT;
                }
            }
        }

        if region.create_extended.is_some() {
            weight -= EXTENDED_CREATED;
            if !region.has_logical() {
                weight -= EXTENDED_EMPTY;
            }
        }

        for placement in &region.placements {
            let part = &req.parts[placement.part];
            let actual = placement.cylinders.max(1);

            match part.want_cylinders {
                Some(want) => {
                    let want = want.max(1);
                    if want > actual {
                        weight -= to_weight((want - actual) * 100 / actual);
                    } else if actual > want {
                        weight -= to_weight((actual - want) * 100 / want / 10);
                    }
                    weight += size_units(want, gap.cylinder_size);
                }
                None => weight += size_units(actual, gap.cylinder_size),
            }

            if let Some(max) = part.max_cylinders {
                if actual > max {
                    weight -= to_weight((actual - max) * 100 / max.max(1));
                }
            }

            if part.reuse.is_some_and(|pin| pin != placement.number) {
                weight -= PIN_MISMATCH;
            }
        }
    }

    weight += if gap.has_slack() { SLACK } else { -SLACK };
    weight
}

/// Upper bound on the weight of any completion of a partial placement in
/// which parts `next..` are still unplaced.
///
/// Only penalties that no later placement can lift are counted:
/// - a free region without a growing placement keeps its leftover unless a
///   later part lands there, and each part lands in one region
/// - planned extended containers and exhausted number pools are final
///
/// Sizes of "as large as possible" partitions are bounded by the room of the
/// regions holding them plus the largest regions the unplaced ones can reach.
pub fn bound(req: &Requirements, gap: &GapInfo, mode: PlanMode, next: usize) -> i64 {
    let targets: i64 = req
        .parts
        .iter()
        .filter_map(|p| p.want_cylinders)
        .map(|want| size_units(want.max(1), gap.cylinder_size))
        .sum();
    let unplaced = &req.parts[next.min(req.parts.len())..];
    let unplaced_maximizing = unplaced.iter().filter(|p| p.maximizes()).count();

    let mut covered = 0u64;
    let mut reachable = Vec::new();
    let mut stranded = 0u64;
    let mut weight = mode.bias() + targets;

    for region in gap.regions.iter().filter(|r| r.cylinders > 0) {
        let maximizing = region.placements.iter().any(|pl| req.parts[pl.part].maximizes());
        if region.exists {
            if maximizing {
                covered += region.cylinders;
            } else if region.reuse && region.placements.is_empty() {
                reachable.push(region.cylinders);
            }
        } else {
            let sized: u64 = region
                .placements
                .iter()
                .filter(|pl| !req.parts[pl.part].maximizes())
                .map(|pl| pl.cylinders)
                .sum();
            let room = region.cylinders.saturating_sub(sized);
            if maximizing {
                covered += room;
            } else {
                reachable.push(room);
                let grows = region.placements.iter().any(|pl| req.parts[pl.part].grow);
                if region.remaining() > 0 && !grows {
                    stranded += 1;
                }
            }
        }

        if region.create_extended.is_some() {
            weight -= EXTENDED_CREATED;
        }
    }

    reachable.sort_unstable_by(|a, b| b.cmp(a));
    let maximized = covered + reachable.iter().take(unplaced_maximizing).sum::<u64>();
    weight += size_units(maximized, gap.cylinder_size);

    let unplaced_count = u64::try_from(unplaced.len()).unwrap_or(u64::MAX);
    weight -= UNUSED_REGION * to_weight(stranded.saturating_sub(unplaced_count));

    // pools only shrink while placing
    weight += if gap.has_slack() { SLACK } else { -SLACK };
    weight
}
