//! Remainder distribution
//!
//! The search places every partition at its minimum size. Once an assignment
//! is complete, `normalize_gaps` hands out what is left of each free region:
//! first to growing partitions that are still below their target size, then
//! to partitions that simply want to be as large as possible.

use crate::engine::gaps::GapInfo;
use crate::engine::sizing::Requirements;

/// A candidate's current size and the most it may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub cylinders: u64,
    pub cap: Option<u64>,
}

/// Proportionally share `remaining` cylinders among `candidates`.
///
/// Each candidate is offered `round(remaining * weight / sum(weights))`,
/// clamped to its cap. Whatever a clamped candidate could not take is not
/// offered to the others in the same call. Offers are also limited to what is
/// still left in the pool, so rounding up can never overfill it.
///
/// Returns the number of cylinders consumed.
pub fn distribute(remaining: u64, weights: &[u64], candidates: &mut [Share]) -> u64 {
    let total: u128 = weights.iter().map(|&w| u128::from(w)).sum();
    if remaining == 0 || total == 0 {
        return 0;
    }

    let mut consumed = 0u64;
    for (share, &weight) in candidates.iter_mut().zip(weights) {
        let offered = (2 * u128::from(remaining) * u128::from(weight) + total) / (2 * total);
        // offered <= remaining, so it always fits back into u64
        let mut add = u64::try_from(offered).unwrap_or(remaining);
        if let Some(cap) = share.cap {
            add = add.min(cap.saturating_sub(share.cylinders));
        }
        add = add.min(remaining - consumed);
        share.cylinders += add;
        consumed += add;
    }
    consumed
}

/// Grow the placements of every free region into its unused cylinders.
pub fn normalize_gaps(req: &Requirements, gap: &mut GapInfo) {
    for region in gap.regions.iter_mut().filter(|r| !r.exists) {
        // Pass 1: growing partitions still short of their target
        let growing: Vec<usize> = region
            .placements
            .iter()
            .enumerate()
            .filter(|(_, pl)| {
                let part = &req.parts[pl.part];
                part.grow && part.want_cylinders.is_some_and(|want| want > pl.cylinders)
            })
            .map(|(i, _)| i)
            .collect();
        if !growing.is_empty() {
            let weights: Vec<u64> = growing
                .iter()
                .map(|&i| req.parts[region.placements[i].part].want_cylinders.unwrap_or(0))
                .collect();
            let mut shares: Vec<Share> = growing
                .iter()
                .map(|&i| {
                    let part = &req.parts[region.placements[i].part];
                    let cap = match (part.want_cylinders, part.max_cylinders) {
                        (Some(want), Some(max)) => Some(want.min(max)),
                        (want, max) => want.or(max),
                    };
                    Share { cylinders: region.placements[i].cylinders, cap }
                })
                .collect();
            distribute(region.remaining(), &weights, &mut shares);
            for (&i, share) in growing.iter().zip(&shares) {
                region.placements[i].cylinders = share.cylinders;
            }
        }

        // Pass 2: partitions without an explicit size take the rest
        let maximizing: Vec<usize> = region
            .placements
            .iter()
            .enumerate()
            .filter(|(_, pl)| req.parts[pl.part].maximizes())
            .map(|(i, _)| i)
            .collect();
        if !maximizing.is_empty() {
            let weights = vec![1; maximizing.len()];
            let mut shares: Vec<Share> = maximizing
                .iter()
                .map(|&i| Share {
                    cylinders: region.placements[i].cylinders,
                    cap: req.parts[region.placements[i].part].max_cylinders,
                })
                .collect();
            distribute(region.remaining(), &weights, &mut shares);
            for (&i, share) in maximizing.iter().zip(&shares) {
                region.placements[i].cylinders = share.cylinders;
            }
        }
    }
}
