//! Partitioning of the pair space.
//!
//! All `N·(N-1)/2` unordered agent pairs form the upper triangle of an
//! `N×N` matrix, flattened row-major. Each worker derives its own share of
//! that space from `(policy, n, rank, world)` alone — closed formulas, no
//! coordinator round-trip, no scattered boundary table — so shares are
//! stateless, restartable, and provably a partition.
//!
//! ```text
//! n = 5, row-major upper triangle, pos 0..10:
//!
//!       j=1  j=2  j=3  j=4
//! i=0 [  0    1    2    3 ]
//! i=1 [       4    5    6 ]
//! i=2 [            7    8 ]
//! i=3 [                 9 ]
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::{Error, Result};

// ============================================================================
// SchedulingPolicy
// ============================================================================

/// How the pair space is split between workers. Closed enum dispatched by
/// `match` — an unrecognized name fails at parse time, never silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Contiguous blocks of the flat pair array, sizes `⌈total/W⌉` for the
    /// first `total mod W` workers and `⌊total/W⌋` for the rest.
    #[default]
    Even,
    /// Worker `r` owns rows `r, r+W, r+2W, …`; strided but still an exact
    /// partition.
    RoundRobin,
}

impl FromStr for SchedulingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "even" => Ok(SchedulingPolicy::Even),
            "round_robin" => Ok(SchedulingPolicy::RoundRobin),
            other => Err(Error::UnknownPolicy { name: other.to_string() }),
        }
    }
}

// ============================================================================
// Index geometry
// ============================================================================

/// Total number of unordered pairs for a population of `n`.
pub fn num_pairs(n: usize) -> u64 {
    let n = n as u64;
    if n < 2 {
        return 0;
    }
    n * (n - 1) / 2
}

/// Convert a linear position in the row-major upper triangle to `(i, j)`.
///
/// `pos == num_pairs(n)` is a valid one-past-the-end sentinel and maps to
/// `(n-1, n)`.
pub fn pos_to_ij(n: usize, pos: u64) -> (usize, usize) {
    let nf = n as f64;
    let i = (nf - ((nf - 0.5) * (nf - 0.5) - 2.0 * pos as f64).sqrt() - 0.5).floor() as i64;
    let j = pos as i64 + i * (i + 1) / 2 - i * (n as i64 - 1) + 1;
    (i as usize, j as usize)
}

/// Convert `(i, j)` with `i < j` to its linear position in the row-major
/// upper triangle. Inverse of [`pos_to_ij`].
pub fn ij_to_pos(n: usize, i: usize, j: usize) -> u64 {
    let (n, i, j) = (n as i64, i as i64, j as i64);
    (i * n - i * (i + 3) / 2 + j) as u64
}

// ============================================================================
// PairShare
// ============================================================================

/// Lazy iterator over one worker's share of the pair space, in increasing
/// row-major order. Stateless function of its inputs: re-creating it
/// restarts the same enumeration.
#[derive(Debug, Clone)]
pub struct PairShare {
    n: usize,
    kind: ShareKind,
}

#[derive(Debug, Clone)]
enum ShareKind {
    /// Walk from `(i, j)` until `(end_i, end_j)` exclusive.
    Even { i: usize, j: usize, end_i: usize, end_j: usize },
    /// Strided rows; `world` is the row stride.
    RoundRobin { i: usize, j: usize, world: usize },
}

/// This worker's share of the `n·(n-1)/2` pair space.
///
/// `world == 0` or `rank >= world` is a configuration error.
pub fn share(policy: SchedulingPolicy, n: usize, rank: usize, world: usize) -> Result<PairShare> {
    if world == 0 {
        return Err(Error::Config("worker count must be at least 1".into()));
    }
    if rank >= world {
        return Err(Error::Config(format!(
            "worker rank {rank} out of range for {world} workers"
        )));
    }

    let kind = match policy {
        SchedulingPolicy::Even => {
            let total = num_pairs(n);
            if total == 0 {
                return Ok(PairShare {
                    n,
                    kind: ShareKind::Even { i: 0, j: 0, end_i: 0, end_j: 0 },
                });
            }
            let per = total / world as u64;
            let rem = total % world as u64;
            let (start, end) = if (rank as u64) < rem {
                ((per + 1) * rank as u64, (per + 1) * (rank as u64 + 1))
            } else {
                let start = per * rank as u64 + rem;
                (start, start + per)
            };
            let (i, j) = pos_to_ij(n, start);
            let (end_i, end_j) = pos_to_ij(n, end);
            info!(rank, start, end, "even share: couples {:?}..{:?}", (i, j), (end_i, end_j));
            ShareKind::Even { i, j, end_i, end_j }
        }
        SchedulingPolicy::RoundRobin => {
            info!(rank, world, "round-robin share: rows {rank}, {}, …", rank + world);
            ShareKind::RoundRobin { i: rank, j: rank + 1, world }
        }
    };

    Ok(PairShare { n, kind })
}

impl Iterator for PairShare {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        let n = self.n;
        match &mut self.kind {
            ShareKind::Even { i, j, end_i, end_j } => {
                if *i == *end_i && *j == *end_j {
                    return None;
                }
                let out = (*i, *j);
                *j += 1;
                if *j == n {
                    *i += 1;
                    *j = *i + 1;
                }
                Some(out)
            }
            ShareKind::RoundRobin { i, j, world } => {
                while *i < n {
                    if *j < n {
                        let out = (*i, *j);
                        *j += 1;
                        return Some(out);
                    }
                    *i += *world;
                    *j = *i + 1;
                }
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn all_pairs(n: usize) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                pairs.push((i, j));
            }
        }
        pairs
    }

    #[test]
    fn bijection_roundtrip_small_dims() {
        for n in [2usize, 3, 10, 137] {
            for (pos, (i, j)) in all_pairs(n).into_iter().enumerate() {
                assert_eq!(ij_to_pos(n, i, j), pos as u64, "n={n} ({i},{j})");
                assert_eq!(pos_to_ij(n, pos as u64), (i, j), "n={n} pos={pos}");
            }
        }
    }

    #[test]
    fn end_sentinel_maps_past_last_row() {
        for n in [2usize, 10, 137] {
            assert_eq!(pos_to_ij(n, num_pairs(n)), (n - 1, n));
        }
    }

    #[test]
    fn even_shares_partition_exactly() {
        for n in [2usize, 3, 7, 50] {
            for world in [1usize, 2, 3, 4, 7, 11] {
                let mut seen = Vec::new();
                for rank in 0..world {
                    seen.extend(share(SchedulingPolicy::Even, n, rank, world).unwrap());
                }
                assert_eq!(seen.len() as u64, num_pairs(n), "n={n} world={world}");
                let mut sorted = seen.clone();
                sorted.sort_unstable();
                sorted.dedup();
                assert_eq!(sorted, all_pairs(n), "n={n} world={world}");
            }
        }
    }

    #[test]
    fn round_robin_shares_partition_exactly() {
        for n in [2usize, 3, 7, 50] {
            for world in [1usize, 2, 3, 4, 7, 11] {
                let mut seen = Vec::new();
                for rank in 0..world {
                    seen.extend(share(SchedulingPolicy::RoundRobin, n, rank, world).unwrap());
                }
                seen.sort_unstable();
                seen.dedup();
                assert_eq!(seen, all_pairs(n), "n={n} world={world}");
            }
        }
    }

    #[test]
    fn even_shares_are_balanced_within_one() {
        let n = 1000;
        let world = 4;
        let counts: Vec<usize> = (0..world)
            .map(|rank| share(SchedulingPolicy::Even, n, rank, world).unwrap().count())
            .collect();
        assert_eq!(counts.iter().sum::<usize>() as u64, num_pairs(n));
        let min = counts.iter().min().unwrap();
        let max = counts.iter().max().unwrap();
        assert!(max - min <= 1, "counts {counts:?}");
    }

    #[test]
    fn shares_enumerate_in_row_major_order() {
        for policy in [SchedulingPolicy::Even, SchedulingPolicy::RoundRobin] {
            let pairs: Vec<_> = share(policy, 30, 1, 3).unwrap().collect();
            for w in pairs.windows(2) {
                assert!(
                    ij_to_pos(30, w[0].0, w[0].1) < ij_to_pos(30, w[1].0, w[1].1),
                    "{policy:?}: {:?} before {:?}",
                    w[0],
                    w[1]
                );
            }
        }
    }

    #[test]
    fn more_workers_than_pairs_leaves_tail_ranks_empty_not_wrong() {
        // n=3 has 3 pairs, 5 workers: 3 singleton shares + 2 empty ones.
        let counts: Vec<usize> = (0..5)
            .map(|rank| share(SchedulingPolicy::Even, 3, rank, 5).unwrap().count())
            .collect();
        assert_eq!(counts.iter().sum::<usize>(), 3);
        assert!(counts.iter().all(|&c| c <= 1));
    }

    #[test]
    fn policy_parses_by_name() {
        assert_eq!("even".parse::<SchedulingPolicy>().unwrap(), SchedulingPolicy::Even);
        assert_eq!(
            "round_robin".parse::<SchedulingPolicy>().unwrap(),
            SchedulingPolicy::RoundRobin
        );
        assert!(matches!(
            "fair".parse::<SchedulingPolicy>(),
            Err(Error::UnknownPolicy { .. })
        ));
    }

    #[test]
    fn invalid_rank_or_world_is_config_error() {
        assert!(share(SchedulingPolicy::Even, 10, 0, 0).is_err());
        assert!(share(SchedulingPolicy::Even, 10, 4, 4).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn roundtrip_random_positions(n in 2usize..5_000, frac in 0.0f64..1.0) {
                let pos = (num_pairs(n) as f64 * frac) as u64;
                let pos = pos.min(num_pairs(n) - 1);
                let (i, j) = pos_to_ij(n, pos);
                prop_assert!(i < j && j < n);
                prop_assert_eq!(ij_to_pos(n, i, j), pos);
            }

            #[test]
            fn even_share_sizes_sum_to_total(n in 2usize..400, world in 1usize..16) {
                let total: usize = (0..world)
                    .map(|rank| share(SchedulingPolicy::Even, n, rank, world).unwrap().count())
                    .sum();
                prop_assert_eq!(total as u64, num_pairs(n));
            }
        }
    }
}
