//! Representative sampling of the population.
//!
//! The Lin attribute term is evaluated against a fixed-size sample of agent
//! indices rather than the whole population. Every worker must hold a
//! bit-identical copy of that sample — otherwise per-pair weights would not
//! be comparable across workers — so one coordinator rank draws it and
//! distributes it through [`Broadcast`], the single pre-loop synchronization
//! point of a run.

use parking_lot::{Condvar, Mutex};
use rand::seq::index;
use rand::Rng;

use crate::{Error, Result};

/// Samples never go below this many agents (or the population size, if
/// smaller): tiny samples make the frequency estimates of the Lin term
/// meaningless.
pub const MIN_SAMPLE_SIZE: usize = 100;

// ============================================================================
// Sample
// ============================================================================

/// A subset of agent indices, drawn without replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    indices: Vec<usize>,
    /// `mask[agent] == true` iff the agent is in the sample.
    mask: Vec<bool>,
}

impl Sample {
    /// Draw `max(100, floor(n * fraction))` indices (clamped to `n`) from
    /// `0..n` without replacement. If the clamp reaches `n` the sample is
    /// the whole population and nothing is drawn.
    ///
    /// A negative or non-finite `fraction`, or an empty population, is a
    /// configuration error.
    pub fn select<R: Rng + ?Sized>(n: usize, fraction: f64, rng: &mut R) -> Result<Self> {
        if n == 0 {
            return Err(Error::Config("cannot sample an empty population".into()));
        }
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(Error::Config(format!(
                "sample_fraction must be a non-negative finite number, got {fraction}"
            )));
        }

        let sample_size = ((n as f64 * fraction).floor() as usize).max(MIN_SAMPLE_SIZE);
        if sample_size >= n {
            // Population is small: use it whole, no draw, no copy of attributes.
            return Ok(Self::full(n));
        }

        let mut indices = index::sample(rng, n, sample_size).into_vec();
        indices.sort_unstable();
        Ok(Self::from_indices(n, indices))
    }

    /// Build a sample from explicit indices (strictly increasing, all below
    /// `n`). Used when the sample is decided outside the selector — tests,
    /// or replaying a recorded run.
    pub fn from_sorted_indices(n: usize, indices: Vec<usize>) -> Result<Self> {
        if indices.is_empty() {
            return Err(Error::Config("sample must not be empty".into()));
        }
        let in_range = indices.iter().all(|&i| i < n);
        let strictly_increasing = indices.windows(2).all(|w| w[0] < w[1]);
        if !in_range || !strictly_increasing {
            return Err(Error::Config(
                "sample indices must be strictly increasing and within the population".into(),
            ));
        }
        Ok(Self::from_indices(n, indices))
    }

    /// The whole population as sample.
    pub fn full(n: usize) -> Self {
        Self {
            indices: (0..n).collect(),
            mask: vec![true; n],
        }
    }

    fn from_indices(n: usize, indices: Vec<usize>) -> Self {
        let mut mask = vec![false; n];
        for &idx in &indices {
            mask[idx] = true;
        }
        Self { indices, mask }
    }

    /// Sampled agent indices in increasing order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of sampled agents.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the sample covers the whole population.
    pub fn is_full(&self) -> bool {
        self.indices.len() == self.mask.len()
    }

    /// Membership test.
    pub fn contains(&self, agent: usize) -> bool {
        self.mask[agent]
    }
}

// ============================================================================
// Broadcast
// ============================================================================

/// Blocking distribute-once primitive: one rank publishes a value, every
/// rank receives an identical copy before proceeding.
///
/// In a single-worker run this degenerates to publish-then-wait on the same
/// thread, which never blocks.
pub struct Broadcast<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Publish the value. Called exactly once, by the coordinator rank.
    ///
    /// # Panics
    ///
    /// Panics on a second publish — two coordinators is a bug in the caller,
    /// not a recoverable condition.
    pub fn publish(&self, value: T) {
        let mut slot = self.slot.lock();
        assert!(slot.is_none(), "Broadcast::publish called twice");
        *slot = Some(value);
        self.ready.notify_all();
    }

    /// Block until the value is published, then return a clone of it.
    pub fn wait(&self) -> T {
        let mut slot = self.slot.lock();
        while slot.is_none() {
            self.ready.wait(&mut slot);
        }
        slot.as_ref().cloned().unwrap()
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn small_population_uses_whole_table() {
        let mut rng = StdRng::seed_from_u64(7);
        let s = Sample::select(10, 0.1, &mut rng).unwrap();
        assert!(s.is_full());
        assert_eq!(s.len(), 10);
    }

    #[test]
    fn floor_of_100_applies_below_threshold() {
        let mut rng = StdRng::seed_from_u64(7);
        // 0.1 × 500 = 50, clamped up to 100
        let s = Sample::select(500, 0.1, &mut rng).unwrap();
        assert_eq!(s.len(), 100);
        assert!(!s.is_full());
    }

    #[test]
    fn fraction_drives_size_above_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        let s = Sample::select(10_000, 0.05, &mut rng).unwrap();
        assert_eq!(s.len(), 500);
    }

    #[test]
    fn sample_is_without_replacement_and_sorted() {
        let mut rng = StdRng::seed_from_u64(42);
        let s = Sample::select(5_000, 0.1, &mut rng).unwrap();
        let idx = s.indices();
        assert!(idx.windows(2).all(|w| w[0] < w[1]));
        assert!(idx.iter().all(|&i| i < 5_000 && s.contains(i)));
    }

    #[test]
    fn negative_fraction_is_config_error() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(Sample::select(1_000, -0.1, &mut rng).is_err());
    }

    #[test]
    fn empty_population_is_config_error() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(Sample::select(0, 0.1, &mut rng).is_err());
    }

    #[test]
    fn zero_fraction_clamps_to_floor_not_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let s = Sample::select(1_000, 0.0, &mut rng).unwrap();
        assert_eq!(s.len(), MIN_SAMPLE_SIZE);
    }

    #[test]
    fn broadcast_delivers_identical_copies() {
        let bc: Arc<Broadcast<Vec<usize>>> = Arc::new(Broadcast::new());
        let value = vec![1, 2, 3, 5, 8];

        let mut handles = Vec::new();
        for _ in 0..4 {
            let bc = Arc::clone(&bc);
            handles.push(std::thread::spawn(move || bc.wait()));
        }
        bc.publish(value.clone());

        for h in handles {
            assert_eq!(h.join().unwrap(), value);
        }
        // Coordinator consumes its own copy too.
        assert_eq!(bc.wait(), value);
    }
}
