//! # Geo-damped Lin similarity
//!
//! The edge weight of a pair of agents is the product of two independent
//! contributions:
//!
//! - a **geo term**: the probability induced by the geographic distance
//!   between the agents' closest matching locations (household↔household,
//!   workplace↔workplace, never household↔workplace), damped by distance;
//! - a **Lin term**: an information-theoretic similarity — the rarer the
//!   attribute combination two agents share within a reference sample, the
//!   more informative (and the higher-scoring) the match.
//!
//! Attributes are dependent, so the Lin term estimates the joint frequency
//! of the whole shared combination at once instead of summing per-attribute
//! contributions.
//!
//! # Degenerate cases
//!
//! These are expected and frequent, handled by formulas, never by errors:
//!
//! | Case | Handling |
//! |------|----------|
//! | `prob_geo ≤ 1e-6` | return exactly `0`, skip the Lin term |
//! | `num_similar == 0` | return `prob_geo` unscaled (see below) |
//! | `num_equal_a/b == 0` | treat the agent as unique in the population |
//!
//! The `num_similar == 0` branch is a documented anomaly inherited from the
//! reference implementation: a fully-disjoint attribute profile intuitively
//! carries maximal information, yet the geo term is returned unscaled rather
//! than zeroed. Preserved for compatibility.

use smallvec::SmallVec;
use tracing::debug;

use crate::model::{AttrType, AttrValue, AttributeTable};
use crate::sample::Sample;
use crate::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Earth radius in meters.
pub const R_EARTH_M: f64 = 6.3781e6;

/// Pairs whose geo-induced probability falls at or below this bound are
/// dropped without evaluating the Lin term. Evaluated for every one of the
/// `O(N²)` pairs, so this pruning carries the run.
pub const SIMILARITY_THRESHOLD: f64 = 1e-6;

// ============================================================================
// SimilarityParams
// ============================================================================

/// Tuning knobs of the metric.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityParams {
    /// Distance (meters) at which geo-damping halves similarity.
    pub half_similarity_scale: f64,
    /// `0` selects exponential damping `2^(-d/hss)`; any positive value
    /// selects power-law damping `(1 + d/hss_0)^(-damping)`.
    pub damping: f64,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self { half_similarity_scale: 5000.0, damping: 0.0 }
    }
}

impl SimilarityParams {
    pub fn validate(&self) -> Result<()> {
        if !self.half_similarity_scale.is_finite() || self.half_similarity_scale <= 0.0 {
            return Err(Error::Config(format!(
                "half_similarity_scale must be positive, got {}",
                self.half_similarity_scale
            )));
        }
        if !self.damping.is_finite() || self.damping < 0.0 {
            return Err(Error::Config(format!(
                "damping must be non-negative, got {}",
                self.damping
            )));
        }
        Ok(())
    }

    /// Normalization constant `hss_0`, chosen so the damping function
    /// equals one-half at distance `half_similarity_scale`:
    /// `hss` itself for damping 0 or 1, `hss / (2^damping - 1)` otherwise.
    fn hss_0(&self) -> f64 {
        if self.damping == 0.0 || self.damping == 1.0 {
            self.half_similarity_scale
        } else {
            self.half_similarity_scale / (self.damping.exp2() - 1.0)
        }
    }
}

// ============================================================================
// SimilarityEngine
// ============================================================================

/// One (lon, lat) location type, pre-converted to radians over the whole
/// table.
#[derive(Debug, Clone)]
struct Location {
    lon: Vec<f64>,
    lat: Vec<f64>,
}

/// The pure pair metric, bound to an attribute table and a sample.
///
/// Construction pre-groups columns by type and pre-extracts the sampled
/// slices; [`edge_weight`](SimilarityEngine::edge_weight) is then a pure
/// function of two agent indices.
pub struct SimilarityEngine<'a> {
    table: &'a AttributeTable,
    sample: &'a Sample,
    damping: f64,
    /// `R_EARTH / hss_0`: converts angular separation to the adimensional
    /// damping argument.
    geo_scaling: f64,
    categorical_cols: Vec<usize>,
    ordinal_cols: Vec<usize>,
    /// Usually two location types: household and workplace.
    locations: SmallVec<[Location; 2]>,
    /// Per categorical column, the sampled values.
    sampled_categorical: Vec<Vec<AttrValue>>,
    /// Per ordinal column, the sampled values as f64.
    sampled_ordinal: Vec<Vec<f64>>,
}

impl<'a> SimilarityEngine<'a> {
    pub fn new(table: &'a AttributeTable, sample: &'a Sample, params: SimilarityParams) -> Result<Self> {
        params.validate()?;
        if table.len() < 2 {
            return Err(Error::Config(format!(
                "similarity network needs at least 2 agents, table has {}",
                table.len()
            )));
        }

        let categorical_cols = table.columns_of_type(AttrType::Categorical);
        let ordinal_cols = table.columns_of_type(AttrType::Ordinal);
        let geo_cols = table.columns_of_type(AttrType::Geographic);
        debug!(
            categorical = categorical_cols.len(),
            ordinal = ordinal_cols.len(),
            locations = geo_cols.len() / 2,
            "attribute groups"
        );

        // Geographic columns come in (lon, lat) pairs; convert once.
        let locations = geo_cols
            .chunks_exact(2)
            .map(|pair| Location {
                lon: table.column(pair[0]).iter().map(|v| v.as_f64().to_radians()).collect(),
                lat: table.column(pair[1]).iter().map(|v| v.as_f64().to_radians()).collect(),
            })
            .collect();

        let sampled_categorical = categorical_cols
            .iter()
            .map(|&col| {
                let values = table.column(col);
                sample.indices().iter().map(|&s| values[s]).collect()
            })
            .collect();
        let sampled_ordinal = ordinal_cols
            .iter()
            .map(|&col| {
                let values = table.column(col);
                sample.indices().iter().map(|&s| values[s].as_f64()).collect()
            })
            .collect();

        Ok(Self {
            table,
            sample,
            damping: params.damping,
            geo_scaling: R_EARTH_M / params.hss_0(),
            categorical_cols,
            ordinal_cols,
            locations,
            sampled_categorical,
            sampled_ordinal,
        })
    }

    /// Population size.
    pub fn num_agents(&self) -> usize {
        self.table.len()
    }

    /// Sample size.
    pub fn sample_size(&self) -> usize {
        self.sample.len()
    }

    /// Minimum great-circle angular distance between matching location
    /// types of the two agents (household↔household, workplace↔workplace).
    fn min_angular_distance(&self, a: usize, b: usize) -> f64 {
        let mut min_dist = f64::INFINITY;
        for loc in &self.locations {
            let (lat1, lat2) = (loc.lat[a], loc.lat[b]);
            let dlon = loc.lon[a] - loc.lon[b];
            // Vincenty form of the great-circle distance: numerically stable
            // at both tiny and antipodal separations.
            let y = ((lat2.cos() * dlon.sin()).powi(2)
                + (lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos()).powi(2))
            .sqrt();
            let x = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos();
            min_dist = min_dist.min(y.atan2(x));
        }
        min_dist
    }

    /// Probability contribution of geographic distance.
    fn prob_geo(&self, a: usize, b: usize) -> f64 {
        let scaled = self.geo_scaling * self.min_angular_distance(a, b);
        if self.damping > 0.0 {
            (1.0 + scaled).powf(-self.damping)
        } else {
            (-scaled).exp2()
        }
    }

    /// Edge weight of the unordered pair `(a, b)`.
    ///
    /// Symmetric in its arguments and within `[0, 1]` in the non-degenerate
    /// case.
    pub fn edge_weight(&self, a: usize, b: usize) -> f64 {
        let prob_geo = self.prob_geo(a, b);

        // Geographically irrelevant pairs never pay for the Lin term.
        if prob_geo <= SIMILARITY_THRESHOLD {
            return 0.0;
        }

        // "Similar nodes": sample members compatible with every constraint
        // the pair imposes. A shared categorical value constrains to equal
        // values; an ordinal attribute constrains to the inclusive range
        // between the two agents' values; a differing categorical imposes
        // nothing.
        let mut similar = vec![true; self.sample.len()];

        for (values, &col) in self.sampled_categorical.iter().zip(&self.categorical_cols) {
            let va = self.table.value(a, col);
            let vb = self.table.value(b, col);
            if va.same(vb) {
                for (mask, &sv) in similar.iter_mut().zip(values) {
                    *mask &= sv.same(va);
                }
            }
        }

        for (values, &col) in self.sampled_ordinal.iter().zip(&self.ordinal_cols) {
            let va = self.table.value(a, col).as_f64();
            let vb = self.table.value(b, col).as_f64();
            let (lo, hi) = if va <= vb { (va, vb) } else { (vb, va) };
            for (mask, &sv) in similar.iter_mut().zip(values) {
                *mask &= lo <= sv && sv <= hi;
            }
        }

        let num_similar = similar.iter().filter(|&&m| m).count();

        // Nobody in the sample shares the pair's combination: the geo term
        // is returned unscaled. Inherited anomaly, kept for compatibility.
        if num_similar == 0 {
            return prob_geo;
        }

        // Frequency of each agent's complete attribute vector in the sample.
        // A zero count is read as "this combination is unique in the whole
        // population" — a conservative, similarity-under-estimating guess.
        let num_equal_a = self.count_equal(a);
        let num_equal_b = self.count_equal(b);

        let num_sample = self.sample.len() as f64;
        let num_total = self.table.len() as f64;
        let mut prob_lin = (num_sample / num_similar as f64).ln();
        prob_lin /= match (num_equal_a, num_equal_b) {
            (0, 0) => num_total.ln(),
            (0, eb) => 0.5 * (num_sample * num_total / eb as f64).ln(),
            (ea, 0) => (num_sample * num_total / ea as f64).ln(),
            (ea, eb) => (num_sample * num_sample / (ea as f64 * eb as f64)).ln(),
        };

        prob_geo * prob_lin
    }

    /// Count sample members whose entire attribute vector equals `agent`'s.
    fn count_equal(&self, agent: usize) -> usize {
        self.sample
            .indices()
            .iter()
            .filter(|&&s| self.table.records_equal(agent, s))
            .count()
    }
}

// ============================================================================
// Tests
// ============================================================================
