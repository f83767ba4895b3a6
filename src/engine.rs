//! The driver: a fixed group of worker threads evaluating the pair space.
//!
//! Control flow per run:
//!
//! 1. validate configuration — all configuration errors surface before any
//!    worker starts;
//! 2. rank 0 draws the [`Sample`] and publishes it through [`Broadcast`]
//!    (synchronization point 1);
//! 3. every rank derives its own share from the closed-form scheduler and
//!    streams `(i, j, edge_weight(i, j))` through a [`ResultWriter`] into
//!    its exclusively-owned sink region — embarrassingly parallel, no
//!    communication;
//! 4. a collective barrier, then rank 0 finalizes the sink with the true
//!    per-region counts (synchronization point 2).
//!
//! There is no work-stealing, no dynamic spawning, no recovery: a worker
//! failure invalidates the whole run. Memory and swap pressure are logged
//! advisorily and never throttle the computation.

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{info, warn};

use crate::model::AttributeTable;
use crate::sample::{Broadcast, Sample};
use crate::schedule::{share, SchedulingPolicy};
use crate::similarity::{SimilarityEngine, SimilarityParams};
use crate::writer::{EdgeSink, ResultWriter, StreamStats};
use crate::{Error, Result};

// ============================================================================
// NetworkConfig
// ============================================================================

/// Recognized run options, deserializable from JSON with per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Distance in meters at which geo-damping halves similarity.
    pub half_similarity_scale: f64,
    /// `0` selects exponential damping; any positive value power-law.
    pub damping: f64,
    /// Fraction of the population sampled for the Lin term.
    pub sample_fraction: f64,
    /// Buffer/flush granularity of the result writer, in records.
    pub chunk_size: usize,
    /// How the pair space is split between workers.
    pub scheduling_policy: SchedulingPolicy,
    /// Worker count; `0` means one per available hardware thread.
    pub workers: usize,
    /// RNG seed for the sample draw; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            half_similarity_scale: 5000.0,
            damping: 0.0,
            sample_fraction: 0.1,
            chunk_size: 10_000,
            scheduling_policy: SchedulingPolicy::Even,
            workers: 0,
            seed: None,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        self.similarity_params().validate()?;
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if !self.sample_fraction.is_finite() || self.sample_fraction < 0.0 {
            return Err(Error::Config(format!(
                "sample_fraction must be a non-negative finite number, got {}",
                self.sample_fraction
            )));
        }
        Ok(())
    }

    pub fn similarity_params(&self) -> SimilarityParams {
        SimilarityParams {
            half_similarity_scale: self.half_similarity_scale,
            damping: self.damping,
        }
    }

    /// Worker count with `0` resolved to the available hardware parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }
    }
}

// ============================================================================
// NetworkSummary
// ============================================================================

/// Outcome of one completed run.
#[derive(Debug, Clone)]
pub struct NetworkSummary {
    /// Per-rank stream statistics, indexed by worker rank.
    pub per_worker: Vec<StreamStats>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl NetworkSummary {
    /// Pairs evaluated across all workers; equals `N·(N-1)/2`.
    pub fn pairs_evaluated(&self) -> u64 {
        self.per_worker.iter().map(|s| s.evaluated).sum()
    }

    /// Non-zero edges persisted across all workers.
    pub fn edges_persisted(&self) -> u64 {
        self.per_worker.iter().map(|s| s.persisted).sum()
    }
}

// ============================================================================
// build_network
// ============================================================================

/// Evaluate every unordered agent pair and persist the non-zero edges.
///
/// Blocks until the run completes. Any worker failure aborts the whole run;
/// chunks flushed before the failure remain in the sink but the sink is not
/// finalized.
pub fn build_network<S: EdgeSink>(
    config: &NetworkConfig,
    table: &AttributeTable,
    sink: &S,
) -> Result<NetworkSummary> {
    config.validate()?;
    if table.len() < 2 {
        return Err(Error::Config(format!(
            "similarity network needs at least 2 agents, table has {}",
            table.len()
        )));
    }

    let world = config.effective_workers();
    let n = table.len();
    info!(
        agents = n,
        workers = world,
        policy = ?config.scheduling_policy,
        "starting pairwise evaluation"
    );
    advise_resource_pressure();

    let start = Instant::now();
    let broadcast: Broadcast<Option<Sample>> = Broadcast::new();
    let all_written = std::sync::Barrier::new(world);
    let results: Mutex<Vec<Option<Result<StreamStats>>>> = Mutex::new((0..world).map(|_| None).collect());
    let finalize_result: Mutex<Option<Result<()>>> = Mutex::new(None);

    thread::scope(|scope| {
        for rank in 0..world {
            let broadcast = &broadcast;
            let all_written = &all_written;
            let results = &results;
            let finalize_result = &finalize_result;
            let sink: &dyn EdgeSink = sink;

            scope.spawn(move || {
                // Synchronization point 1: the coordinator draws the sample,
                // everyone blocks until an identical copy arrives.
                let sample = if rank == 0 {
                    let mut rng = match config.seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_entropy(),
                    };
                    let drawn = Sample::select(n, config.sample_fraction, &mut rng);
                    match drawn {
                        Ok(sample) => {
                            info!(sample_size = sample.len(), "sample selected");
                            broadcast.publish(Some(sample.clone()));
                            Some(sample)
                        }
                        Err(err) => {
                            broadcast.publish(None);
                            results.lock()[rank] = Some(Err(err));
                            None
                        }
                    }
                } else {
                    broadcast.wait()
                };

                // Evaluation loop. Errors are recorded rather than returned
                // and panics are caught (leaving the slot empty), so the
                // closing barrier is always reached and no rank deadlocks.
                if let Some(sample) = sample {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        evaluate_share(config, table, &sample, sink, rank, world)
                    }));
                    if let Ok(outcome) = outcome {
                        results.lock()[rank] = Some(outcome);
                    }
                } else if rank != 0 {
                    results.lock()[rank] =
                        Some(Err(Error::Config("sample selection failed on rank 0".into())));
                }

                // Synchronization point 2: collective close. Rank 0 fixes
                // the true per-region extents once everyone is done.
                all_written.wait();
                if rank == 0 {
                    let results = results.lock();
                    let counts: Option<Vec<u64>> = results
                        .iter()
                        .map(|slot| match slot {
                            Some(Ok(stats)) => Some(stats.persisted),
                            _ => None,
                        })
                        .collect();
                    if let Some(counts) = counts {
                        *finalize_result.lock() = Some(sink.finalize(&counts));
                    }
                }
            });
        }
    });

    // All threads joined (a panicked worker leaves its slot empty).
    let results = results.into_inner();
    let mut per_worker = Vec::with_capacity(world);
    for (rank, slot) in results.into_iter().enumerate() {
        match slot {
            Some(Ok(stats)) => per_worker.push(stats),
            Some(Err(err)) => return Err(err),
            None => return Err(Error::WorkerFailed { rank }),
        }
    }
    match finalize_result.into_inner() {
        Some(Ok(())) => {}
        Some(Err(err)) => return Err(err),
        None => return Err(Error::Sink("sink was never finalized".into())),
    }

    let summary = NetworkSummary { per_worker, elapsed: start.elapsed() };
    info!(
        pairs = summary.pairs_evaluated(),
        edges = summary.edges_persisted(),
        elapsed = ?summary.elapsed,
        "network complete"
    );
    Ok(summary)
}

/// One worker's evaluation loop: derive the share, bind the engine, stream
/// weighted pairs into the sink region.
fn evaluate_share(
    config: &NetworkConfig,
    table: &AttributeTable,
    sample: &Sample,
    sink: &dyn EdgeSink,
    rank: usize,
    world: usize,
) -> Result<StreamStats> {
    let engine = SimilarityEngine::new(table, sample, config.similarity_params())?;
    let pairs = share(config.scheduling_policy, table.len(), rank, world)?;
    let writer = ResultWriter::new(sink, rank, config.chunk_size)?;
    writer.write_stream(pairs.map(|(i, j)| (i, j, engine.edge_weight(i, j))))
}

// ============================================================================
// Resource advisory
// ============================================================================

/// Available-memory floor below which a warning is logged (100 MB).
const LOW_MEMORY_BYTES: u64 = 100 * 1024 * 1024;

/// Swap-usage fraction above which a warning is logged.
const HIGH_SWAP_FRACTION: f64 = 0.9;

/// Minimum interval between refreshes of the cached system snapshot.
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

struct CachedSystem {
    system: System,
    last_refresh: Instant,
}

static SYSTEM: OnceLock<Mutex<CachedSystem>> = OnceLock::new();

/// Log advisory warnings when memory or swap run low. Never throttles,
/// never fails; rate-limited by a shared cached snapshot.
pub(crate) fn advise_resource_pressure() {
    let mut cached = SYSTEM
        .get_or_init(|| {
            let mut system = System::new();
            system.refresh_memory();
            Mutex::new(CachedSystem { system, last_refresh: Instant::now() })
        })
        .lock();

    if cached.last_refresh.elapsed() >= REFRESH_INTERVAL {
        cached.system.refresh_memory();
        cached.last_refresh = Instant::now();
    }

    let available = cached.system.available_memory();
    if available <= LOW_MEMORY_BYTES {
        warn!(available_kb = available / 1024, "running low on memory");
    }
    let total_swap = cached.system.total_swap();
    if total_swap > 0 {
        let swap_used = cached.system.used_swap() as f64 / total_swap as f64;
        if swap_used > HIGH_SWAP_FRACTION {
            warn!(swap_used_pct = (swap_used * 100.0) as u64, "swap is nearly full");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
