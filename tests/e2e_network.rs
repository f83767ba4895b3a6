//! End-to-end tests on the 10-agent synthetic-population fixture.
//!
//! The fixture mirrors a Piedmont micro-sample: sex, age, household role,
//! education, employment, income, workplace and household coordinates, and
//! a workplace-household code, typed `"cocccoggggo"`. The whole population
//! is used as the Lin sample (`sample_fraction = 1.0`).

use pretty_assertions::assert_eq;
use simnet_rs::{
    build_network, AttrValue, AttributeTable, MemorySink, NetworkConfig, Sample,
    SchedulingPolicy, SimilarityEngine, SimilarityParams,
};

fn fixture_row(values: (i64, i64, i64, i64, i64, i64, f64, f64, f64, f64, i64)) -> Vec<AttrValue> {
    let (sex, age, role, edu, employed, income, wp_lon, wp_lat, hh_lon, hh_lat, wp_hh) = values;
    vec![
        AttrValue::Int(sex),
        AttrValue::Int(age),
        AttrValue::Int(role),
        AttrValue::Int(edu),
        AttrValue::Int(employed),
        AttrValue::Int(income),
        AttrValue::Float(wp_lon),
        AttrValue::Float(wp_lat),
        AttrValue::Float(hh_lon),
        AttrValue::Float(hh_lat),
        AttrValue::Int(wp_hh),
    ]
}

fn fixture_table() -> AttributeTable {
    let names = vec![
        "sex".into(),
        "age".into(),
        "role".into(),
        "edu".into(),
        "employed".into(),
        "income".into(),
        "wp_lon".into(),
        "wp_lat".into(),
        "hh_lon".into(),
        "hh_lat".into(),
        "wp_hh".into(),
    ];
    let rows = vec![
        fixture_row((1, 75, 1, 0, -1, 15, 45.0723, 7.6859, 45.0723, 7.6859, 0)),
        fixture_row((0, 42, 1, 1, 10, 31, 45.0539, 7.6613, 45.0661, 7.6964, 3)),
        fixture_row((1, 57, 1, 1, 10, 28, 45.0661, 7.6887, 45.0661, 7.6964, 1)),
        fixture_row((1, 15, 0, 1, 2, 0, 45.0392, 7.7168, 45.0661, 7.6964, 3)),
        fixture_row((0, 0, 0, 0, 0, 0, 45.0661, 7.6964, 45.0661, 7.6964, 0)),
        fixture_row((1, 13, 0, 0, 2, 0, 45.0385, 7.7023, 45.0661, 7.6964, 3)),
        fixture_row((1, 21, 1, 2, -1, 0, 45.0558, 7.6605, 45.0558, 7.6605, 0)),
        fixture_row((1, 64, 1, 0, -1, 0, 45.0679, 7.6640, 45.0679, 7.6640, 0)),
        fixture_row((0, 62, 1, 1, 10, 28, 45.0530, 7.7068, 45.0679, 7.6640, 4)),
        fixture_row((0, 64, 1, 1, 10, 32, 45.0317, 7.6323, 45.0636, 7.6971, 6)),
    ];
    AttributeTable::new(names, "cocccoggggo", rows).unwrap()
}

fn fixture_config(workers: usize) -> NetworkConfig {
    NetworkConfig {
        half_similarity_scale: 5000.0,
        damping: 0.0,
        sample_fraction: 1.0,
        chunk_size: 7,
        workers,
        seed: Some(1),
        ..NetworkConfig::default()
    }
}

// ============================================================================
// 1. Every pairwise weight lies in [0, 1]
// ============================================================================

#[test]
fn all_pair_weights_are_probabilities() {
    let table = fixture_table();
    let sample = Sample::full(table.len());
    let engine = SimilarityEngine::new(&table, &sample, SimilarityParams::default()).unwrap();

    for i in 0..table.len() {
        for j in i + 1..table.len() {
            let w = engine.edge_weight(i, j);
            assert!((0.0..=1.0).contains(&w), "weight({i},{j}) = {w}");
        }
    }
}

// ============================================================================
// 2. The metric is symmetric
// ============================================================================

#[test]
fn edge_weight_is_symmetric() {
    let table = fixture_table();
    let sample = Sample::full(table.len());
    let engine = SimilarityEngine::new(&table, &sample, SimilarityParams::default()).unwrap();

    for i in 0..table.len() {
        for j in i + 1..table.len() {
            assert_eq!(engine.edge_weight(i, j), engine.edge_weight(j, i), "pair ({i},{j})");
        }
    }
}

// ============================================================================
// 3. Full run: 45 pairs evaluated, non-zero edges persisted
// ============================================================================

#[test]
fn full_run_covers_all_45_pairs() {
    let table = fixture_table();
    let sink = MemorySink::new();
    let summary = build_network(&fixture_config(2), &table, &sink).unwrap();

    assert_eq!(summary.pairs_evaluated(), 45);
    assert!(summary.edges_persisted() <= 45);
    assert_eq!(sink.all_edges().len() as u64, summary.edges_persisted());
    assert!(sink.is_finalized());
}

// ============================================================================
// 4. The sink holds exactly the positive-weight pairs, no extra, no missing
// ============================================================================

#[test]
fn persisted_set_matches_engine_output_exactly() {
    let table = fixture_table();
    let sample = Sample::full(table.len());
    let engine = SimilarityEngine::new(&table, &sample, SimilarityParams::default()).unwrap();

    let mut expected = Vec::new();
    for i in 0..table.len() {
        for j in i + 1..table.len() {
            let w = engine.edge_weight(i, j);
            if w > 0.0 {
                expected.push((i as i64, j as i64, w));
            }
        }
    }

    let sink = MemorySink::new();
    build_network(&fixture_config(3), &table, &sink).unwrap();
    let mut persisted: Vec<(i64, i64, f64)> =
        sink.all_edges().iter().map(|e| (e.src, e.trg, e.weight)).collect();
    persisted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    assert_eq!(persisted, expected);
}

// ============================================================================
// 5. Worker count and policy do not change the result set
// ============================================================================

#[test]
fn result_set_is_invariant_under_worker_count_and_policy() {
    let table = fixture_table();

    let mut runs = Vec::new();
    for workers in [1usize, 2, 5] {
        for policy in [SchedulingPolicy::Even, SchedulingPolicy::RoundRobin] {
            let sink = MemorySink::new();
            let config = NetworkConfig { scheduling_policy: policy, ..fixture_config(workers) };
            build_network(&config, &table, &sink).unwrap();
            let mut edges = sink.all_edges();
            edges.sort_by_key(|e| (e.src, e.trg));
            runs.push(edges);
        }
    }

    for run in &runs[1..] {
        assert_eq!(run, &runs[0]);
    }
}

// ============================================================================
// 6. Partial sample still yields a valid network
// ============================================================================

#[test]
fn partial_sample_on_larger_population_stays_in_range() {
    // 400 co-located agents with ascending ages: the 100-agent sample floor
    // kicks in (0.1 × 400 = 40 → 100) and unsampled agents exercise the
    // zero-equal-count fallbacks.
    let rows = (0..400)
        .map(|i| {
            vec![
                AttrValue::Int(i % 7),
                AttrValue::Int(i),
                AttrValue::Float(7.68),
                AttrValue::Float(45.07),
            ]
        })
        .collect();
    let table =
        AttributeTable::new(vec!["group".into(), "age".into(), "lon".into(), "lat".into()], "cogg", rows)
            .unwrap();

    let sink = MemorySink::new();
    let config = NetworkConfig { sample_fraction: 0.1, ..fixture_config(4) };
    let summary = build_network(&config, &table, &sink).unwrap();

    assert_eq!(summary.pairs_evaluated(), 400 * 399 / 2);
    for edge in sink.all_edges() {
        assert!(edge.weight > 0.0 && edge.weight <= 1.0, "{edge:?}");
        assert!(edge.src < edge.trg);
    }
}
