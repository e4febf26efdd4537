//! Integration tests for hamlet-core
//!
//! These tests run the full pipeline on synthetic settlements:
//! - Cardinality of hamlets and member counts
//! - Population invariants between buildings and hamlets
//! - Reproducibility under fixed seeds

use geo::{polygon, MultiPolygon};
use hamlet_core::{
    AdminBoundary, BuildingPoint, ClusterId, Pipeline, PipelineConfig, SeedPolicy,
    SynthesisConfig, UnitId, UnitStatistics,
};
use std::collections::HashMap;

/// Deterministic pseudo-random offsets, independent of the crate's RNG
fn jitter(seed: u64) -> f64 {
    let s = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((s >> 33) as f64) / ((1u64 << 31) as f64) - 0.5
}

/// `villages` clusters of `per_village` buildings spread over a 100x100 area
fn settlement(villages: usize, per_village: usize) -> Vec<BuildingPoint> {
    let mut points = Vec::with_capacity(villages * per_village);
    for v in 0..villages {
        let cx = 5.0 + (v % 5) as f64 * 20.0;
        let cy = 5.0 + (v / 5) as f64 * 20.0;
        for i in 0..per_village {
            let n = (v * per_village + i) as u64;
            points.push(BuildingPoint::new(
                format!("BLD-{n:06}"),
                cx + jitter(n * 2),
                cy + jitter(n * 2 + 1),
            ));
        }
    }
    points
}

fn halves() -> (Vec<AdminBoundary>, Vec<UnitStatistics>) {
    let west = AdminBoundary {
        id: UnitId::from("0101"),
        name: "West".to_string(),
        geometry: MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 50.0, y: 0.0),
            (x: 50.0, y: 100.0),
            (x: 0.0, y: 100.0),
        ]]),
    };
    let east = AdminBoundary {
        id: UnitId::from("0102"),
        name: "East".to_string(),
        geometry: MultiPolygon(vec![polygon![
            (x: 50.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 50.0, y: 100.0),
        ]]),
    };
    let stats = vec![
        UnitStatistics {
            unit_id: UnitId::from("0101"),
            mean_household_size: 5.0,
            total_population: 1000,
        },
        UnitStatistics {
            unit_id: UnitId::from("0102"),
            mean_household_size: 4.0,
            total_population: 24,
        },
    ];
    (vec![west, east], stats)
}

#[test]
fn test_510_points_make_10_hamlets() {
    let points = settlement(10, 51);
    assert_eq!(points.len(), 510);
    let (boundaries, stats) = halves();

    let out = Pipeline::new(PipelineConfig::default())
        .run(&points, &boundaries, &stats, None)
        .unwrap();

    assert_eq!(out.report.k, 10);
    assert_eq!(out.hamlets.len(), 10);
    assert_eq!(out.hamlets.iter().map(|h| h.member_count).sum::<usize>(), 510);
    assert!(out.report.converged);

    let ids: Vec<ClusterId> = out.hamlets.iter().map(|h| h.cluster_id).collect();
    assert_eq!(ids, (1..=10).map(ClusterId).collect::<Vec<_>>());
}

#[test]
fn test_population_equals_member_size_sum() {
    let points = settlement(10, 51);
    let (boundaries, stats) = halves();
    let out = Pipeline::new(PipelineConfig::default())
        .run(&points, &boundaries, &stats, None)
        .unwrap();

    let mut sums: HashMap<ClusterId, u64> = HashMap::new();
    for b in &out.buildings {
        let cluster = b.cluster.expect("every building is clustered");
        *sums.entry(cluster).or_default() += u64::from(b.household_size.unwrap_or(0));
    }
    for hamlet in &out.hamlets {
        assert_eq!(
            hamlet.population_estimate,
            sums.get(&hamlet.cluster_id).copied().unwrap_or(0)
        );
    }
    assert_eq!(
        out.report.total_population,
        out.hamlets.iter().map(|h| h.population_estimate).sum::<u64>()
    );
}

#[test]
fn test_matched_buildings_have_positive_sizes() {
    let points = settlement(10, 20);
    let (boundaries, stats) = halves();
    let out = Pipeline::new(PipelineConfig::default())
        .run(&points, &boundaries, &stats, None)
        .unwrap();

    for b in &out.buildings {
        assert!(b.unit.is_some());
        assert!(b.household_size.unwrap() >= 1);
    }
    assert_eq!(out.report.sized_buildings, points.len());
}

#[test]
fn test_pipeline_is_reproducible() {
    let points = settlement(10, 30);
    let (boundaries, stats) = halves();
    let config = PipelineConfig {
        cluster_seed: 2024,
        synthesis: SynthesisConfig {
            seed: 99,
            policy: SeedPolicy::ReseedPerUnit,
        },
        ..Default::default()
    };

    let a = Pipeline::new(config.clone())
        .run(&points, &boundaries, &stats, None)
        .unwrap();
    let b = Pipeline::new(config)
        .run(&points, &boundaries, &stats, None)
        .unwrap();

    assert_eq!(a.buildings, b.buildings);
    assert_eq!(a.hamlets, b.hamlets);
}

#[test]
fn test_buildings_keep_input_order_and_ids() {
    let points = settlement(3, 7);
    let (boundaries, stats) = halves();
    let out = Pipeline::new(PipelineConfig::default())
        .run(&points, &boundaries, &stats, None)
        .unwrap();

    let input: Vec<_> = points.iter().map(|p| &p.id).collect();
    let output: Vec<_> = out.buildings.iter().map(|p| &p.id).collect();
    assert_eq!(input, output);
}

#[test]
fn test_more_hamlets_than_points_is_not_fatal() {
    let points = settlement(1, 3);
    let (boundaries, stats) = halves();
    let config = PipelineConfig {
        k: Some(5),
        ..Default::default()
    };
    let out = Pipeline::new(config)
        .run(&points, &boundaries, &stats, None)
        .unwrap();

    assert_eq!(out.hamlets.len(), 5);
    assert_eq!(out.hamlets.iter().map(|h| h.member_count).sum::<usize>(), 3);
    assert!(out.report.count("empty_cluster") >= 2);
    for empty in out.hamlets.iter().filter(|h| h.member_count == 0) {
        assert_eq!(empty.population_estimate, 0);
    }
}
