//! End-to-end hamlet pipeline
//!
//! Stages run in a fixed order, each producing a fresh collection:
//! 1. administrative matching of building points
//! 2. clustering into K hamlets
//! 3. household size synthesis, conditioned on the matched unit
//! 4. aggregation into hamlet records (plus the optional footprint join)
//!
//! Only an empty or malformed input aborts the run. Every other problem is
//! recorded as an [`Anomaly`] in the [`RunReport`].

use std::collections::HashSet;

use serde::Serialize;

use crate::admin::AdminTable;
use crate::aggregate::aggregate;
use crate::cluster::{
    target_cluster_count, ClusterConfig, KMeans, DEFAULT_MAX_ITERATIONS, DEFAULT_REFERENCE_RATIO,
    DEFAULT_SEED, DEFAULT_TOLERANCE,
};
use crate::error::{Anomaly, HamletError, Result};
use crate::footprint::{attach_footprints, Footprint, FootprintRecord};
use crate::matcher::AdminMatcher;
use crate::synth::{synthesize, SynthesisConfig, UnitDraw};
use crate::types::{AdminBoundary, BuildingPoint, Hamlet, UnitStatistics};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Households per reference hamlet, used to derive K
    pub reference_ratio: f64,
    /// Fixed cluster count, bypassing the ratio
    pub k: Option<usize>,
    pub cluster_seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub synthesis: SynthesisConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_ratio: DEFAULT_REFERENCE_RATIO,
            k: None,
            cluster_seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Cluster count for `n` points
    pub fn cluster_count(&self, n: usize) -> Result<usize> {
        match self.k {
            Some(0) => Err(HamletError::InvalidConfig(
                "cluster count must be at least 1".to_string(),
            )),
            Some(k) if n > 0 => Ok(k),
            _ => target_cluster_count(n, self.reference_ratio),
        }
    }

    pub fn cluster_config(&self, k: usize) -> ClusterConfig {
        ClusterConfig {
            k,
            seed: self.cluster_seed,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

/// Run summary, serialized alongside the outputs
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub points: usize,
    pub k: usize,
    pub iterations: usize,
    pub converged: bool,
    pub inertia: f64,
    pub administrative_units: usize,
    pub unmatched_buildings: usize,
    pub sized_buildings: usize,
    pub total_population: u64,
    pub draws: Vec<UnitDraw>,
    pub anomalies: Vec<Anomaly>,
}

impl RunReport {
    /// Number of anomalies of the given kind
    pub fn count(&self, kind: &str) -> usize {
        self.anomalies.iter().filter(|a| a.kind() == kind).count()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Input points in input order, with unit, cluster and size attached where known
    pub buildings: Vec<BuildingPoint>,
    pub hamlets: Vec<Hamlet>,
    pub footprints: Option<Vec<FootprintRecord>>,
    pub report: RunReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        points: &[BuildingPoint],
        boundaries: &[AdminBoundary],
        stats: &[UnitStatistics],
        footprints: Option<&[Footprint]>,
    ) -> Result<PipelineOutput> {
        validate_points(points)?;
        let mut report = RunReport {
            points: points.len(),
            ..Default::default()
        };

        let (table, join) = AdminTable::join(boundaries, stats)?;
        report.administrative_units = table.len();
        report.anomalies.extend(join.anomalies());

        // Stage 1: administrative matching
        let matcher = AdminMatcher::new(boundaries);
        let matched = match_buildings(points, &matcher);
        for building in matched.iter().filter(|b| b.unit.is_none()) {
            report.anomalies.push(Anomaly::UnmatchedBuilding {
                building: building.id.clone(),
            });
        }
        report.unmatched_buildings = matched.iter().filter(|b| b.unit.is_none()).count();
        if report.unmatched_buildings > 0 {
            tracing::warn!(
                count = report.unmatched_buildings,
                "Buildings outside every administrative unit"
            );
        }

        // Stage 2: clustering
        let k = self.config.cluster_count(points.len())?;
        let coords: Vec<_> = matched.iter().map(|b| b.coord).collect();
        let clusters = KMeans::new(self.config.cluster_config(k)).fit(&coords)?;
        report.k = k;
        report.iterations = clusters.iterations;
        report.converged = clusters.converged;
        report.inertia = clusters.inertia;
        if !clusters.converged {
            report.anomalies.push(Anomaly::NonConvergence {
                iterations: clusters.iterations,
                max_shift: clusters.max_shift,
            });
        }
        let clustered: Vec<BuildingPoint> = matched
            .iter()
            .zip(clusters.assignments.iter())
            .map(|(b, &c)| b.with_cluster(c))
            .collect();

        // Stage 3: household sizes
        let synthesis = synthesize(&clustered, &table, &self.config.synthesis);
        report.sized_buildings = synthesis.sizes.len();
        report.anomalies.extend(synthesis.anomalies.iter().cloned());
        let buildings: Vec<BuildingPoint> = clustered
            .iter()
            .map(|b| b.with_household_size(synthesis.size_of(&b.id)))
            .collect();
        report.draws = synthesis.draws;

        // Stage 4: aggregation
        let aggregation = aggregate(&buildings, &clusters, &matcher);
        report.total_population = aggregation
            .hamlets
            .iter()
            .map(|h| h.population_estimate)
            .sum();
        report.anomalies.extend(aggregation.anomalies);

        let footprints = footprints.map(|fps| {
            let join = attach_footprints(fps, &buildings);
            report.anomalies.extend(join.anomaly());
            join.records
        });

        tracing::info!(
            points = report.points,
            k = report.k,
            population = report.total_population,
            anomalies = report.anomalies.len(),
            "Pipeline finished"
        );

        Ok(PipelineOutput {
            buildings,
            hamlets: aggregation.hamlets,
            footprints,
            report,
        })
    }
}

/// Stage 1 on its own: attach the containing unit to every point
pub fn match_buildings(points: &[BuildingPoint], matcher: &AdminMatcher) -> Vec<BuildingPoint> {
    points
        .iter()
        .map(|p| p.with_unit(matcher.locate(p.coord).cloned()))
        .collect()
}

fn validate_points(points: &[BuildingPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(HamletError::InputCardinality {
            found: 0,
            required: 1,
        });
    }
    let mut seen = HashSet::with_capacity(points.len());
    for p in points {
        if !p.coord.x.is_finite() || !p.coord.y.is_finite() {
            return Err(HamletError::InvalidCoordinate { id: p.id.clone() });
        }
        if !seen.insert(&p.id) {
            return Err(HamletError::DuplicateId {
                kind: "building",
                id: p.id.0.clone(),
            });
        }
    }
    Ok(())
}
