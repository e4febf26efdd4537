//! hamlet-core: hamlet formation and household population synthesis
//!
//! This crate provides:
//! - Seeded k-means clustering of building points into hamlets
//! - Point-in-polygon assignment of points to administrative units
//! - Zero-truncated Poisson household size synthesis per unit
//! - Aggregation of sizes into per-hamlet population estimates
//!
//! Coordinates are treated as a flat Euclidean plane. No file I/O happens
//! here; readers and writers live in the `hamlet` binary.

pub mod admin;
pub mod aggregate;
pub mod cluster;
pub mod error;
pub mod footprint;
pub mod matcher;
pub mod pipeline;
pub mod synth;
pub mod types;

// Re-exports
pub use admin::{AdminTable, JoinReport};
pub use aggregate::{aggregate, Aggregation};
pub use cluster::{
    target_cluster_count, ClusterConfig, ClusterResult, KMeans, DEFAULT_MAX_ITERATIONS,
    DEFAULT_REFERENCE_RATIO, DEFAULT_SEED, DEFAULT_TOLERANCE,
};
pub use error::{Anomaly, HamletError, Result};
pub use footprint::{attach_footprints, Footprint, FootprintJoin, FootprintRecord};
pub use matcher::AdminMatcher;
pub use pipeline::{match_buildings, Pipeline, PipelineConfig, PipelineOutput, RunReport};
pub use synth::{
    draw_household_sizes, synthesize, SeedPolicy, Synthesis, SynthesisConfig, UnitDraw,
    ZeroTruncatedPoisson,
};
pub use types::{
    AdminBoundary, AdministrativeUnit, BuildingId, BuildingPoint, ClusterId, Hamlet, UnitId,
    UnitStatistics,
};
