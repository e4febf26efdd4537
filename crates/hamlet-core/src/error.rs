//! Error and anomaly types
//!
//! `HamletError` covers conditions that stop a run. Everything else is an
//! [`Anomaly`]: recorded in the run report, logged, and carried as an unset
//! field in the output rather than coerced to a default value.

use serde::Serialize;
use thiserror::Error;

use crate::types::{BuildingId, ClusterId, UnitId};

/// Fatal errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HamletError {
    #[error("At least {required} building point is required, got {found}")]
    InputCardinality { found: usize, required: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid statistics for unit {unit}: {reason}")]
    InvalidStatistics { unit: UnitId, reason: String },

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Building {id} has a non-finite coordinate")]
    InvalidCoordinate { id: BuildingId },

    #[error("Invalid Poisson rate: {0} (must be finite and > 0)")]
    InvalidRate(f64),
}

pub type Result<T> = std::result::Result<T, HamletError>;

/// Recoverable condition observed during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Building point outside every administrative polygon
    UnmatchedBuilding { building: BuildingId },
    /// Hamlet centroid outside every administrative polygon
    UnmatchedHamlet { cluster: ClusterId },
    /// Administrative boundary with no statistics row; its buildings get no size
    MissingStatistics { unit: UnitId, buildings: usize },
    /// Statistics row with no boundary
    OrphanedStatistics { unit: UnitId },
    /// Buildings tagged with a unit that has no boundary in the reference table
    UnknownUnit { unit: UnitId, buildings: usize },
    /// Unit whose rate cannot parameterize a zero-truncated Poisson
    InvalidRate {
        unit: UnitId,
        lambda: f64,
        buildings: usize,
    },
    /// Hamlet with members that have no household size
    UnsizedMembers { cluster: ClusterId, count: usize },
    /// Cluster that ended with zero members
    EmptyCluster { cluster: ClusterId },
    /// Clustering hit the iteration bound before centroids settled
    NonConvergence { iterations: usize, max_shift: f64 },
    /// Hamlet centroid unit differs from the most common unit of its members
    HamletUnitMismatch {
        cluster: ClusterId,
        centroid_unit: Option<UnitId>,
        majority_unit: Option<UnitId>,
    },
    /// Footprints whose id matched no clustered building
    UnmatchedFootprints { count: usize },
}

impl Anomaly {
    /// Short stable label, used for grouping in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::UnmatchedBuilding { .. } => "unmatched_building",
            Anomaly::UnmatchedHamlet { .. } => "unmatched_hamlet",
            Anomaly::MissingStatistics { .. } => "missing_statistics",
            Anomaly::OrphanedStatistics { .. } => "orphaned_statistics",
            Anomaly::UnknownUnit { .. } => "unknown_unit",
            Anomaly::InvalidRate { .. } => "invalid_rate",
            Anomaly::UnsizedMembers { .. } => "unsized_members",
            Anomaly::EmptyCluster { .. } => "empty_cluster",
            Anomaly::NonConvergence { .. } => "non_convergence",
            Anomaly::HamletUnitMismatch { .. } => "hamlet_unit_mismatch",
            Anomaly::UnmatchedFootprints { .. } => "unmatched_footprints",
        }
    }
}
