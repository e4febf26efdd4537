//! Core data model: building points, administrative units, hamlets

use geo::{Coord, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque building identifier. Never parsed as a number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingId(pub String);

/// Opaque administrative unit identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

/// Cluster (hamlet) identifier, 1..=K
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u32);

macro_rules! impl_id_display {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        })*
    };
}

impl_id_display!(BuildingId, UnitId, ClusterId);

impl From<&str> for BuildingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl ClusterId {
    /// Zero-based index into per-cluster vectors
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Cluster id for a zero-based index
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }
}

/// A building centroid moving through the pipeline
///
/// Stage outputs are filled in by constructing new points; a `None` field
/// means that stage has not run, or could not produce a value for this point.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingPoint {
    pub id: BuildingId,
    pub coord: Coord<f64>,
    pub unit: Option<UnitId>,
    pub cluster: Option<ClusterId>,
    pub household_size: Option<u32>,
}

impl BuildingPoint {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: BuildingId(id.into()),
            coord: Coord { x, y },
            unit: None,
            cluster: None,
            household_size: None,
        }
    }

    pub fn with_unit(&self, unit: Option<UnitId>) -> Self {
        Self {
            unit,
            ..self.clone()
        }
    }

    pub fn with_cluster(&self, cluster: ClusterId) -> Self {
        Self {
            cluster: Some(cluster),
            ..self.clone()
        }
    }

    pub fn with_household_size(&self, household_size: Option<u32>) -> Self {
        Self {
            household_size,
            ..self.clone()
        }
    }
}

/// Administrative polygon as delivered by the boundary source
#[derive(Debug, Clone, PartialEq)]
pub struct AdminBoundary {
    pub id: UnitId,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// One row of the administrative statistics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatistics {
    pub unit_id: UnitId,
    pub mean_household_size: f64,
    pub total_population: u64,
}

/// Administrative unit with joined reference statistics
#[derive(Debug, Clone, PartialEq)]
pub struct AdministrativeUnit {
    pub id: UnitId,
    pub name: String,
    pub mean_household_size: f64,
    pub total_population: u64,
}

impl AdministrativeUnit {
    /// Poisson rate used for household size draws in this unit
    pub fn rate(&self) -> f64 {
        self.total_population as f64 / self.mean_household_size
    }
}

/// Empirical hamlet: one cluster of building points with its population estimate
#[derive(Debug, Clone, PartialEq)]
pub struct Hamlet {
    pub cluster_id: ClusterId,
    /// Mean of member points; the final clustering centroid for empty clusters
    pub centroid: Coord<f64>,
    pub member_count: usize,
    /// Unit containing the centroid, matched independently of the members
    pub unit: Option<UnitId>,
    /// Most common unit among members (lowest id on ties)
    pub majority_unit: Option<UnitId>,
    /// Sum of household sizes over members that have one
    pub population_estimate: u64,
    /// Members without a household size, excluded from the estimate
    pub unsized_members: usize,
}
