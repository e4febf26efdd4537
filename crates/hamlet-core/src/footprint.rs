//! Building footprint join
//!
//! Carries cluster id and household size over to building polygons by id.
//! Inner join: footprints with no clustered point are dropped and counted.

use std::collections::HashMap;

use geo::Polygon;

use crate::error::Anomaly;
use crate::types::{BuildingId, BuildingPoint, ClusterId};

#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub id: BuildingId,
    pub geometry: Polygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintRecord {
    pub id: BuildingId,
    pub geometry: Polygon<f64>,
    pub cluster: ClusterId,
    pub household_size: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct FootprintJoin {
    pub records: Vec<FootprintRecord>,
    pub unmatched: usize,
}

impl FootprintJoin {
    pub fn anomaly(&self) -> Option<Anomaly> {
        (self.unmatched > 0).then_some(Anomaly::UnmatchedFootprints {
            count: self.unmatched,
        })
    }
}

/// Attach clustering and synthesis results to footprints, preserving footprint order
pub fn attach_footprints(footprints: &[Footprint], buildings: &[BuildingPoint]) -> FootprintJoin {
    let by_id: HashMap<&BuildingId, &BuildingPoint> = buildings
        .iter()
        .filter(|b| b.cluster.is_some())
        .map(|b| (&b.id, b))
        .collect();

    let mut join = FootprintJoin::default();
    for footprint in footprints {
        match by_id.get(&footprint.id).and_then(|b| b.cluster.map(|c| (c, b))) {
            Some((cluster, building)) => join.records.push(FootprintRecord {
                id: footprint.id.clone(),
                geometry: footprint.geometry.clone(),
                cluster,
                household_size: building.household_size,
            }),
            None => join.unmatched += 1,
        }
    }

    if join.unmatched > 0 {
        tracing::warn!(
            unmatched = join.unmatched,
            "Footprints without a clustered building were dropped"
        );
    }
    join
}
