//! Hamlet aggregation
//!
//! Folds clustered, sized buildings into one [`Hamlet`] per cluster id. The
//! hamlet's administrative unit comes from matching its centroid, independent
//! of where its members were matched; both are kept on the record.

use std::collections::BTreeMap;

use crate::cluster::ClusterResult;
use crate::error::Anomaly;
use crate::matcher::AdminMatcher;
use crate::types::{BuildingPoint, ClusterId, Hamlet, UnitId};

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Exactly K hamlets, ordered by cluster id
    pub hamlets: Vec<Hamlet>,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Default)]
struct Accumulator<'a> {
    members: usize,
    population: u64,
    unsized_count: usize,
    units: BTreeMap<&'a UnitId, usize>,
}

impl<'a> Accumulator<'a> {
    fn majority_unit(&self) -> Option<UnitId> {
        let mut best: Option<(&UnitId, usize)> = None;
        for (&unit, &count) in &self.units {
            match best {
                Some((_, c)) if count <= c => {}
                _ => best = Some((unit, count)),
            }
        }
        best.map(|(unit, _)| unit.clone())
    }
}

/// Build hamlet records from clustered buildings
///
/// Buildings without a cluster id are ignored. Members without a household
/// size are counted in `unsized_members` and left out of the estimate.
pub fn aggregate(
    buildings: &[BuildingPoint],
    clusters: &ClusterResult,
    matcher: &AdminMatcher,
) -> Aggregation {
    let k = clusters.k();
    let mut acc: Vec<Accumulator> = (0..k).map(|_| Accumulator::default()).collect();

    for building in buildings {
        let Some(cluster) = building.cluster else {
            continue;
        };
        let Some(slot) = acc.get_mut(cluster.index()) else {
            continue;
        };
        slot.members += 1;
        match building.household_size {
            Some(size) => slot.population += u64::from(size),
            None => slot.unsized_count += 1,
        }
        if let Some(unit) = &building.unit {
            *slot.units.entry(unit).or_default() += 1;
        }
    }

    let mut out = Aggregation::default();
    for (i, slot) in acc.into_iter().enumerate() {
        let cluster_id = ClusterId::from_index(i);
        let centroid = clusters.centroids[i];
        let unit = matcher.locate(centroid).cloned();
        let majority_unit = slot.majority_unit();

        if slot.members == 0 {
            out.anomalies.push(Anomaly::EmptyCluster {
                cluster: cluster_id,
            });
        } else {
            if unit.is_none() {
                out.anomalies.push(Anomaly::UnmatchedHamlet {
                    cluster: cluster_id,
                });
            }
            if unit != majority_unit {
                out.anomalies.push(Anomaly::HamletUnitMismatch {
                    cluster: cluster_id,
                    centroid_unit: unit.clone(),
                    majority_unit: majority_unit.clone(),
                });
            }
        }
        if slot.unsized_count > 0 {
            out.anomalies.push(Anomaly::UnsizedMembers {
                cluster: cluster_id,
                count: slot.unsized_count,
            });
        }

        out.hamlets.push(Hamlet {
            cluster_id,
            centroid,
            member_count: slot.members,
            unit,
            majority_unit,
            population_estimate: slot.population,
            unsized_members: slot.unsized_count,
        });
    }

    let population: u64 = out.hamlets.iter().map(|h| h.population_estimate).sum();
    tracing::info!(
        hamlets = out.hamlets.len(),
        population,
        anomalies = out.anomalies.len(),
        "Aggregated hamlets"
    );
    out
}
