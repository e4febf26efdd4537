//! Administrative reference table
//!
//! Joins boundary metadata to the statistics table by unit id. The join is an
//! explicit inner join: units on both sides get an [`AdministrativeUnit`],
//! boundaries without statistics are reported as `missing`, and statistics
//! without a boundary are reported as `orphaned`. Neither side is null-filled.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Anomaly, HamletError, Result};
use crate::types::{AdminBoundary, AdministrativeUnit, UnitId, UnitStatistics};

/// Read-only lookup of joined administrative units
#[derive(Debug, Clone, Default)]
pub struct AdminTable {
    units: BTreeMap<UnitId, AdministrativeUnit>,
    missing: BTreeSet<UnitId>,
}

/// Unmatched keys from both sides of the statistics join
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinReport {
    /// Boundaries with no statistics row
    pub missing: Vec<UnitId>,
    /// Statistics rows with no boundary
    pub orphaned: Vec<UnitId>,
}

impl JoinReport {
    pub fn anomalies(&self) -> Vec<Anomaly> {
        // Missing units are reported by the synthesizer along with their building counts
        self.orphaned
            .iter()
            .map(|unit| Anomaly::OrphanedStatistics { unit: unit.clone() })
            .collect()
    }
}

impl AdminTable {
    /// Join boundaries to statistics by unit id
    pub fn join(
        boundaries: &[AdminBoundary],
        stats: &[UnitStatistics],
    ) -> Result<(Self, JoinReport)> {
        let mut by_id: BTreeMap<&UnitId, &UnitStatistics> = BTreeMap::new();
        for row in stats {
            validate(row)?;
            if by_id.insert(&row.unit_id, row).is_some() {
                return Err(HamletError::DuplicateId {
                    kind: "statistics unit",
                    id: row.unit_id.0.clone(),
                });
            }
        }

        let mut units = BTreeMap::new();
        let mut missing = BTreeSet::new();
        let mut seen = BTreeSet::new();

        for boundary in boundaries {
            if !seen.insert(&boundary.id) {
                return Err(HamletError::DuplicateId {
                    kind: "boundary unit",
                    id: boundary.id.0.clone(),
                });
            }
            match by_id.get(&boundary.id) {
                Some(row) => {
                    units.insert(
                        boundary.id.clone(),
                        AdministrativeUnit {
                            id: boundary.id.clone(),
                            name: boundary.name.clone(),
                            mean_household_size: row.mean_household_size,
                            total_population: row.total_population,
                        },
                    );
                }
                None => {
                    missing.insert(boundary.id.clone());
                }
            }
        }

        let orphaned: Vec<UnitId> = by_id
            .keys()
            .filter(|id| !seen.contains(*id))
            .map(|id| (*id).clone())
            .collect();

        if !missing.is_empty() {
            tracing::warn!(
                count = missing.len(),
                "Administrative units without statistics; their buildings will not be sized"
            );
        }
        if !orphaned.is_empty() {
            tracing::warn!(count = orphaned.len(), "Statistics rows without a boundary");
        }
        tracing::info!(
            units = units.len(),
            missing = missing.len(),
            orphaned = orphaned.len(),
            "Joined administrative statistics"
        );

        let report = JoinReport {
            missing: missing.iter().cloned().collect(),
            orphaned,
        };
        Ok((Self { units, missing }, report))
    }

    pub fn get(&self, id: &UnitId) -> Option<&AdministrativeUnit> {
        self.units.get(id)
    }

    /// Whether a boundary exists for this unit but its statistics row does not
    pub fn is_missing_statistics(&self, id: &UnitId) -> bool {
        self.missing.contains(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn validate(row: &UnitStatistics) -> Result<()> {
    if !row.mean_household_size.is_finite() || row.mean_household_size <= 0.0 {
        return Err(HamletError::InvalidStatistics {
            unit: row.unit_id.clone(),
            reason: format!(
                "mean_household_size must be finite and > 0, got {}",
                row.mean_household_size
            ),
        });
    }
    Ok(())
}
