//! Household size synthesis
//!
//! Buildings are grouped by administrative unit and each group gets one batch
//! draw from a zero-truncated Poisson with rate
//! `total_population / mean_household_size`. Groups are visited in unit id
//! order so a seed always maps to the same sizes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::admin::AdminTable;
use crate::error::{Anomaly, HamletError, Result};
use crate::types::{BuildingId, BuildingPoint, UnitId};

/// Below this rate rejection sampling wastes too many draws on zero
const INVERSION_THRESHOLD: f64 = 1.0;

/// Poisson distribution conditioned on the outcome being at least 1
#[derive(Debug, Clone)]
pub struct ZeroTruncatedPoisson {
    lambda: f64,
    poisson: Poisson<f64>,
}

impl ZeroTruncatedPoisson {
    pub fn new(lambda: f64) -> Result<Self> {
        // Draws are returned as u32; larger rates would saturate
        if !lambda.is_finite() || lambda <= 0.0 || lambda > f64::from(u32::MAX) {
            return Err(HamletError::InvalidRate(lambda));
        }
        let poisson = Poisson::new(lambda).map_err(|_| HamletError::InvalidRate(lambda))?;
        Ok(Self { lambda, poisson })
    }

    /// Mean of the truncated distribution: `λ / (1 - e^-λ)`
    pub fn mean(&self) -> f64 {
        self.lambda / -(-self.lambda).exp_m1()
    }

    /// Inverse CDF restricted to `{1, 2, ...}`
    fn sample_inversion<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let p0 = (-self.lambda).exp();
        let u = p0 + (1.0 - p0) * rng.random::<f64>();

        let mut k = 0u32;
        let mut p = p0;
        let mut cdf = p0;
        while cdf < u && p > 0.0 {
            k += 1;
            p *= self.lambda / f64::from(k);
            cdf += p;
        }
        k.max(1)
    }
}

impl Distribution<u32> for ZeroTruncatedPoisson {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.lambda < INVERSION_THRESHOLD {
            return self.sample_inversion(rng);
        }
        loop {
            let k = self.poisson.sample(rng);
            if k >= 1.0 {
                return k as u32;
            }
        }
    }
}

/// How the random stream is seeded across administrative units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    /// One generator, seeded once, advanced across units in id order
    #[default]
    Stream,
    /// Fresh generator with the same seed for every unit. Units with equal
    /// rate and building count receive identical size sequences.
    ReseedPerUnit,
}

impl SeedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedPolicy::Stream => "stream",
            SeedPolicy::ReseedPerUnit => "reseed-per-unit",
        }
    }
}

impl fmt::Display for SeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" => Ok(SeedPolicy::Stream),
            "reseed-per-unit" | "reseed_per_unit" | "reseed" => Ok(SeedPolicy::ReseedPerUnit),
            other => Err(format!(
                "unknown seed policy '{other}' (expected 'stream' or 'reseed-per-unit')"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub seed: u64,
    pub policy: SeedPolicy,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            seed: crate::cluster::DEFAULT_SEED,
            policy: SeedPolicy::default(),
        }
    }
}

/// Per-unit draw summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitDraw {
    pub unit: UnitId,
    pub lambda: f64,
    pub buildings: usize,
    pub mean_size: f64,
}

/// Output of [`synthesize`]
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    /// Household size per building; buildings that could not be sized are absent
    pub sizes: BTreeMap<BuildingId, u32>,
    pub draws: Vec<UnitDraw>,
    /// Buildings with no administrative unit
    pub unassigned: usize,
    pub anomalies: Vec<Anomaly>,
}

impl Synthesis {
    pub fn size_of(&self, id: &BuildingId) -> Option<u32> {
        self.sizes.get(id).copied()
    }
}

/// Draw `count` household sizes for a unit with rate `lambda`
pub fn draw_household_sizes<R: Rng + ?Sized>(
    lambda: f64,
    count: usize,
    rng: &mut R,
) -> Result<Vec<u32>> {
    let dist = ZeroTruncatedPoisson::new(lambda)?;
    Ok((0..count).map(|_| dist.sample(rng)).collect())
}

/// Assign a household size to every building whose unit has statistics
pub fn synthesize(
    buildings: &[BuildingPoint],
    table: &AdminTable,
    config: &SynthesisConfig,
) -> Synthesis {
    let mut groups: BTreeMap<&UnitId, Vec<&BuildingId>> = BTreeMap::new();
    let mut unassigned = 0;
    for building in buildings {
        match &building.unit {
            Some(unit) => groups.entry(unit).or_default().push(&building.id),
            None => unassigned += 1,
        }
    }

    let mut stream = ChaCha8Rng::seed_from_u64(config.seed);
    let mut out = Synthesis {
        unassigned,
        ..Default::default()
    };

    for (unit_id, members) in groups {
        let Some(unit) = table.get(unit_id) else {
            let buildings = members.len();
            if table.is_missing_statistics(unit_id) {
                tracing::warn!(unit = %unit_id, buildings, "No statistics for unit");
                out.anomalies.push(Anomaly::MissingStatistics {
                    unit: unit_id.clone(),
                    buildings,
                });
            } else {
                tracing::warn!(unit = %unit_id, buildings, "Unit not in reference table");
                out.anomalies.push(Anomaly::UnknownUnit {
                    unit: unit_id.clone(),
                    buildings,
                });
            }
            continue;
        };

        let lambda = unit.rate();
        let drawn = match config.policy {
            SeedPolicy::Stream => draw_household_sizes(lambda, members.len(), &mut stream),
            SeedPolicy::ReseedPerUnit => {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
                draw_household_sizes(lambda, members.len(), &mut rng)
            }
        };
        let sizes = match drawn {
            Ok(sizes) => sizes,
            Err(_) => {
                tracing::warn!(unit = %unit_id, lambda, "Unusable household rate for unit");
                out.anomalies.push(Anomaly::InvalidRate {
                    unit: unit_id.clone(),
                    lambda,
                    buildings: members.len(),
                });
                continue;
            }
        };

        let mean_size = sizes.iter().map(|&s| f64::from(s)).sum::<f64>() / sizes.len() as f64;
        tracing::debug!(
            unit = %unit_id,
            lambda,
            buildings = sizes.len(),
            mean_size,
            "Drew household sizes"
        );
        out.draws.push(UnitDraw {
            unit: unit_id.clone(),
            lambda,
            buildings: sizes.len(),
            mean_size,
        });
        out.sizes.extend(members.into_iter().cloned().zip(sizes));
    }

    tracing::info!(
        sized = out.sizes.len(),
        unassigned = out.unassigned,
        units = out.draws.len(),
        policy = %config.policy,
        "Synthesized household sizes"
    );
    out
}
