//! Configuration loading for hamlet.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use hamlet_core::{PipelineConfig, SeedPolicy, SynthesisConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    pub clustering: Option<ClusteringConfig>,
    pub synthesis: Option<SynthesisSection>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Households per reference hamlet
    pub ratio: Option<f64>,
    /// Fixed hamlet count; overrides `ratio`
    pub k: Option<usize>,
    pub seed: Option<u64>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct SynthesisSection {
    pub seed: Option<u64>,
    pub seed_policy: Option<SeedPolicy>,
}

impl Config {
    /// Pipeline settings with defaults filled in for anything unset
    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        let clustering = self.clustering.clone().unwrap_or_default();
        let synthesis = self.synthesis.clone().unwrap_or_default();

        PipelineConfig {
            reference_ratio: clustering.ratio.unwrap_or(defaults.reference_ratio),
            k: clustering.k,
            cluster_seed: clustering.seed.unwrap_or(defaults.cluster_seed),
            max_iterations: clustering
                .max_iterations
                .unwrap_or(defaults.max_iterations),
            tolerance: clustering.tolerance.unwrap_or(defaults.tolerance),
            synthesis: SynthesisConfig {
                seed: synthesis.seed.unwrap_or(defaults.synthesis.seed),
                policy: synthesis.seed_policy.unwrap_or(defaults.synthesis.policy),
            },
        }
    }

    /// Config with every field populated from a pipeline config
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            clustering: Some(ClusteringConfig {
                ratio: Some(config.reference_ratio),
                k: config.k,
                seed: Some(config.cluster_seed),
                max_iterations: Some(config.max_iterations),
                tolerance: Some(config.tolerance),
            }),
            synthesis: Some(SynthesisSection {
                seed: Some(config.synthesis.seed),
                seed_policy: Some(config.synthesis.policy),
            }),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "hamlet").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}
