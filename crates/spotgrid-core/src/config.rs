//! spotgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Filters enabled when the config does not name any.
pub const DEFAULT_FILTERS: &[&str] = &[
    "compute",
    "ram",
    "disk",
    "core",
    "group_affinity",
    "group_anti_affinity",
];

/// Weighers enabled when the config does not name any.
pub const DEFAULT_WEIGHERS: &[&str] = &["ram", "preemptible_count", "preemptible_duration"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotgridConfig {
    pub scheduler: SchedulerSection,
    pub allocation: AllocationConfig,
    pub weights: WeightsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Number of top-ranked hosts the final choice is drawn from.
    pub host_subset_size: usize,
    /// Service kind that owns compute nodes.
    pub compute_service_kind: String,
    pub filters: Vec<String>,
    pub weighers: Vec<String>,
}

/// Fallback allocation ratios for compute nodes that do not report their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub cpu_ratio: f64,
    pub ram_ratio: f64,
    pub disk_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub ram_multiplier: f64,
    pub preemptible_count_multiplier: f64,
    pub preemptible_duration_multiplier: f64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            host_subset_size: 1,
            compute_service_kind: "compute".to_string(),
            filters: DEFAULT_FILTERS.iter().map(|s| s.to_string()).collect(),
            weighers: DEFAULT_WEIGHERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            cpu_ratio: 16.0,
            ram_ratio: 1.5,
            disk_ratio: 1.0,
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            ram_multiplier: 1.0,
            preemptible_count_multiplier: 1000.0,
            preemptible_duration_multiplier: 1000.0,
        }
    }
}

impl SpotgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SpotgridConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl SchedulerSection {
    /// Subset size clamped to at least one host.
    pub fn effective_subset_size(&self) -> usize {
        self.host_subset_size.max(1)
    }
}
