//! Placement requests.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use spotgrid_inventory::{HostName, PREEMPTIBLE_KEY, parse_flag};

/// Per-instance resource shape of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceShape {
    pub memory_mb: i64,
    pub root_gb: i64,
    #[serde(default)]
    pub ephemeral_gb: i64,
    pub vcpus: u32,
    /// Opaque requirements (NUMA, devices, ...) for external filters.
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
}

impl InstanceShape {
    /// Disk footprint in MB (root plus ephemeral).
    pub fn disk_mb(&self) -> i64 {
        (self.root_gb + self.ephemeral_gb) * 1024
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPolicy {
    Affinity,
    AntiAffinity,
}

/// Instance-group constraint and the hosts its members already occupy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    pub policy: GroupPolicy,
    #[serde(default)]
    pub hosts: BTreeSet<HostName>,
}

/// A request to place `num_instances` instances of one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub num_instances: u32,
    pub shape: InstanceShape,
    #[serde(default)]
    pub system_metadata: HashMap<String, String>,
    /// Scheduler hints; each key may carry several values.
    #[serde(default)]
    pub scheduler_hints: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub group: Option<InstanceGroup>,
}

impl RequestSpec {
    pub fn new(num_instances: u32, shape: InstanceShape) -> Self {
        Self {
            num_instances,
            shape,
            system_metadata: HashMap::new(),
            scheduler_hints: HashMap::new(),
            group: None,
        }
    }

    /// Mark the request preemptible through its metadata.
    pub fn preemptible(mut self) -> Self {
        self.system_metadata
            .insert(PREEMPTIBLE_KEY.to_string(), "true".to_string());
        self
    }

    pub fn with_group(mut self, group: InstanceGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Whether the request is for preemptible instances.
    ///
    /// Every `preemptible` value from metadata and hints must be true.
    /// No values, mixed values or unparseable values all mean durable.
    pub fn is_preemptible(&self) -> bool {
        let values: Vec<&str> = self
            .system_metadata
            .get(PREEMPTIBLE_KEY)
            .map(String::as_str)
            .into_iter()
            .chain(
                self.scheduler_hints
                    .get(PREEMPTIBLE_KEY)
                    .into_iter()
                    .flatten()
                    .map(String::as_str),
            )
            .collect();

        !values.is_empty() && values.iter().all(|v| parse_flag(v) == Some(true))
    }
}
