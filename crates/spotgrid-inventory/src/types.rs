//! Domain types for the SpotGrid inventory.
//!
//! These types are what the inventory hands to the scheduler each cycle:
//! compute nodes (capacity and consumption as last reported), the services
//! that own them, and the instances placed on each host. All types are
//! serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the host a compute service runs on.
pub type HostName = String;

/// Hypervisor node name; one host may expose several nodes.
pub type NodeName = String;

/// Unique identifier for an instance.
pub type InstanceId = String;

/// Metadata key that marks an instance as preemptible.
pub const PREEMPTIBLE_KEY: &str = "preemptible";

// ── Compute node ──────────────────────────────────────────────────

/// Capacity and consumption of a single hypervisor node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeNode {
    pub host: HostName,
    pub hypervisor_hostname: NodeName,
    /// Total usable RAM (MB).
    pub memory_mb: i64,
    /// Free RAM (MB). Negative when the node is over-committed.
    pub free_ram_mb: i64,
    /// Total usable local disk (GB).
    pub local_gb: i64,
    /// Free local disk (GB).
    pub free_disk_gb: i64,
    pub vcpus: u32,
    pub vcpus_used: u32,
    /// Zero means "not reported"; the scheduler falls back to its config.
    #[serde(default)]
    pub cpu_allocation_ratio: f64,
    #[serde(default)]
    pub ram_allocation_ratio: f64,
    #[serde(default)]
    pub disk_allocation_ratio: f64,
    /// Number of instances the node reports running.
    #[serde(default)]
    pub running_vms: u32,
    /// Unix timestamp (seconds) of the node's last report.
    pub updated_at: u64,
}

impl ComputeNode {
    /// Build the key for the compute node table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.host, self.hypervisor_hostname)
    }
}

// ── Service ───────────────────────────────────────────────────────

/// A service record; compute nodes are only schedulable while a
/// service of the compute kind exists for their host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeService {
    pub host: HostName,
    /// Service kind, e.g. "compute".
    pub kind: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub forced_down: bool,
    /// Unix timestamp of the last heartbeat.
    pub last_seen_at: u64,
}

impl ComputeService {
    /// Build the key for the services table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.kind, self.host)
    }

    /// Whether the service accepts new work.
    pub fn is_up(&self) -> bool {
        !self.disabled && !self.forced_down
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// An instance placed on a host, with its resource footprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub host: HostName,
    pub node: NodeName,
    #[serde(default)]
    pub project_id: String,
    pub memory_mb: i64,
    pub root_gb: i64,
    #[serde(default)]
    pub ephemeral_gb: i64,
    pub vcpus: u32,
    #[serde(default)]
    pub system_metadata: HashMap<String, String>,
    /// Unix timestamp (seconds) when the instance was created.
    pub created_at: u64,
}

impl Instance {
    /// Whether this instance may be evicted for durable work.
    ///
    /// This is the only place the classification is derived.
    pub fn is_preemptible(&self) -> bool {
        self.system_metadata
            .get(PREEMPTIBLE_KEY)
            .is_some_and(|v| parse_flag(v) == Some(true))
    }

    /// Disk footprint in MB (root plus ephemeral).
    pub fn disk_mb(&self) -> i64 {
        (self.root_gb + self.ephemeral_gb) * 1024
    }
}

/// Parse a boolean-ish metadata value ("true", "1", "yes", "on", ...).
///
/// Returns `None` for values that are neither recognisably true nor false.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "on" | "y" | "yes" => Some(true),
        "0" | "f" | "false" | "off" | "n" | "no" | "" => Some(false),
        _ => None,
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// A full inventory dump, used to seed a store from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub compute_nodes: Vec<ComputeNode>,
    #[serde(default)]
    pub services: Vec<ComputeService>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_with(meta: &[(&str, &str)]) -> Instance {
        Instance {
            id: "i-1".to_string(),
            host: "host1".to_string(),
            node: "node1".to_string(),
            project_id: "p".to_string(),
            memory_mb: 512,
            root_gb: 10,
            ephemeral_gb: 5,
            vcpus: 1,
            system_metadata: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            created_at: 1000,
        }
    }

    #[test]
    fn preemptible_flag_is_read_from_metadata() {
        assert!(instance_with(&[("preemptible", "True")]).is_preemptible());
        assert!(instance_with(&[("preemptible", "1")]).is_preemptible());
        assert!(!instance_with(&[("preemptible", "false")]).is_preemptible());
        assert!(!instance_with(&[("preemptible", "maybe")]).is_preemptible());
        assert!(!instance_with(&[]).is_preemptible());
    }

    #[test]
    fn disk_footprint_includes_ephemeral() {
        assert_eq!(instance_with(&[]).disk_mb(), 15 * 1024);
    }

    #[test]
    fn parse_flag_rejects_garbage() {
        assert_eq!(parse_flag(" yes "), Some(true));
        assert_eq!(parse_flag("OFF"), Some(false));
        assert_eq!(parse_flag("sometimes"), None);
    }

    #[test]
    fn service_up_requires_enabled_and_not_forced_down() {
        let mut svc = ComputeService {
            host: "host1".to_string(),
            kind: "compute".to_string(),
            disabled: false,
            forced_down: false,
            last_seen_at: 1000,
        };
        assert!(svc.is_up());
        svc.forced_down = true;
        assert!(!svc.is_up());
        svc.forced_down = false;
        svc.disabled = true;
        assert!(!svc.is_up());
        assert_eq!(svc.table_key(), "compute/host1");
    }
}
