//! Per-host resource state.
//!
//! A [`HostResourceState`] is the scheduler's picture of one compute node:
//! capacity and consumption as last reported, the instances it hosts, and
//! the partition of those instances into durable and preemptible. Every
//! host exists in two views (see [`HostView`]) that share an identity but
//! not their counters.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use spotgrid_core::AllocationConfig;
use spotgrid_inventory::{ComputeNode, ComputeService, HostName, Instance, InstanceId, NodeName};

use crate::request::InstanceShape;

/// Which occupancy a host state reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostView {
    /// All instances count as consumption.
    Full,
    /// Preemptible instances' footprint is credited back as free.
    Partial,
}

/// Identity of a host state: `(host, node)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostKey {
    pub host: HostName,
    pub node: NodeName,
}

impl HostKey {
    pub fn new(host: impl Into<HostName>, node: impl Into<NodeName>) -> Self {
        Self {
            host: host.into(),
            node: node.into(),
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.host, self.node)
    }
}

/// Resource ceilings for a host: `total × allocation ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HostLimits {
    pub memory_mb: f64,
    pub disk_gb: f64,
    pub vcpus: f64,
}

/// Capacity, consumption and hosted instances of one compute node.
#[derive(Debug, Clone)]
pub struct HostResourceState {
    pub key: HostKey,
    pub view: HostView,
    pub total_usable_ram_mb: i64,
    pub free_ram_mb: i64,
    pub total_usable_disk_gb: i64,
    pub free_disk_mb: i64,
    pub vcpus_total: i64,
    pub vcpus_used: i64,
    pub cpu_allocation_ratio: f64,
    pub ram_allocation_ratio: f64,
    pub disk_allocation_ratio: f64,
    pub num_instances: i64,
    /// Epoch seconds of the last refresh or speculative consumption.
    /// `None` forces the next refresh to re-read the compute node.
    pub updated: Option<u64>,
    pub service: Option<ComputeService>,
    instances: BTreeMap<InstanceId, Instance>,
    normal_instances: BTreeSet<InstanceId>,
    preemptible_instances: BTreeSet<InstanceId>,
}

impl HostResourceState {
    /// An empty state; counters are filled by the first compute node update.
    pub fn new(key: HostKey, view: HostView) -> Self {
        Self {
            key,
            view,
            total_usable_ram_mb: 0,
            free_ram_mb: 0,
            total_usable_disk_gb: 0,
            free_disk_mb: 0,
            vcpus_total: 0,
            vcpus_used: 0,
            cpu_allocation_ratio: 0.0,
            ram_allocation_ratio: 0.0,
            disk_allocation_ratio: 0.0,
            num_instances: 0,
            updated: None,
            service: None,
            instances: BTreeMap::new(),
            normal_instances: BTreeSet::new(),
            preemptible_instances: BTreeSet::new(),
        }
    }

    /// Build a state straight from a compute node record.
    pub fn from_compute_node(
        node: &ComputeNode,
        view: HostView,
        defaults: &AllocationConfig,
    ) -> Self {
        let key = HostKey::new(node.host.clone(), node.hypervisor_hostname.clone());
        let mut state = Self::new(key, view);
        state.update_from_compute_node(node, defaults);
        state
    }

    /// Copy capacity and consumption from the compute node.
    ///
    /// Skipped (returns false) when this state holds speculative
    /// consumption newer than the node's last report. A re-read clears
    /// the instance partition so the next [`assign_instances`] rebuilds it
    /// against the fresh counters.
    ///
    /// [`assign_instances`]: HostResourceState::assign_instances
    pub fn update_from_compute_node(
        &mut self,
        node: &ComputeNode,
        defaults: &AllocationConfig,
    ) -> bool {
        if self.updated.is_some_and(|u| u > node.updated_at) {
            debug!(host = %self.key, "host state newer than compute node, keeping it");
            return false;
        }

        self.total_usable_ram_mb = node.memory_mb;
        self.free_ram_mb = node.free_ram_mb;
        self.total_usable_disk_gb = node.local_gb;
        self.free_disk_mb = node.free_disk_gb * 1024;
        self.vcpus_total = i64::from(node.vcpus);
        self.vcpus_used = i64::from(node.vcpus_used);
        self.cpu_allocation_ratio = pick_ratio(node.cpu_allocation_ratio, defaults.cpu_ratio);
        self.ram_allocation_ratio = pick_ratio(node.ram_allocation_ratio, defaults.ram_ratio);
        self.disk_allocation_ratio = pick_ratio(node.disk_allocation_ratio, defaults.disk_ratio);
        self.num_instances = i64::from(node.running_vms);
        self.updated = Some(node.updated_at);

        self.instances.clear();
        self.normal_instances.clear();
        self.preemptible_instances.clear();
        true
    }

    pub fn update_service(&mut self, service: ComputeService) {
        self.service = Some(service);
    }

    /// Replace the hosted instance collection.
    ///
    /// Instances seen for the first time are classified; on the partial
    /// view a newly seen preemptible instance has its footprint credited
    /// back as free. Instances no longer present leave both subsets.
    pub fn assign_instances(&mut self, instances: impl IntoIterator<Item = Instance>) {
        let mut next = BTreeMap::new();
        for instance in instances {
            let id = instance.id.clone();
            if !self.instances.contains_key(&id) {
                if instance.is_preemptible() {
                    if self.view == HostView::Partial {
                        self.unconsume_from_instance(&instance);
                    }
                    self.preemptible_instances.insert(id.clone());
                } else {
                    self.normal_instances.insert(id.clone());
                }
            }
            next.insert(id, instance);
        }

        self.normal_instances.retain(|id| next.contains_key(id));
        self.preemptible_instances.retain(|id| next.contains_key(id));
        self.instances = next;
    }

    /// Credit an instance's footprint back as free.
    fn unconsume_from_instance(&mut self, instance: &Instance) {
        self.free_ram_mb += instance.memory_mb;
        self.free_disk_mb += instance.disk_mb();
        self.vcpus_used -= i64::from(instance.vcpus);
        self.num_instances -= 1;
    }

    /// Speculatively consume one instance of the requested shape.
    pub fn consume_from_request(&mut self, shape: &InstanceShape, now: u64) {
        self.free_ram_mb -= shape.memory_mb;
        self.free_disk_mb -= shape.disk_mb();
        self.vcpus_used += i64::from(shape.vcpus);
        self.num_instances += 1;
        self.updated = Some(now);
    }

    /// Force the next refresh to re-read this host from inventory.
    pub fn invalidate(&mut self) {
        self.updated = None;
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn normal_instances(&self) -> impl Iterator<Item = &Instance> {
        self.normal_instances
            .iter()
            .filter_map(|id| self.instances.get(id))
    }

    pub fn preemptible_instances(&self) -> impl Iterator<Item = &Instance> {
        self.preemptible_instances
            .iter()
            .filter_map(|id| self.instances.get(id))
    }

    pub fn normal_instance_ids(&self) -> &BTreeSet<InstanceId> {
        &self.normal_instances
    }

    pub fn preemptible_instance_ids(&self) -> &BTreeSet<InstanceId> {
        &self.preemptible_instances
    }

    pub fn preemptible_count(&self) -> usize {
        self.preemptible_instances.len()
    }

    pub fn used_ram_mb(&self) -> i64 {
        self.total_usable_ram_mb - self.free_ram_mb
    }

    pub fn used_disk_gb(&self) -> f64 {
        self.total_usable_disk_gb as f64 - self.free_disk_mb as f64 / 1024.0
    }

    pub fn limits(&self) -> HostLimits {
        HostLimits {
            memory_mb: self.total_usable_ram_mb as f64 * ratio_or_one(self.ram_allocation_ratio),
            disk_gb: self.total_usable_disk_gb as f64 * ratio_or_one(self.disk_allocation_ratio),
            vcpus: self.vcpus_total as f64 * ratio_or_one(self.cpu_allocation_ratio),
        }
    }
}

impl fmt::Display for HostResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ram:{} disk:{} instances:{} (spot:{})",
            self.key,
            self.free_ram_mb,
            self.free_disk_mb,
            self.num_instances,
            self.preemptible_instances.len()
        )
    }
}

/// Node-reported ratio, or the configured fallback when unreported.
fn pick_ratio(reported: f64, fallback: f64) -> f64 {
    if reported > 0.0 { reported } else { fallback }
}

/// An unset (zero) allocation ratio means no overcommit.
pub fn ratio_or_one(ratio: f64) -> f64 {
    if ratio > 0.0 { ratio } else { 1.0 }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
