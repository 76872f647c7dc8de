//! Hard-constraint host filtering.
//!
//! A [`FilterChain`] runs every [`HostFilter`] against each candidate and
//! keeps the hosts all of them accept. The built-in filters cover the
//! standard constraints (service health, RAM, disk, vCPU and instance
//! groups); deployments can supply their own through the trait.

use tracing::debug;

use crate::error::{PlacementError, PlacementResult};
use crate::host_state::{HostResourceState, ratio_or_one};
use crate::request::{GroupPolicy, RequestSpec};
use crate::tracker::{SharedHostState, lock_host};

/// A hard constraint on where an instance may land.
pub trait HostFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `index` is the position of the instance within a multi-instance request.
    fn host_passes(&self, host: &HostResourceState, spec: &RequestSpec, index: u32) -> bool;
}

/// An ordered set of filters applied together.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn HostFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn HostFilter>>) -> Self {
        Self { filters }
    }

    /// Build a chain from configured filter names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> PlacementResult<Self> {
        let filters = names
            .iter()
            .map(|name| filter_by_name(name.as_ref()))
            .collect::<PlacementResult<Vec<_>>>()?;
        Ok(Self::new(filters))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Keep the hosts every filter accepts.
    pub fn filter(
        &self,
        hosts: Vec<SharedHostState>,
        spec: &RequestSpec,
        index: u32,
    ) -> Vec<SharedHostState> {
        hosts
            .into_iter()
            .filter(|shared| {
                let host = lock_host(shared);
                match self.filters.iter().find(|f| !f.host_passes(&host, spec, index)) {
                    Some(rejected_by) => {
                        debug!(host = %host.key, filter = rejected_by.name(), index, "host rejected");
                        false
                    }
                    None => true,
                }
            })
            .collect()
    }
}

fn filter_by_name(name: &str) -> PlacementResult<Box<dyn HostFilter>> {
    let filter: Box<dyn HostFilter> = match name {
        "compute" => Box::new(ComputeFilter),
        "ram" => Box::new(RamFilter),
        "disk" => Box::new(DiskFilter),
        "core" => Box::new(CoreFilter),
        "group_affinity" => Box::new(GroupAffinityFilter),
        "group_anti_affinity" => Box::new(GroupAntiAffinityFilter),
        other => return Err(PlacementError::UnknownFilter(other.to_string())),
    };
    Ok(filter)
}

/// Rejects hosts whose compute service is missing, disabled or down.
pub struct ComputeFilter;

impl HostFilter for ComputeFilter {
    fn name(&self) -> &'static str {
        "compute"
    }

    fn host_passes(&self, host: &HostResourceState, _spec: &RequestSpec, _index: u32) -> bool {
        host.service.as_ref().is_some_and(|svc| svc.is_up())
    }
}

/// Requires enough RAM under the host's RAM allocation ratio.
pub struct RamFilter;

impl HostFilter for RamFilter {
    fn name(&self) -> &'static str {
        "ram"
    }

    fn host_passes(&self, host: &HostResourceState, spec: &RequestSpec, _index: u32) -> bool {
        let limit = host.total_usable_ram_mb as f64 * ratio_or_one(host.ram_allocation_ratio);
        let usable = limit - host.used_ram_mb() as f64;
        usable >= spec.shape.memory_mb as f64
    }
}

/// Requires enough disk under the host's disk allocation ratio.
pub struct DiskFilter;

impl HostFilter for DiskFilter {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn host_passes(&self, host: &HostResourceState, spec: &RequestSpec, _index: u32) -> bool {
        let total_mb = host.total_usable_disk_gb as f64 * 1024.0;
        let limit = total_mb * ratio_or_one(host.disk_allocation_ratio);
        let used = total_mb - host.free_disk_mb as f64;
        limit - used >= spec.shape.disk_mb() as f64
    }
}

/// Requires enough vCPUs under the host's CPU allocation ratio.
pub struct CoreFilter;

impl HostFilter for CoreFilter {
    fn name(&self) -> &'static str {
        "core"
    }

    fn host_passes(&self, host: &HostResourceState, spec: &RequestSpec, _index: u32) -> bool {
        // Hosts that don't report vCPUs are not constrained.
        if host.vcpus_total == 0 {
            return true;
        }
        let limit = host.vcpus_total as f64 * ratio_or_one(host.cpu_allocation_ratio);
        limit - host.vcpus_used as f64 >= f64::from(spec.shape.vcpus)
    }
}

/// Keeps an affinity group on the hosts it already occupies.
pub struct GroupAffinityFilter;

impl HostFilter for GroupAffinityFilter {
    fn name(&self) -> &'static str {
        "group_affinity"
    }

    fn host_passes(&self, host: &HostResourceState, spec: &RequestSpec, _index: u32) -> bool {
        match &spec.group {
            Some(group) if group.policy == GroupPolicy::Affinity && !group.hosts.is_empty() => {
                group.hosts.contains(&host.key.host)
            }
            _ => true,
        }
    }
}

/// Keeps members of an anti-affinity group off each other's hosts.
pub struct GroupAntiAffinityFilter;

impl HostFilter for GroupAntiAffinityFilter {
    fn name(&self) -> &'static str {
        "group_anti_affinity"
    }

    fn host_passes(&self, host: &HostResourceState, spec: &RequestSpec, _index: u32) -> bool {
        match &spec.group {
            Some(group) if group.policy == GroupPolicy::AntiAffinity => {
                !group.hosts.contains(&host.key.host)
            }
            _ => true,
        }
    }
}
