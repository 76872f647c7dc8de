//! Overcommit detection.

use crate::host_state::{HostResourceState, ratio_or_one};

/// Whether consumption on `host` exceeds any of its resource limits.
///
/// Limits are `total × allocation ratio` for RAM, disk and vCPUs. Callers
/// pass the full-view state so preemptible instances count as used.
pub fn is_overcommitted(host: &HostResourceState) -> bool {
    let ram_limit = host.total_usable_ram_mb as f64 * ratio_or_one(host.ram_allocation_ratio);
    if host.used_ram_mb() as f64 > ram_limit {
        return true;
    }

    let disk_limit = host.total_usable_disk_gb as f64 * ratio_or_one(host.disk_allocation_ratio);
    if host.used_disk_gb() > disk_limit {
        return true;
    }

    let vcpu_limit = host.vcpus_total as f64 * ratio_or_one(host.cpu_allocation_ratio);
    host.vcpus_used as f64 > vcpu_limit
}
