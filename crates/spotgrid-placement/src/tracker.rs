//! Host state tracker — owns the full and partial host views.
//!
//! Both views map `(host, node)` to a shared, individually locked
//! [`HostResourceState`]. A refresh builds the next pair of maps from
//! inventory, reusing existing per-host entries, and swaps them in as one
//! copy-on-write snapshot. Readers holding an older snapshot keep a
//! consistent (if slightly stale) picture.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use spotgrid_core::{AllocationConfig, SpotgridConfig};
use spotgrid_inventory::{ComputeService, Instance, Inventory, InventoryResult};

use crate::host_state::{HostKey, HostResourceState, HostView};

/// A host state shared between the tracker and in-flight requests.
pub type SharedHostState = Arc<Mutex<HostResourceState>>;

type HostMap = BTreeMap<HostKey, SharedHostState>;

/// Lock a host state, recovering from a poisoned lock.
///
/// Counters are plain integers, so a panic mid-update cannot leave them
/// structurally invalid.
pub fn lock_host(host: &SharedHostState) -> MutexGuard<'_, HostResourceState> {
    host.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source of host states for the placement engine.
pub trait HostStateProvider: Send + Sync {
    /// Re-read inventory into the views.
    fn refresh(&self) -> InventoryResult<()>;

    /// Current host states of one view, ordered by key.
    fn snapshot(&self, view: HostView) -> Vec<SharedHostState>;
}

#[derive(Default)]
struct HostViews {
    full: HostMap,
    partial: HostMap,
}

impl HostViews {
    fn map(&self, view: HostView) -> &HostMap {
        match view {
            HostView::Full => &self.full,
            HostView::Partial => &self.partial,
        }
    }
}

/// Tracks every schedulable host in both views.
pub struct HostStateTracker {
    inventory: Arc<dyn Inventory>,
    service_kind: String,
    allocation: AllocationConfig,
    views: RwLock<Arc<HostViews>>,
    /// Serializes refreshes; readers never take it.
    refresh_lock: Mutex<()>,
}

impl HostStateTracker {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        service_kind: impl Into<String>,
        allocation: AllocationConfig,
    ) -> Self {
        Self {
            inventory,
            service_kind: service_kind.into(),
            allocation,
            views: RwLock::new(Arc::new(HostViews::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_config(inventory: Arc<dyn Inventory>, config: &SpotgridConfig) -> Self {
        Self::new(
            inventory,
            config.scheduler.compute_service_kind.clone(),
            config.allocation.clone(),
        )
    }

    /// Re-read compute nodes, services and instances from inventory.
    ///
    /// Nodes without an owning service are skipped; nodes that vanished
    /// from inventory are dropped from both views.
    pub fn refresh(&self) -> InventoryResult<()> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let services: HashMap<String, ComputeService> = self
            .inventory
            .list_services_by_kind(&self.service_kind)?
            .into_iter()
            .map(|svc| (svc.host.clone(), svc))
            .collect();
        let nodes = self.inventory.list_compute_nodes()?;

        let current = self.current();
        let mut next = HostViews::default();
        let mut instances_by_host: HashMap<String, Vec<Instance>> = HashMap::new();

        for node in nodes {
            let Some(service) = services.get(&node.host) else {
                warn!(host = %node.host, "no compute service record found for host");
                continue;
            };

            if !instances_by_host.contains_key(&node.host) {
                let listed = self.inventory.list_instances_by_host(&node.host)?;
                instances_by_host.insert(node.host.clone(), listed);
            }
            let instances: Vec<Instance> = instances_by_host
                .get(&node.host)
                .into_iter()
                .flatten()
                .filter(|inst| inst.node == node.hypervisor_hostname)
                .cloned()
                .collect();

            let key = HostKey::new(node.host.clone(), node.hypervisor_hostname.clone());
            for view in [HostView::Full, HostView::Partial] {
                let shared = current
                    .map(view)
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| {
                        Arc::new(Mutex::new(HostResourceState::new(key.clone(), view)))
                    });
                {
                    let mut state = lock_host(&shared);
                    state.update_from_compute_node(&node, &self.allocation);
                    state.update_service(service.clone());
                    state.assign_instances(instances.iter().cloned());
                }
                match view {
                    HostView::Full => next.full.insert(key.clone(), shared),
                    HostView::Partial => next.partial.insert(key.clone(), shared),
                };
            }
        }

        let seen: BTreeSet<&HostKey> = next.full.keys().collect();
        for dead in current.full.keys().filter(|k| !seen.contains(k)) {
            info!(host = %dead.host, node = %dead.node, "removing dead compute node from scheduler");
        }

        debug!(hosts = next.full.len(), "host states refreshed");
        *self.views.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(())
    }

    /// Host states of one view, ordered by key.
    pub fn snapshot(&self, view: HostView) -> Vec<SharedHostState> {
        self.current().map(view).values().cloned().collect()
    }

    /// A single host state, if the host is known.
    pub fn host_state(&self, view: HostView, key: &HostKey) -> Option<SharedHostState> {
        self.current().map(view).get(key).cloned()
    }

    /// Assign an instance collection to a host in both views.
    ///
    /// Returns false when the host is unknown.
    pub fn assign_instances(&self, key: &HostKey, instances: Vec<Instance>) -> bool {
        let current = self.current();
        let (Some(full), Some(partial)) = (current.full.get(key), current.partial.get(key)) else {
            return false;
        };
        lock_host(full).assign_instances(instances.iter().cloned());
        lock_host(partial).assign_instances(instances);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.current().full.len()
    }

    fn current(&self) -> Arc<HostViews> {
        Arc::clone(&self.views.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl HostStateProvider for HostStateTracker {
    fn refresh(&self) -> InventoryResult<()> {
        HostStateTracker::refresh(self)
    }

    fn snapshot(&self, view: HostView) -> Vec<SharedHostState> {
        HostStateTracker::snapshot(self, view)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeInventory;
    use super::*;
    use crate::host_state::test_support::{compute_node, instance};

    fn tracker_with(inventory: Arc<FakeInventory>) -> HostStateTracker {
        HostStateTracker::new(inventory, "compute", AllocationConfig::default())
    }

    fn free_ram(tracker: &HostStateTracker, view: HostView, host: &str, node: &str) -> i64 {
        let state = tracker.host_state(view, &HostKey::new(host, node)).unwrap();
        let free = lock_host(&state).free_ram_mb;
        free
    }

    #[test]
    fn refresh_builds_both_views() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        inventory.add_host(compute_node("host2", "node2", 4096, 4096));
        let tracker = tracker_with(inventory);

        tracker.refresh().unwrap();

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.snapshot(HostView::Full).len(), 2);
        assert_eq!(tracker.snapshot(HostView::Partial).len(), 2);
    }

    #[test]
    fn node_without_service_is_skipped() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        inventory
            .nodes
            .lock()
            .unwrap()
            .push(compute_node("orphan", "node9", 4096, 4096));
        let tracker = tracker_with(inventory);

        tracker.refresh().unwrap();

        assert_eq!(tracker.len(), 1);
        assert!(tracker.host_state(HostView::Full, &HostKey::new("orphan", "node9")).is_none());
    }

    #[test]
    fn partial_view_credits_preemptible_load() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        inventory.add_instance(instance("a", "host1", "node1", 1024, false));
        inventory.add_instance(instance("b", "host1", "node1", 512, true));
        inventory.add_instance(instance("c", "host1", "node1", 256, true));
        let tracker = tracker_with(inventory);

        tracker.refresh().unwrap();

        let full = free_ram(&tracker, HostView::Full, "host1", "node1");
        let partial = free_ram(&tracker, HostView::Partial, "host1", "node1");
        assert_eq!(full, 1024);
        assert_eq!(partial, full + 512 + 256);

        let full_state = tracker.host_state(HostView::Full, &HostKey::new("host1", "node1")).unwrap();
        let partial_state = tracker.host_state(HostView::Partial, &HostKey::new("host1", "node1")).unwrap();
        let full_state = lock_host(&full_state);
        let partial_state = lock_host(&partial_state);
        assert_eq!(partial_state.free_disk_mb, full_state.free_disk_mb + 2 * 1024);
        assert_eq!(partial_state.vcpus_used, full_state.vcpus_used - 2);
    }

    #[test]
    fn repeated_refresh_keeps_views_consistent() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        inventory.add_instance(instance("b", "host1", "node1", 512, true));
        let tracker = tracker_with(inventory);

        for _ in 0..3 {
            tracker.refresh().unwrap();
            let full = free_ram(&tracker, HostView::Full, "host1", "node1");
            let partial = free_ram(&tracker, HostView::Partial, "host1", "node1");
            assert_eq!(partial, full + 512);
        }
    }

    #[test]
    fn instances_are_scoped_to_their_node() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("multi", "node1", 4096, 1024));
        inventory
            .nodes
            .lock()
            .unwrap()
            .push(compute_node("multi", "node2", 4096, 1024));
        inventory.add_instance(instance("b", "multi", "node2", 512, true));
        let tracker = tracker_with(inventory);

        tracker.refresh().unwrap();

        assert_eq!(free_ram(&tracker, HostView::Partial, "multi", "node1"), 1024);
        assert_eq!(free_ram(&tracker, HostView::Partial, "multi", "node2"), 1536);
    }

    #[test]
    fn dead_nodes_are_swept_from_both_views() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        inventory.add_host(compute_node("host2", "node2", 4096, 1024));
        let tracker = tracker_with(inventory.clone());
        tracker.refresh().unwrap();
        assert_eq!(tracker.len(), 2);

        inventory.nodes.lock().unwrap().retain(|n| n.host != "host2");
        tracker.refresh().unwrap();

        let key = HostKey::new("host2", "node2");
        assert_eq!(tracker.len(), 1);
        assert!(tracker.host_state(HostView::Full, &key).is_none());
        assert!(tracker.host_state(HostView::Partial, &key).is_none());
    }

    #[test]
    fn refresh_reuses_entries_and_keeps_speculative_state() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        let tracker = tracker_with(inventory);
        tracker.refresh().unwrap();

        let key = HostKey::new("host1", "node1");
        let before = tracker.host_state(HostView::Full, &key).unwrap();
        lock_host(&before).free_ram_mb = 0;
        lock_host(&before).updated = Some(u64::MAX);

        tracker.refresh().unwrap();
        let after = tracker.host_state(HostView::Full, &key).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(lock_host(&after).free_ram_mb, 0);

        lock_host(&after).invalidate();
        tracker.refresh().unwrap();
        assert_eq!(lock_host(&after).free_ram_mb, 1024);
    }

    #[test]
    fn inventory_failure_propagates_and_keeps_old_snapshot() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        let tracker = tracker_with(inventory.clone());
        tracker.refresh().unwrap();

        *inventory.fail.lock().unwrap() = true;
        assert!(tracker.refresh().is_err());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn assign_instances_updates_both_views() {
        let inventory = Arc::new(FakeInventory::default());
        inventory.add_host(compute_node("host1", "node1", 4096, 1024));
        let tracker = tracker_with(inventory);
        tracker.refresh().unwrap();

        let key = HostKey::new("host1", "node1");
        assert!(tracker.assign_instances(
            &key,
            vec![
                instance("a", "host1", "node1", 256, false),
                instance("b", "host1", "node1", 512, true),
            ],
        ));
        assert!(!tracker.assign_instances(&HostKey::new("nope", "nope"), Vec::new()));

        for view in [HostView::Full, HostView::Partial] {
            let state = tracker.host_state(view, &key).unwrap();
            let state = lock_host(&state);
            assert_eq!(state.preemptible_count(), 1);
            assert_eq!(state.normal_instance_ids().len(), 1);
        }
        assert_eq!(free_ram(&tracker, HostView::Partial, "host1", "node1"), 1024 + 512);
    }
}
