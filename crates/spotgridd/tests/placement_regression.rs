//! Placement regression tests.
//!
//! Drives the full stack (redb inventory, host state tracker, placement
//! engine, scheduler, store-backed lifecycle) through the behaviours the
//! scheduler guarantees to its callers.

use std::collections::HashMap;
use std::sync::Arc;

use spotgrid_core::SpotgridConfig;
use spotgrid_inventory::*;
use spotgrid_placement::*;
use spotgrid_scheduler::error::NOT_ENOUGH_HOSTS;
use spotgrid_scheduler::{RequestContext, Scheduler, SchedulerError};

fn test_store() -> Arc<InventoryStore> {
    Arc::new(InventoryStore::open_in_memory().unwrap())
}

fn add_host(store: &InventoryStore, host: &str, memory_mb: i64, free_ram_mb: i64) {
    store
        .put_compute_node(&ComputeNode {
            host: host.to_string(),
            hypervisor_hostname: format!("{host}.node"),
            memory_mb,
            free_ram_mb,
            local_gb: 200,
            free_disk_gb: 200,
            vcpus: 32,
            vcpus_used: 0,
            cpu_allocation_ratio: 0.0,
            ram_allocation_ratio: 1.0,
            disk_allocation_ratio: 0.0,
            running_vms: 0,
            updated_at: 1000,
        })
        .unwrap();
    store
        .put_service(&ComputeService {
            host: host.to_string(),
            kind: "compute".to_string(),
            disabled: false,
            forced_down: false,
            last_seen_at: 1000,
        })
        .unwrap();
}

fn add_instance(store: &InventoryStore, id: &str, host: &str, memory_mb: i64, preemptible: bool) {
    let mut system_metadata = HashMap::new();
    if preemptible {
        system_metadata.insert(PREEMPTIBLE_KEY.to_string(), "True".to_string());
    }
    store
        .put_instance(&Instance {
            id: id.to_string(),
            host: host.to_string(),
            node: format!("{host}.node"),
            project_id: "tenant".to_string(),
            memory_mb,
            root_gb: 10,
            ephemeral_gb: 0,
            vcpus: 2,
            system_metadata,
            created_at: 1000,
        })
        .unwrap();
}

fn config(toml: &str) -> SpotgridConfig {
    SpotgridConfig::from_toml_str(toml).unwrap()
}

/// Scheduler over `store` that also hands back its tracker.
fn scheduler(store: &Arc<InventoryStore>, config: &SpotgridConfig) -> (Arc<HostStateTracker>, Scheduler) {
    let tracker = Arc::new(HostStateTracker::from_config(store.clone(), config));
    let engine = PlacementEngine::from_config(tracker.clone(), config)
        .unwrap()
        .with_seed(2015);
    (tracker, Scheduler::new(engine, store.clone()))
}

fn request(count: u32, memory_mb: i64) -> RequestSpec {
    RequestSpec::new(
        count,
        InstanceShape {
            memory_mb,
            root_gb: 10,
            ephemeral_gb: 0,
            vcpus: 2,
            ..InstanceShape::default()
        },
    )
}

fn ctx() -> RequestContext {
    RequestContext::new("tenant", "user")
}

fn key(host: &str) -> HostKey {
    HostKey::new(host, format!("{host}.node"))
}

#[test]
fn overcommitted_destination_evicts_its_single_preemptible() {
    let store = test_store();
    add_host(&store, "h1", 8192, 0);
    add_instance(&store, "durable-1", "h1", 6144, false);
    add_instance(&store, "spot-1", "h1", 2048, true);
    let (_, scheduler) = scheduler(&store, &SpotgridConfig::default());

    let destinations = scheduler.select_destinations(&ctx(), &request(1, 2048)).unwrap();

    assert_eq!(destinations.len(), 1);
    assert_eq!(destinations[0].host, "h1");
    assert_eq!(destinations[0].node, "h1.node");
    assert!(store.get_instance("spot-1").unwrap().is_none());
    assert!(store.get_instance("durable-1").unwrap().is_some());
}

#[test]
fn overcommitted_destination_without_preemptibles_is_no_valid_host() {
    let store = test_store();
    add_host(&store, "h1", 8192, 0);
    add_instance(&store, "durable-1", "h1", 8192, false);
    // Without the RAM filter the full host stays a candidate.
    let cfg = config("[scheduler]\nfilters = [\"compute\"]\n");
    let (tracker, scheduler) = scheduler(&store, &cfg);

    let result = scheduler.select_destinations(&ctx(), &request(1, 2048));

    assert!(matches!(result, Err(SchedulerError::NoValidHost { .. })));
    assert!(store.get_instance("durable-1").unwrap().is_some());
    let state = tracker.host_state(HostView::Full, &key("h1")).unwrap();
    assert_eq!(lock_host(&state).updated, None);
}

#[test]
fn short_multi_instance_request_invalidates_chosen_hosts() {
    let store = test_store();
    add_host(&store, "a", 4096, 2048);
    add_host(&store, "b", 4096, 2048);
    let (tracker, scheduler) = scheduler(&store, &SpotgridConfig::default());

    let result = scheduler.select_destinations(&ctx(), &request(5, 1024));

    match result {
        Err(SchedulerError::NoValidHost { reason }) => {
            assert_eq!(reason, NOT_ENOUGH_HOSTS);
            assert!(!reason.contains(".node"));
        }
        other => panic!("expected NoValidHost, got {other:?}"),
    }
    for host in ["a", "b"] {
        for view in [HostView::Full, HostView::Partial] {
            let state = tracker.host_state(view, &key(host)).unwrap();
            assert_eq!(lock_host(&state).updated, None);
        }
    }

    // Speculative consumption is dropped on the next refresh.
    tracker.refresh().unwrap();
    let state = tracker.host_state(HostView::Full, &key("a")).unwrap();
    assert_eq!(lock_host(&state).free_ram_mb, 2048);
}

#[test]
fn durable_request_fits_only_through_partial_view() {
    let store = test_store();
    add_host(&store, "h1", 8192, 0);
    add_instance(&store, "spot-1", "h1", 4096, true);
    add_instance(&store, "spot-2", "h1", 4096, true);
    let (_, scheduler) = scheduler(&store, &SpotgridConfig::default());

    let preemptible = scheduler.select_destinations(&ctx(), &request(1, 2048).preemptible());
    assert!(matches!(preemptible, Err(SchedulerError::NoValidHost { .. })));

    let durable = scheduler.select_destinations(&ctx(), &request(1, 2048)).unwrap();
    assert_eq!(durable[0].host, "h1");
    assert_eq!(
        [store.get_instance("spot-1").unwrap(), store.get_instance("spot-2").unwrap()]
            .iter()
            .filter(|i| i.is_none())
            .count(),
        1
    );
}

#[test]
fn partial_view_equals_full_plus_preemptible_footprint() {
    let store = test_store();
    add_host(&store, "a", 16384, 4096);
    add_host(&store, "b", 16384, 8192);
    add_instance(&store, "a-spot-1", "a", 2048, true);
    add_instance(&store, "a-spot-2", "a", 1024, true);
    add_instance(&store, "a-durable", "a", 4096, false);
    add_instance(&store, "b-durable", "b", 4096, false);
    let tracker = HostStateTracker::from_config(store.clone(), &SpotgridConfig::default());

    tracker.refresh().unwrap();
    tracker.refresh().unwrap();

    for host in ["a", "b"] {
        let full = tracker.host_state(HostView::Full, &key(host)).unwrap();
        let partial = tracker.host_state(HostView::Partial, &key(host)).unwrap();
        let full = lock_host(&full);
        let partial = lock_host(&partial);

        let spot: Vec<&Instance> = full.preemptible_instances().collect();
        let ram: i64 = spot.iter().map(|i| i.memory_mb).sum();
        let disk: i64 = spot.iter().map(|i| i.disk_mb()).sum();
        let vcpus: i64 = spot.iter().map(|i| i64::from(i.vcpus)).sum();

        assert_eq!(partial.free_ram_mb, full.free_ram_mb + ram);
        assert_eq!(partial.free_disk_mb, full.free_disk_mb + disk);
        assert_eq!(partial.vcpus_used, full.vcpus_used - vcpus);

        assert!(full.normal_instance_ids().is_disjoint(full.preemptible_instance_ids()));
        assert_eq!(
            full.normal_instance_ids().len() + full.preemptible_instance_ids().len(),
            full.instances().count()
        );
    }
}

#[test]
fn preemptible_requests_avoid_hosts_with_preemptible_load() {
    let store = test_store();
    add_host(&store, "busy", 65536, 32768);
    add_host(&store, "quiet", 65536, 16384);
    add_instance(&store, "busy-spot", "busy", 1024, true);
    let (_, scheduler) = scheduler(&store, &SpotgridConfig::default());

    let destinations = scheduler
        .select_destinations(&ctx(), &request(1, 1024).preemptible())
        .unwrap();

    assert_eq!(destinations[0].host, "quiet");
}

#[test]
fn snapshot_seeded_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spotgrid.redb");
    let snapshot: InventorySnapshot = serde_json::from_str(
        r#"{
            "compute_nodes": [{
                "host": "h1", "hypervisor_hostname": "h1.node",
                "memory_mb": 4096, "free_ram_mb": 4096,
                "local_gb": 100, "free_disk_gb": 100,
                "vcpus": 8, "vcpus_used": 0,
                "running_vms": 0, "updated_at": 1000
            }],
            "services": [{
                "host": "h1", "kind": "compute",
                "disabled": false, "forced_down": false, "last_seen_at": 1000
            }]
        }"#,
    )
    .unwrap();

    {
        let store = InventoryStore::open(&path).unwrap();
        store.load_snapshot(&snapshot).unwrap();
    }

    let store = Arc::new(InventoryStore::open(&path).unwrap());
    let (_, scheduler) = scheduler(&store, &SpotgridConfig::default());
    let destinations = scheduler.select_destinations(&ctx(), &request(2, 1024)).unwrap();

    assert_eq!(destinations.len(), 2);
    // Unreported node ratio falls back to the configured 1.5.
    assert_eq!(destinations[0].limits.memory_mb, 4096.0 * 1.5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_host_state() {
    let store = test_store();
    for host in ["a", "b", "c", "d"] {
        add_host(&store, host, 32768, 16384);
    }
    let (tracker, scheduler) = scheduler(&store, &SpotgridConfig::default());
    let scheduler = Arc::new(scheduler);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let scheduler = scheduler.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            scheduler.select_destinations(&ctx(), &request(1, 1024).preemptible())
        }));
    }
    for handle in handles {
        let destinations = handle.await.unwrap().unwrap();
        assert_eq!(destinations.len(), 1);
    }

    // Every placement was consumed exactly once on the full view.
    let consumed: i64 = tracker
        .snapshot(HostView::Full)
        .iter()
        .map(|h| 16384 - lock_host(h).free_ram_mb)
        .sum();
    assert_eq!(consumed, 16 * 1024);
}
