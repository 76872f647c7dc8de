//! `seed` and `hosts` subcommands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use spotgrid_inventory::InventorySnapshot;
use spotgrid_placement::{HostStateTracker, HostView, lock_host};

use crate::{load_config, open_store};

pub fn seed(data_dir: &Path, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading snapshot {}", file.display()))?;
    let snapshot: InventorySnapshot =
        serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", file.display()))?;

    let store = open_store(data_dir)?;
    store.load_snapshot(&snapshot)?;

    info!(
        nodes = snapshot.compute_nodes.len(),
        services = snapshot.services.len(),
        instances = snapshot.instances.len(),
        "inventory seeded"
    );
    Ok(())
}

pub fn hosts(data_dir: &Path, config: Option<&Path>, view: HostView) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let store = Arc::new(open_store(data_dir)?);
    let tracker = HostStateTracker::from_config(store, &config);
    tracker.refresh()?;

    for host in tracker.snapshot(view) {
        println!("{}", lock_host(&host));
    }
    Ok(())
}
