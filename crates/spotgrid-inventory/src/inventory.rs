//! The inventory contract the scheduler consumes.

use crate::error::InventoryResult;
use crate::types::{ComputeNode, ComputeService, Instance};

/// Read access to compute inventory.
///
/// Calls are blocking I/O against whatever backs the inventory; the
/// scheduler makes them only while refreshing host state.
pub trait Inventory: Send + Sync {
    fn list_compute_nodes(&self) -> InventoryResult<Vec<ComputeNode>>;

    fn list_services_by_kind(&self, kind: &str) -> InventoryResult<Vec<ComputeService>>;

    fn list_instances_by_host(&self, host: &str) -> InventoryResult<Vec<Instance>>;
}
