//! redb table definitions for the SpotGrid inventory.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Compute nodes keyed by `{host}/{hypervisor_hostname}`.
pub const COMPUTE_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("compute_nodes");

/// Services keyed by `{kind}/{host}`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Instances keyed by instance id.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
