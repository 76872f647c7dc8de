//! spotgrid-inventory — compute inventory for the SpotGrid scheduler.
//!
//! Holds the records the scheduler reads every cycle: compute nodes,
//! the services that own them, and the instances running on each host.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Compute nodes are keyed `{host}/{node}`, services `{kind}/{host}` and
//! instances by their id, so host- and kind-scoped listings are scans.
//!
//! The scheduler only depends on the [`Inventory`] trait; [`InventoryStore`]
//! is the redb-backed implementation used by the daemon and tests.

pub mod error;
pub mod inventory;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{InventoryError, InventoryResult};
pub use inventory::Inventory;
pub use store::InventoryStore;
pub use types::*;
