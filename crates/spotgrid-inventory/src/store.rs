//! InventoryStore — redb-backed compute inventory.
//!
//! Provides typed CRUD operations over compute nodes, services and
//! instances. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::Inventory;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into an `InventoryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| InventoryError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe inventory store backed by redb.
#[derive(Clone)]
pub struct InventoryStore {
    db: Arc<Database>,
}

impl InventoryStore {
    /// Open (or create) a persistent inventory at the given path.
    pub fn open(path: &Path) -> InventoryResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "inventory store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory inventory (for testing).
    pub fn open_in_memory() -> InventoryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory inventory store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> InventoryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(COMPUTE_NODES).map_err(map_err!(Table))?;
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Upsert every record of a snapshot.
    pub fn load_snapshot(&self, snapshot: &InventorySnapshot) -> InventoryResult<()> {
        for node in &snapshot.compute_nodes {
            self.put_compute_node(node)?;
        }
        for svc in &snapshot.services {
            self.put_service(svc)?;
        }
        for inst in &snapshot.instances {
            self.put_instance(inst)?;
        }
        debug!(
            nodes = snapshot.compute_nodes.len(),
            services = snapshot.services.len(),
            instances = snapshot.instances.len(),
            "inventory snapshot loaded"
        );
        Ok(())
    }

    // ── Compute nodes ──────────────────────────────────────────────

    /// Insert or update a compute node.
    pub fn put_compute_node(&self, node: &ComputeNode) -> InventoryResult<()> {
        self.put(COMPUTE_NODES, &node.table_key(), node)
    }

    /// Get a compute node by host and hypervisor hostname.
    pub fn get_compute_node(&self, host: &str, node: &str) -> InventoryResult<Option<ComputeNode>> {
        self.get(COMPUTE_NODES, &format!("{host}/{node}"))
    }

    /// Delete a compute node. Returns true if it existed.
    pub fn delete_compute_node(&self, host: &str, node: &str) -> InventoryResult<bool> {
        self.remove(COMPUTE_NODES, &format!("{host}/{node}"))
    }

    // ── Services ───────────────────────────────────────────────────

    /// Insert or update a service record.
    pub fn put_service(&self, svc: &ComputeService) -> InventoryResult<()> {
        self.put(SERVICES, &svc.table_key(), svc)
    }

    /// Delete a service by kind and host. Returns true if it existed.
    pub fn delete_service(&self, kind: &str, host: &str) -> InventoryResult<bool> {
        self.remove(SERVICES, &format!("{kind}/{host}"))
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance.
    pub fn put_instance(&self, inst: &Instance) -> InventoryResult<()> {
        self.put(INSTANCES, &inst.id, inst)
    }

    /// Get an instance by id.
    pub fn get_instance(&self, id: &str) -> InventoryResult<Option<Instance>> {
        self.get(INSTANCES, id)
    }

    /// Delete an instance by id. Returns true if it existed.
    pub fn delete_instance(&self, id: &str) -> InventoryResult<bool> {
        let existed = self.remove(INSTANCES, id)?;
        debug!(%id, existed, "instance deleted");
        Ok(existed)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn put<T: Serialize>(&self, def: Table, key: &str, value: &T) -> InventoryResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, def: Table, key: &str) -> InventoryResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Scan a table, keeping the records `keep` accepts.
    fn scan<T, F>(&self, def: Table, keep: F) -> InventoryResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&str, &T) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(key.value(), &record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn remove(&self, def: Table, key: &str) -> InventoryResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

impl Inventory for InventoryStore {
    fn list_compute_nodes(&self) -> InventoryResult<Vec<ComputeNode>> {
        self.scan(COMPUTE_NODES, |_, _: &ComputeNode| true)
    }

    fn list_services_by_kind(&self, kind: &str) -> InventoryResult<Vec<ComputeService>> {
        let prefix = format!("{kind}/");
        self.scan(SERVICES, |key, _: &ComputeService| key.starts_with(&prefix))
    }

    fn list_instances_by_host(&self, host: &str) -> InventoryResult<Vec<Instance>> {
        self.scan(INSTANCES, |_, inst: &Instance| inst.host == host)
    }
}
