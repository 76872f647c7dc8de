//! Instance lifecycle service — the only way the scheduler touches
//! running instances.

use tracing::debug;

use spotgrid_inventory::{Instance, InventoryStore};

use crate::context::RequestContext;
use crate::error::LifecycleError;

/// Fetch and terminate instances.
pub trait LifecycleService: Send + Sync {
    fn get(&self, ctx: &RequestContext, id: &str) -> Result<Instance, LifecycleError>;

    /// Request termination of an instance.
    fn delete(&self, ctx: &RequestContext, instance: &Instance) -> Result<(), LifecycleError>;
}

/// Store-backed lifecycle: instances are records in the inventory and
/// termination removes the record. Only elevated contexts may act.
impl LifecycleService for InventoryStore {
    fn get(&self, ctx: &RequestContext, id: &str) -> Result<Instance, LifecycleError> {
        if !ctx.is_admin {
            return Err(LifecycleError::Forbidden);
        }
        self.get_instance(id)
            .map_err(|e| LifecycleError::Backend(e.to_string()))?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    fn delete(&self, ctx: &RequestContext, instance: &Instance) -> Result<(), LifecycleError> {
        if !ctx.is_admin {
            return Err(LifecycleError::Forbidden);
        }
        let existed = self
            .delete_instance(&instance.id)
            .map_err(|e| LifecycleError::Backend(e.to_string()))?;
        if !existed {
            return Err(LifecycleError::NotFound(instance.id.clone()));
        }
        debug!(request = %ctx.request_id, instance = %instance.id, "instance record removed");
        Ok(())
    }
}
