//! Scheduler error types.

use thiserror::Error;

use spotgrid_inventory::{InstanceId, InventoryError};
use spotgrid_placement::PlacementError;

/// Reason given when a request cannot be fully placed. Deliberately says
/// nothing about the hosts that were available.
pub const NOT_ENOUGH_HOSTS: &str = "There are not enough hosts available.";

/// Errors returned by a lifecycle service.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("instance not found: {0}")]
    NotFound(InstanceId),

    #[error("operation requires an elevated context")]
    Forbidden,

    #[error("lifecycle backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while selecting destinations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no valid host was found: {reason}")]
    NoValidHost { reason: String },

    #[error("inventory unavailable: {0}")]
    InventoryUnavailable(#[from] InventoryError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("placement configuration error: {0}")]
    Placement(#[from] PlacementError),
}

impl SchedulerError {
    pub fn no_valid_host(reason: impl Into<String>) -> Self {
        Self::NoValidHost {
            reason: reason.into(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
