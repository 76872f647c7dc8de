//! Placement error types.

use thiserror::Error;

/// Errors raised while building the placement engine.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("unknown weigher: {0}")]
    UnknownWeigher(String),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
