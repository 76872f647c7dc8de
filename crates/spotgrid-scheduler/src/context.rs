//! Request context carried through a scheduling call.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use spotgrid_placement::epoch_secs;

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Who is asking, and with what privileges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub project_id: String,
    pub user_id: String,
    pub is_admin: bool,
}

impl RequestContext {
    /// An unprivileged context with a fresh request id.
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let seq = NEXT_REQUEST.fetch_add(1, Ordering::Relaxed);
        Self {
            request_id: format!("req-{:x}-{seq:06}", epoch_secs()),
            project_id: project_id.into(),
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    /// The same caller with administrative privileges, for acting on
    /// instances the caller does not own.
    pub fn elevated(&self) -> Self {
        Self {
            is_admin: true,
            ..self.clone()
        }
    }
}
