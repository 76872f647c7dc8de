//! Preemptible eviction — victim selection and termination.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use spotgrid_inventory::{HostName, InstanceId, NodeName};
use spotgrid_placement::{HostResourceState, RequestSpec};

use crate::context::RequestContext;
use crate::error::{NOT_ENOUGH_HOSTS, SchedulerError, SchedulerResult};
use crate::lifecycle::LifecycleService;

/// A preemptible instance chosen for termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionCandidate {
    pub instance_id: InstanceId,
    pub host: HostName,
    pub node: NodeName,
}

/// Pick preemptible instances to terminate on an over-committed host.
///
/// Exactly one victim is chosen per host, however large the deficit. A
/// host with no preemptible instance yields `NoValidHost`.
pub fn select_victims(
    host: &HostResourceState,
    _request: &RequestSpec,
) -> SchedulerResult<Vec<EvictionCandidate>> {
    let victim = host
        .preemptible_instance_ids()
        .last()
        .ok_or_else(|| SchedulerError::no_valid_host(NOT_ENOUGH_HOSTS))?;

    Ok(vec![EvictionCandidate {
        instance_id: victim.clone(),
        host: host.key.host.clone(),
        node: host.key.node.clone(),
    }])
}

/// Terminates victims through a lifecycle service.
pub struct EvictionExecutor {
    lifecycle: Arc<dyn LifecycleService>,
}

impl EvictionExecutor {
    pub fn new(lifecycle: Arc<dyn LifecycleService>) -> Self {
        Self { lifecycle }
    }

    /// Fetch and delete every victim with an elevated copy of `ctx`.
    ///
    /// Stops at the first failure; victims already deleted stay deleted.
    pub fn terminate(
        &self,
        ctx: &RequestContext,
        victims: &[EvictionCandidate],
    ) -> SchedulerResult<()> {
        let elevated = ctx.elevated();
        for victim in victims {
            info!(
                request = %ctx.request_id,
                instance = %victim.instance_id,
                host = %victim.host,
                node = %victim.node,
                "evicting preemptible instance"
            );
            let instance = self.lifecycle.get(&elevated, &victim.instance_id)?;
            self.lifecycle.delete(&elevated, &instance)?;
        }
        Ok(())
    }
}
