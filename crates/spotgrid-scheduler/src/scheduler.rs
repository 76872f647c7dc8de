//! Scheduler — the caller-facing destination selection contract.
//!
//! `select_destinations` runs the placement engine, turns a short result
//! into `NoValidHost` (after invalidating every tentatively chosen host so
//! its speculative consumption does not leak into the next cycle), and
//! evicts one preemptible instance from each host a durable request
//! left over-committed.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use spotgrid_core::SpotgridConfig;
use spotgrid_inventory::Inventory;
use spotgrid_placement::{
    Destination, HostStateProvider, HostStateTracker, PlacementEngine, RequestSpec, Selection,
    is_overcommitted, lock_host,
};

use crate::context::RequestContext;
use crate::error::{NOT_ENOUGH_HOSTS, SchedulerError, SchedulerResult};
use crate::eviction::{EvictionExecutor, select_victims};
use crate::lifecycle::LifecycleService;

pub struct Scheduler {
    engine: PlacementEngine,
    evictor: EvictionExecutor,
}

impl Scheduler {
    pub fn new(engine: PlacementEngine, lifecycle: Arc<dyn LifecycleService>) -> Self {
        Self {
            engine,
            evictor: EvictionExecutor::new(lifecycle),
        }
    }

    /// Wire a tracker, engine and evictor from configuration.
    pub fn from_config(
        inventory: Arc<dyn Inventory>,
        lifecycle: Arc<dyn LifecycleService>,
        config: &SpotgridConfig,
    ) -> SchedulerResult<Self> {
        let tracker: Arc<dyn HostStateProvider> =
            Arc::new(HostStateTracker::from_config(inventory, config));
        let engine = PlacementEngine::from_config(tracker, config)?;
        Ok(Self::new(engine, lifecycle))
    }

    /// Choose a destination for every instance of `spec`.
    ///
    /// Fails with `NoValidHost` when fewer destinations than requested
    /// were found, or when a durable placement over-commits a host with
    /// no preemptible instance left to evict. Any failure invalidates the
    /// chosen hosts.
    pub fn select_destinations(
        &self,
        ctx: &RequestContext,
        spec: &RequestSpec,
    ) -> SchedulerResult<Vec<Destination>> {
        let preemptible = spec.is_preemptible();
        info!(
            request = %ctx.request_id,
            count = spec.num_instances,
            preemptible,
            "select_destinations.start"
        );

        let selections = self.engine.schedule(spec)?;

        if selections.len() < spec.num_instances as usize {
            invalidate_all(&selections);
            debug!(
                request = %ctx.request_id,
                hosts = selections.len(),
                requested = spec.num_instances,
                "not enough hosts available for request"
            );
            return Err(SchedulerError::no_valid_host(NOT_ENOUGH_HOSTS));
        }

        let destinations = match self.finalize(ctx, spec, preemptible, &selections) {
            Ok(destinations) => destinations,
            Err(e) => {
                invalidate_all(&selections);
                return Err(e);
            }
        };

        info!(
            request = %ctx.request_id,
            count = destinations.len(),
            "select_destinations.end"
        );
        Ok(destinations)
    }

    /// Evict where needed and build the destination list.
    ///
    /// Victims are chosen for every over-committed host before any is
    /// terminated, so a host with nothing to evict fails the request
    /// without touching the others.
    fn finalize(
        &self,
        ctx: &RequestContext,
        spec: &RequestSpec,
        preemptible: bool,
        selections: &[Selection],
    ) -> SchedulerResult<Vec<Destination>> {
        if !preemptible {
            let mut checked = BTreeSet::new();
            let mut victims = Vec::new();
            for selection in selections {
                if !checked.insert(&selection.key) {
                    continue;
                }
                let host = lock_host(&selection.full);
                if is_overcommitted(&host) {
                    debug!(host = %host, "destination over-committed");
                    victims.extend(select_victims(&host, spec)?);
                }
            }
            self.evictor.terminate(ctx, &victims)?;
        }

        Ok(selections.iter().map(Selection::destination).collect())
    }
}

fn invalidate_all(selections: &[Selection]) {
    for selection in selections {
        selection.invalidate();
    }
}
