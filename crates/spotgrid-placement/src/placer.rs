//! Placement engine — the per-request scheduling loop.
//!
//! For each instance of a request the engine filters the candidate view,
//! weighs the full-view counterparts of the survivors, draws one host at
//! random from the best `host_subset_size`, and speculatively consumes the
//! request's shape on that host before moving to the next instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use spotgrid_core::SpotgridConfig;
use spotgrid_inventory::{HostName, InventoryResult, NodeName};

use crate::error::PlacementResult;
use crate::filters::FilterChain;
use crate::host_state::{HostKey, HostLimits, HostResourceState, HostView, epoch_secs};
use crate::request::RequestSpec;
use crate::tracker::{HostStateProvider, SharedHostState, lock_host};
use crate::weights::{WeighedHost, Weigher, weigh_hosts, weighers_from_names};

/// Where one instance of a request should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub host: HostName,
    pub node: NodeName,
    pub limits: HostLimits,
}

impl Destination {
    pub fn from_state(state: &HostResourceState) -> Self {
        Self {
            host: state.key.host.clone(),
            node: state.key.node.clone(),
            limits: state.limits(),
        }
    }
}

/// One placed instance: the chosen host in both views.
#[derive(Debug, Clone)]
pub struct Selection {
    pub key: HostKey,
    /// Full-view state; overcommit checks run against this one.
    pub full: SharedHostState,
    /// State from the view the request was filtered on. Same entry as
    /// `full` for preemptible requests.
    pub candidate: SharedHostState,
    pub weight: f64,
}

impl Selection {
    pub fn destination(&self) -> Destination {
        Destination::from_state(&lock_host(&self.full))
    }

    /// Force both views of the host to be re-read on the next refresh.
    pub fn invalidate(&self) {
        lock_host(&self.full).invalidate();
        if !Arc::ptr_eq(&self.full, &self.candidate) {
            lock_host(&self.candidate).invalidate();
        }
    }
}

/// Pick uniformly among the best `subset_size` weighed hosts.
///
/// `weighed` must be sorted best first. A subset size of zero behaves as
/// one. Returns `None` only when `weighed` is empty.
pub fn choose_host<'a, R: Rng + ?Sized>(
    weighed: &'a [WeighedHost],
    subset_size: usize,
    rng: &mut R,
) -> Option<&'a WeighedHost> {
    let window = subset_size.max(1).min(weighed.len());
    weighed[..window].choose(rng)
}

pub struct PlacementEngine {
    provider: Arc<dyn HostStateProvider>,
    filters: FilterChain,
    weighers: Vec<Box<dyn Weigher>>,
    host_subset_size: usize,
    rng: Mutex<StdRng>,
}

impl PlacementEngine {
    pub fn new(
        provider: Arc<dyn HostStateProvider>,
        filters: FilterChain,
        weighers: Vec<Box<dyn Weigher>>,
        host_subset_size: usize,
    ) -> Self {
        Self {
            provider,
            filters,
            weighers,
            host_subset_size: host_subset_size.max(1),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Build filters and weighers from their configured names.
    pub fn from_config(
        provider: Arc<dyn HostStateProvider>,
        config: &SpotgridConfig,
    ) -> PlacementResult<Self> {
        let filters = FilterChain::from_names(config.scheduler.filters.as_slice())?;
        let weighers =
            weighers_from_names(config.scheduler.weighers.as_slice(), &config.weights)?;
        Ok(Self::new(
            provider,
            filters,
            weighers,
            config.scheduler.effective_subset_size(),
        ))
    }

    /// Replace the random source with a deterministic one.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Place up to `spec.num_instances` instances.
    ///
    /// Stops early, without error, once no host passes the filters; the
    /// caller decides what a short result means.
    pub fn schedule(&self, spec: &RequestSpec) -> InventoryResult<Vec<Selection>> {
        let view = if spec.is_preemptible() {
            HostView::Full
        } else {
            HostView::Partial
        };

        self.provider.refresh()?;
        let candidates = self.provider.snapshot(view);
        let full: HashMap<HostKey, SharedHostState> = self
            .provider
            .snapshot(HostView::Full)
            .into_iter()
            .map(|host| (key_of(&host), host))
            .collect();

        debug!(?view, hosts = candidates.len(), count = spec.num_instances, "starting placement");

        let mut spec = spec.clone();
        let mut selections = Vec::new();

        for index in 0..spec.num_instances {
            let passed = self.filters.filter(candidates.clone(), &spec, index);
            if passed.is_empty() {
                debug!(index, "no hosts passed filters");
                break;
            }

            let mut by_key = HashMap::with_capacity(passed.len());
            let mut counterparts = Vec::with_capacity(passed.len());
            for host in passed {
                let key = key_of(&host);
                if let Some(full_host) = full.get(&key) {
                    counterparts.push(Arc::clone(full_host));
                    by_key.insert(key, host);
                }
            }
            debug!(index, hosts = ?by_key.keys().map(ToString::to_string).collect::<Vec<_>>(), "filtered hosts");

            let weighed = weigh_hosts(&self.weighers, counterparts, &spec);
            debug!(
                index,
                hosts = ?weighed.iter().map(|w| format!("{}={:.3}", w.key, w.weight)).collect::<Vec<_>>(),
                "weighed hosts"
            );

            let chosen = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                choose_host(&weighed, self.host_subset_size, &mut *rng).cloned()
            };
            let Some(chosen) = chosen else {
                break;
            };
            let Some(candidate) = by_key.remove(&chosen.key) else {
                break;
            };

            let now = epoch_secs();
            lock_host(&chosen.host).consume_from_request(&spec.shape, now);
            if !Arc::ptr_eq(&candidate, &chosen.host) {
                lock_host(&candidate).consume_from_request(&spec.shape, now);
            }

            if let Some(group) = spec.group.as_mut() {
                group.hosts.insert(chosen.key.host.clone());
            }

            debug!(index, host = %lock_host(&chosen.host), "selected host");
            selections.push(Selection {
                key: chosen.key,
                full: chosen.host,
                candidate,
                weight: chosen.weight,
            });
        }

        Ok(selections)
    }
}

fn key_of(host: &SharedHostState) -> HostKey {
    lock_host(host).key.clone()
}
