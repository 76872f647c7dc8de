//! Host weighing.
//!
//! Each [`Weigher`] produces a raw weight per host. Raw weights are
//! normalized to `[0, 1]` per weigher (using the weigher's declared bounds
//! where it has them, the observed range otherwise), multiplied by the
//! weigher's multiplier and summed. Higher totals win.

mod preemptible;
mod ram;

pub use preemptible::{PreemptibleCountWeigher, PreemptibleDurationWeigher};
pub use ram::RamWeigher;

use std::cmp::Ordering;

use tracing::debug;

use spotgrid_core::WeightsConfig;

use crate::error::{PlacementError, PlacementResult};
use crate::host_state::{HostKey, HostResourceState};
use crate::request::RequestSpec;
use crate::tracker::{SharedHostState, lock_host};

/// A soft preference between hosts.
pub trait Weigher: Send + Sync {
    fn name(&self) -> &'static str;

    fn multiplier(&self) -> f64;

    /// Lower bound used for normalization, if the weigher knows one.
    fn minval(&self) -> Option<f64> {
        None
    }

    /// Upper bound used for normalization, if the weigher knows one.
    fn maxval(&self) -> Option<f64> {
        None
    }

    /// Raw weight of a host. Higher is better.
    fn weigh_object(&self, host: &HostResourceState, spec: &RequestSpec) -> f64;

    /// Raw weight scaled by the multiplier, before normalization.
    fn score(&self, host: &HostResourceState, spec: &RequestSpec) -> f64 {
        self.weigh_object(host, spec) * self.multiplier()
    }
}

/// A host paired with its combined weight.
#[derive(Debug, Clone)]
pub struct WeighedHost {
    pub key: HostKey,
    pub host: SharedHostState,
    pub weight: f64,
}

/// Build weighers from configured names.
pub fn weighers_from_names<S: AsRef<str>>(
    names: &[S],
    config: &WeightsConfig,
) -> PlacementResult<Vec<Box<dyn Weigher>>> {
    names
        .iter()
        .map(|name| {
            let weigher: Box<dyn Weigher> = match name.as_ref() {
                "ram" => Box::new(RamWeigher::new(config.ram_multiplier)),
                "preemptible_count" => Box::new(PreemptibleCountWeigher::new(
                    config.preemptible_count_multiplier,
                )),
                "preemptible_duration" => Box::new(PreemptibleDurationWeigher::new(
                    config.preemptible_duration_multiplier,
                )),
                other => return Err(PlacementError::UnknownWeigher(other.to_string())),
            };
            Ok(weigher)
        })
        .collect()
}

/// Scale values into `[0, 1]` between `minval` and `maxval`.
///
/// A degenerate range maps everything to zero.
pub fn normalize(values: &[f64], minval: Option<f64>, maxval: Option<f64>) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = minval.unwrap_or_else(|| values.iter().copied().fold(f64::INFINITY, f64::min));
    let max = maxval.unwrap_or_else(|| values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    let range = max - min;
    if range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Weigh hosts with every weigher and return them best first.
///
/// The sort is stable, so equal weights keep their input order.
pub fn weigh_hosts(
    weighers: &[Box<dyn Weigher>],
    hosts: Vec<SharedHostState>,
    spec: &RequestSpec,
) -> Vec<WeighedHost> {
    let mut raw: Vec<Vec<f64>> = vec![Vec::with_capacity(hosts.len()); weighers.len()];
    let mut keys = Vec::with_capacity(hosts.len());
    for shared in &hosts {
        let host = lock_host(shared);
        keys.push(host.key.clone());
        for (i, weigher) in weighers.iter().enumerate() {
            raw[i].push(weigher.weigh_object(&host, spec));
        }
    }

    let mut totals = vec![0.0; hosts.len()];
    for (weigher, values) in weighers.iter().zip(&raw) {
        let normalized = normalize(values, weigher.minval(), weigher.maxval());
        debug!(weigher = weigher.name(), weights = ?normalized, "hosts weighed");
        for (total, value) in totals.iter_mut().zip(normalized) {
            *total += weigher.multiplier() * value;
        }
    }

    let mut weighed: Vec<WeighedHost> = hosts
        .into_iter()
        .zip(keys)
        .zip(totals)
        .map(|((host, key), weight)| WeighedHost { key, host, weight })
        .collect();
    weighed.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
    weighed
}
