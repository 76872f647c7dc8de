use crate::host_state::{HostResourceState, epoch_secs};
use crate::request::RequestSpec;

use super::Weigher;

const BILLING_PERIOD_SECS: u64 = 3600;

/// Prefers hosts with fewer preemptible instances.
pub struct PreemptibleCountWeigher {
    multiplier: f64,
}

impl PreemptibleCountWeigher {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Weigher for PreemptibleCountWeigher {
    fn name(&self) -> &'static str {
        "preemptible_count"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn maxval(&self) -> Option<f64> {
        Some(0.0)
    }

    fn weigh_object(&self, host: &HostResourceState, _spec: &RequestSpec) -> f64 {
        -(host.preemptible_count() as f64)
    }
}

/// Prefers hosts whose preemptible instances sit closest to the end of a
/// billing hour.
///
/// Each instance contributes the seconds elapsed in its current hour; an
/// instance that just completed a full hour contributes nothing.
pub struct PreemptibleDurationWeigher {
    multiplier: f64,
}

impl PreemptibleDurationWeigher {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Raw weight as of `now` (epoch seconds).
    pub fn weigh_at(&self, host: &HostResourceState, now: u64) -> f64 {
        let elapsed: u64 = host
            .preemptible_instances()
            .map(|i| now.saturating_sub(i.created_at) % BILLING_PERIOD_SECS)
            .sum();
        -(elapsed as f64)
    }
}

impl Weigher for PreemptibleDurationWeigher {
    fn name(&self) -> &'static str {
        "preemptible_duration"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn maxval(&self) -> Option<f64> {
        Some(0.0)
    }

    fn weigh_object(&self, host: &HostResourceState, _spec: &RequestSpec) -> f64 {
        self.weigh_at(host, epoch_secs())
    }
}
