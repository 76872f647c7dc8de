use crate::host_state::HostResourceState;
use crate::request::RequestSpec;

use super::Weigher;

/// Spreads load towards hosts with more free RAM.
///
/// A negative multiplier stacks instead.
pub struct RamWeigher {
    multiplier: f64,
}

impl RamWeigher {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Weigher for RamWeigher {
    fn name(&self) -> &'static str {
        "ram"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn weigh_object(&self, host: &HostResourceState, _spec: &RequestSpec) -> f64 {
        host.free_ram_mb as f64
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use spotgrid_core::AllocationConfig;

    use super::*;
    use crate::host_state::HostView;
    use crate::host_state::test_support::compute_node;
    use crate::request::InstanceShape;
    use crate::tracker::SharedHostState;
    use crate::weights::weigh_hosts;

    fn shared(name: &str, free_ram_mb: i64) -> SharedHostState {
        let node = compute_node(name, name, 8192, free_ram_mb);
        Arc::new(Mutex::new(HostResourceState::from_compute_node(
            &node,
            HostView::Full,
            &AllocationConfig::default(),
        )))
    }

    #[test]
    fn negative_multiplier_stacks() {
        let weighers: Vec<Box<dyn Weigher>> = vec![Box::new(RamWeigher::new(-1.0))];
        let hosts = vec![shared("roomy", 6000), shared("tight", 1000)];
        let spec = RequestSpec::new(1, InstanceShape::default());

        let weighed = weigh_hosts(&weighers, hosts, &spec);

        assert_eq!(weighed[0].key.host, "tight");
        assert_eq!(weighed[0].weight, 0.0);
        assert_eq!(weighed[1].weight, -1.0);
    }
}
