//! SpotGrid placement — dual-view host tracking and the scheduling loop.
//!
//! Hosts are tracked twice: a *full* view in which every instance counts
//! as consumption and a *partial* view in which preemptible instances'
//! footprint is credited back as free. Durable requests are filtered on
//! the partial view, preemptible requests on the full view, and weighing
//! always looks at true (full) occupancy.
//!
//! # Components
//!
//! - **`tracker`** — `HostStateTracker`, refreshes both views from inventory
//! - **`host_state`** — per-host counters and the instance partition
//! - **`filters`** — hard constraints (`HostFilter`, `FilterChain`)
//! - **`weights`** — weighing framework and the preemptible weighers
//! - **`placer`** — `PlacementEngine` and the seedable top-K choice
//! - **`overcommit`** — allocation-ratio overcommit check

pub mod error;
pub mod filters;
pub mod host_state;
pub mod overcommit;
pub mod placer;
pub mod request;
pub mod tracker;
pub mod weights;

pub use error::{PlacementError, PlacementResult};
pub use filters::{FilterChain, HostFilter};
pub use host_state::{HostKey, HostLimits, HostResourceState, HostView, epoch_secs};
pub use overcommit::is_overcommitted;
pub use placer::{Destination, PlacementEngine, Selection, choose_host};
pub use request::{GroupPolicy, InstanceGroup, InstanceShape, RequestSpec};
pub use tracker::{HostStateProvider, HostStateTracker, SharedHostState, lock_host};
pub use weights::{
    PreemptibleCountWeigher, PreemptibleDurationWeigher, RamWeigher, WeighedHost, Weigher,
    weigh_hosts, weighers_from_names,
};
