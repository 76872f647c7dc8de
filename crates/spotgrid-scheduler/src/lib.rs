//! spotgrid-scheduler — destination selection with preemptible eviction.
//!
//! Wraps the placement engine with the caller-facing contract: a request
//! either gets a destination for every instance or fails with
//! `NoValidHost`. When a durable instance lands on a host that the
//! placement left over-committed, one preemptible instance on that host
//! is terminated through the lifecycle service.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── PlacementEngine (filter, weigh, choose, consume)
//!   │     └── HostStateTracker (full + partial views)
//!   └── EvictionExecutor
//!         └── LifecycleService (get + delete, elevated context)
//! ```

pub mod context;
pub mod error;
pub mod eviction;
pub mod lifecycle;
pub mod scheduler;

pub use context::RequestContext;
pub use error::{LifecycleError, SchedulerError, SchedulerResult};
pub use eviction::{EvictionCandidate, EvictionExecutor, select_victims};
pub use lifecycle::LifecycleService;
pub use scheduler::Scheduler;
