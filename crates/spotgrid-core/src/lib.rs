pub mod config;

pub use config::{AllocationConfig, SchedulerSection, SpotgridConfig, WeightsConfig};
