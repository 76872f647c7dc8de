//! `place` subcommand — runs placement requests, optionally concurrently.

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use serde_json::json;
use tracing::{info, warn};

use spotgrid_inventory::PREEMPTIBLE_KEY;
use spotgrid_placement::{HostStateTracker, InstanceShape, PlacementEngine, RequestSpec};
use spotgrid_scheduler::{RequestContext, Scheduler};

use crate::{load_config, open_store};

#[derive(Args)]
pub struct PlaceArgs {
    #[arg(long, default_value = "1024")]
    memory_mb: i64,

    #[arg(long, default_value = "10")]
    disk_gb: i64,

    #[arg(long, default_value = "1")]
    vcpus: u32,

    /// Instances per request.
    #[arg(long, default_value = "1")]
    count: u32,

    /// Request preemptible instances.
    #[arg(long)]
    preemptible: bool,

    /// Number of identical requests to run concurrently.
    #[arg(long, default_value = "1")]
    requests: usize,

    /// Seed for the top-K host choice.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "spotgrid")]
    project: String,

    #[arg(long, default_value = "cli")]
    user: String,
}

impl PlaceArgs {
    fn request_spec(&self) -> RequestSpec {
        let mut spec = RequestSpec::new(
            self.count,
            InstanceShape {
                memory_mb: self.memory_mb,
                root_gb: self.disk_gb,
                vcpus: self.vcpus,
                ..InstanceShape::default()
            },
        );
        if self.preemptible {
            spec.scheduler_hints
                .insert(PREEMPTIBLE_KEY.to_string(), vec!["true".to_string()]);
        }
        spec
    }
}

pub async fn run(data_dir: &Path, config: Option<&Path>, args: PlaceArgs) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let store = Arc::new(open_store(data_dir)?);

    let tracker = Arc::new(HostStateTracker::from_config(store.clone(), &config));
    let mut engine = PlacementEngine::from_config(tracker, &config)?;
    if let Some(seed) = args.seed {
        engine = engine.with_seed(seed);
    }
    let scheduler = Arc::new(Scheduler::new(engine, store));

    let spec = args.request_spec();
    info!(
        requests = args.requests,
        count = spec.num_instances,
        preemptible = spec.is_preemptible(),
        "running placement"
    );

    let mut handles = Vec::with_capacity(args.requests);
    for _ in 0..args.requests {
        let scheduler = scheduler.clone();
        let spec = spec.clone();
        let ctx = RequestContext::new(args.project.clone(), args.user.clone());
        handles.push(tokio::task::spawn_blocking(move || {
            let result = scheduler.select_destinations(&ctx, &spec);
            (ctx.request_id, result)
        }));
    }

    let mut failed = 0;
    for handle in handles {
        let (request_id, result) = handle.await?;
        let line = match result {
            Ok(destinations) => json!({ "request_id": request_id, "destinations": destinations }),
            Err(e) => {
                warn!(request = %request_id, error = %e, "placement failed");
                failed += 1;
                json!({ "request_id": request_id, "error": e.to_string() })
            }
        };
        println!("{line}");
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} requests failed", args.requests);
    }
    Ok(())
}
