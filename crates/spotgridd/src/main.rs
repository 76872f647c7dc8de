//! spotgridd — the SpotGrid daemon.
//!
//! Assembles the inventory store, host state tracker, placement engine
//! and scheduler around a redb inventory in a data directory:
//! - `seed` loads compute nodes, services and instances from JSON
//! - `hosts` prints the full or partial host view
//! - `place` runs one or more (concurrent) placement requests
//!
//! # Usage
//!
//! ```text
//! spotgridd seed --data-dir /var/lib/spotgrid --file inventory.json
//! spotgridd hosts --data-dir /var/lib/spotgrid --view partial
//! spotgridd place --data-dir /var/lib/spotgrid --memory-mb 2048 --count 2
//! ```

mod inventory_cmd;
mod place_cmd;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use spotgrid_core::SpotgridConfig;
use spotgrid_inventory::InventoryStore;
use spotgrid_placement::HostView;

#[derive(Parser)]
#[command(name = "spotgridd", about = "SpotGrid preemptible-aware scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load an inventory snapshot (JSON) into the store.
    Seed {
        /// Data directory for the inventory store.
        #[arg(long, default_value = "/var/lib/spotgrid")]
        data_dir: PathBuf,

        /// Snapshot file with compute_nodes, services and instances.
        #[arg(long)]
        file: PathBuf,
    },

    /// Print one view of every schedulable host.
    Hosts {
        #[arg(long, default_value = "/var/lib/spotgrid")]
        data_dir: PathBuf,

        /// spotgrid.toml; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "full")]
        view: ViewArg,
    },

    /// Select destinations for a request and evict where needed.
    Place {
        #[arg(long, default_value = "/var/lib/spotgrid")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        request: place_cmd::PlaceArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Full,
    Partial,
}

impl From<ViewArg> for HostView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Full => HostView::Full,
            ViewArg::Partial => HostView::Partial,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,spotgridd=debug,spotgrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Seed { data_dir, file } => inventory_cmd::seed(&data_dir, &file),
        Command::Hosts {
            data_dir,
            config,
            view,
        } => inventory_cmd::hosts(&data_dir, config.as_deref(), view.into()),
        Command::Place {
            data_dir,
            config,
            request,
        } => place_cmd::run(&data_dir, config.as_deref(), request).await,
    }
}

/// Open the inventory store inside `data_dir`, creating the directory.
fn open_store(data_dir: &Path) -> anyhow::Result<InventoryStore> {
    std::fs::create_dir_all(data_dir)?;
    let store = InventoryStore::open(&data_dir.join("spotgrid.redb"))?;
    Ok(store)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SpotgridConfig> {
    match path {
        Some(path) => SpotgridConfig::from_file(path),
        None => Ok(SpotgridConfig::default()),
    }
}
