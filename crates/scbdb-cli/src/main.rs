mod query;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use scbdb_propagation::{PropagationEngine, Scope};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scbdb-cli")]
#[command(about = "SCBDB sentiment propagation engine")]
struct Cli {
    /// Entity file to load (overrides `SCBDB_ENTITIES_PATH`)
    #[arg(long, global = true)]
    entities: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Echo magnitude and stability class for one entity
    Echo {
        #[arg(long)]
        entity: String,
        /// Perturbation size (defaults to `SCBDB_ECHO_DELTA`)
        #[arg(long, allow_negative_numbers = true)]
        delta: Option<f64>,
        /// Propagation steps (defaults to `SCBDB_ECHO_HORIZON`)
        #[arg(long)]
        horizon: Option<usize>,
    },
    /// Echo plus the entities whose origin state it moved most
    Profile {
        #[arg(long)]
        entity: String,
        #[arg(long, allow_negative_numbers = true)]
        delta: Option<f64>,
        #[arg(long)]
        horizon: Option<usize>,
        /// Number of affected entities to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Monte Carlo distribution of echo magnitudes over a scope
    MonteCarlo {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        trials: Option<usize>,
        /// Replay a previous run by passing its reported seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Most critical entities by echo magnitude
    Rank {
        #[arg(long)]
        top_k: usize,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// BUY / HOLD / SELL signal for one entity
    Signal {
        #[arg(long)]
        entity: String,
    },
    /// Snapshot and cache statistics
    Health,
}

/// At most one of `--entity`, `--brand` or `--city`; none means all entities.
#[derive(Debug, Clone, Default, Args)]
#[group(multiple = false)]
struct ScopeArgs {
    #[arg(long)]
    entity: Option<String>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    city: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Option<Scope> {
        if let Some(id) = &self.entity {
            Some(Scope::Entity(id.clone()))
        } else if let Some(brand) = &self.brand {
            Some(Scope::Brand(brand.clone()))
        } else {
            self.city.as_ref().map(|city| Scope::City(city.clone()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = scbdb_core::load_engine_config()?;
    if let Some(path) = cli.entities {
        config.entities_path = path;
    }
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let file = scbdb_core::load_entities(&config.entities_path)?;
    tracing::info!(
        path = %config.entities_path.display(),
        entity_count = file.entities.len(),
        "loaded entities"
    );

    let engine = Arc::new(PropagationEngine::new(config)?);
    let command = cli.command;
    let output = tokio::task::spawn_blocking(move || {
        engine.rebuild(file.entities)?;
        query::run(&engine, command)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
