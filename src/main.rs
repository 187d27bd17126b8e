use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use batchflow::{DataModule, DataModuleConfig, DatasetRegistry, IndexDataset, WorldContext};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "batchflow")]
#[command(about = "Plan and inspect per-worker batch streams for distributed training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a configuration splits data across workers
    Plan {
        /// Configuration file (JSON or YAML)
        #[arg(short, long, default_value = "data.yaml")]
        config: PathBuf,

        /// Number of workers
        #[arg(short = 'w', long, env = "WORLD_SIZE", default_value_t = 1)]
        world_size: usize,

        /// Rank to show; all ranks when omitted
        #[arg(short, long)]
        rank: Option<usize>,

        /// Gradient accumulation steps
        #[arg(short, long, default_value_t = 1)]
        accumulation_steps: usize,

        /// Epoch to plan
        #[arg(short, long, default_value_t = 0)]
        epoch: usize,

        /// Dataset sizes as NAME=LEN, one per dataset named in the configuration
        #[arg(short, long = "size", value_name = "NAME=LEN")]
        sizes: Vec<String>,

        /// Number of leading batches to print per stream
        #[arg(long, default_value_t = 2)]
        preview: usize,
    },

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show version information
    Info,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            config,
            world_size,
            rank,
            accumulation_steps,
            epoch,
            sizes,
            preview,
        } => {
            plan(
                config,
                world_size,
                rank,
                accumulation_steps,
                epoch,
                &sizes,
                preview,
            )?;
        }

        Commands::Config { file } => {
            validate_config(file)?;
        }

        Commands::Info => {
            println!("batchflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn parse_size(entry: &str) -> Result<(String, usize)> {
    let (name, len) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=LEN, got '{}'", entry))?;
    let len = len
        .trim()
        .parse()
        .with_context(|| format!("invalid length in '{}'", entry))?;
    Ok((name.trim().to_string(), len))
}

fn plan(
    config_path: PathBuf,
    world_size: usize,
    rank: Option<usize>,
    accumulation_steps: usize,
    epoch: usize,
    sizes: &[String],
    preview: usize,
) -> Result<()> {
    let config = DataModuleConfig::load(&config_path, "BATCHFLOW")
        .context("Failed to load configuration file")?;

    let mut registry = DatasetRegistry::new();
    for entry in sizes {
        let (name, len) = parse_size(entry)?;
        registry.register(name.clone(), Arc::new(IndexDataset::new(name, len)));
    }

    let data = DataModule::from_registry(config, &registry)
        .context("Failed to resolve datasets")?;

    let worlds = select_worlds(world_size, rank, accumulation_steps)?;

    info!(
        "Planning epoch {} for {} of {} ranks",
        epoch,
        worlds.len(),
        world_size
    );

    for world in worlds {
        println!("rank {}/{}", world.rank(), world_size);

        let train = data.train_stream(&world, epoch)?;
        println!(
            "  train: {} batches of {}",
            train.total_batches(),
            train.batch_size()
        );
        for batch in train.take(preview) {
            println!("    {:?}", batch?.indices);
        }

        if let Some(streams) = data.val_streams(&world, epoch)? {
            let paths = streams.try_map(|path, stream| -> Result<()> {
                println!(
                    "  val {}: {} batches of {}",
                    path,
                    stream.total_batches(),
                    stream.batch_size()
                );
                for batch in stream.take(preview) {
                    println!("    {:?}", batch?.indices);
                }
                Ok(())
            })?;
            info!("Planned {} validation streams", paths.num_leaves());
        }
    }

    Ok(())
}

/// Worlds of the ranks to plan, validating the world before picking ranks
fn select_worlds(
    world_size: usize,
    rank: Option<usize>,
    accumulation_steps: usize,
) -> Result<Vec<WorldContext>> {
    let world = WorldContext::new(world_size, 0, accumulation_steps)?;
    let worlds = match rank {
        Some(rank) => vec![world.with_rank(rank)?],
        None => (0..world_size)
            .map(|rank| world.with_rank(rank))
            .collect::<batchflow::Result<Vec<_>>>()?,
    };
    Ok(worlds)
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    info!("Validating configuration file: {}", config_path.display());

    let config = DataModuleConfig::from_file(&config_path)
        .context("Failed to load configuration file")?;

    info!("Configuration is valid");
    info!("  - Train data: {}", config.train_data);
    info!("  - Global train batch size: {}", config.train.batch_size);
    info!(
        "  - Train batches per epoch: {:?}",
        config.train.num_batches_per_epoch
    );
    if let Some(structure) = config.validation_structure()? {
        info!("  - Validation datasets: {:?}", structure.leaves());
    }

    Ok(())
}
