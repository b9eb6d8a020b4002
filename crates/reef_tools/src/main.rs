//! Reef Arena - Development Tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reef_tools::generate::{self, GeneratorConfig, BIOMES};
use reef_tools::validate;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reef-tools")]
#[command(about = "Development tools for Reef Arena")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate map files
    Validate {
        /// Map file or directory of maps
        #[arg(default_value = "maps/generated")]
        path: PathBuf,
        /// Print reports as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Generate random map sets
    Generate {
        /// Output directory
        #[arg(long, default_value = "maps/generated")]
        out: PathBuf,
        /// RNG seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Single biome to generate (default: all)
        #[arg(long)]
        biome: Option<String>,
        /// Maps per biome
        #[arg(long, default_value_t = 5)]
        per_biome: usize,
        #[arg(long, default_value_t = 100)]
        cols: i32,
        #[arg(long, default_value_t = 100)]
        rows: i32,
        #[arg(long, default_value_t = 32)]
        tile_size: i32,
        #[arg(long, default_value_t = 0.18)]
        obstacle_ratio: f64,
        #[arg(long, default_value_t = 0.04)]
        trap_ratio: f64,
        #[arg(long, default_value_t = 0.03)]
        mineral_ratio: f64,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { path, json } => run_validate(&path, json),
        Commands::Generate {
            out,
            seed,
            biome,
            per_biome,
            cols,
            rows,
            tile_size,
            obstacle_ratio,
            trap_ratio,
            mineral_ratio,
        } => {
            let config = GeneratorConfig {
                cols,
                rows,
                tile_size,
                obstacle_ratio,
                trap_ratio,
                mineral_ratio,
            };
            let biomes: Vec<&str> = match biome.as_deref() {
                Some(one) => vec![one],
                None => BIOMES.to_vec(),
            };
            generate::write_map_set(&out, &config, &biomes, per_biome, seed).map(|written| {
                tracing::info!(count = written.len(), out = %out.display(), "Generation finished");
            })
        }
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run_validate(path: &std::path::Path, json: bool) -> reef_core::error::Result<()> {
    tracing::info!("Validating maps in: {}", path.display());
    let reports = if path.is_dir() {
        validate::validate_map_directory(path)?
    } else {
        vec![validate::validate_map_file(path)?]
    };

    for report in &reports {
        if json {
            match serde_json::to_string(report) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Could not encode report: {e}"),
            }
        } else {
            tracing::info!(
                path = %report.path.display(),
                biome = %report.biome,
                size = %format!("{}x{}", report.cols, report.rows),
                minerals = report.minerals,
                reachable = report.reachable,
                walkable = report.walkable,
                "Map ok"
            );
        }
    }
    tracing::info!(count = reports.len(), "Validation passed");
    Ok(())
}
