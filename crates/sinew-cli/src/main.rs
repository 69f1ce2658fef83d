//! Sinew CLI: simulation, benchmarking, validation and device probing.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod runner;
mod scenarios;

#[derive(Parser)]
#[command(name = "sinew")]
#[command(version, about = "Sinew: distance-constraint solver for soft muscle meshes")]
struct Cli {
    /// Log filter (overrides the config file and RUST_LOG).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Compute backend used by `benchmark`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// CPU relaxation only.
    Cpu,
    /// CPU-executed device queue.
    Emulated,
    /// GPU via wgpu; CPU if no adapter is found.
    Wgpu,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a config file.
    Simulate {
        /// Path to simulation config (TOML).
        #[arg(short, long, default_value = "simulation.toml")]
        config: String,

        /// JSON mesh, overriding the config's mesh or scenario.
        #[arg(short, long)]
        mesh: Option<String>,
    },

    /// Run benchmark suite.
    Benchmark {
        /// Which scenario to run (tetrahedron, chain, lattice, all).
        #[arg(short, long, default_value = "all")]
        scenario: String,

        #[arg(short, long, value_enum, default_value_t = Backend::Cpu)]
        backend: Backend,

        /// Output CSV file path.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate a mesh (.json) or simulation config (.toml).
    Validate {
        /// Path to mesh or config file.
        path: String,
    },

    /// Report the GPU adapter and whether the kernel compiles on it.
    Probe {
        /// WGSL file to compile instead of the embedded kernel.
        #[arg(short, long)]
        kernel: Option<String>,

        #[arg(short, long, default_value_t = sinew_types::constants::DEFAULT_WORKGROUP_SIZE)]
        workgroup_size: u32,
    },
}

/// Installs the fmt subscriber. `RUST_LOG` applies when no level is given.
pub(crate) fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let level = cli.log_level.as_deref();

    let result = match cli.command {
        // Initializes tracing itself once the config's log level is known.
        Commands::Simulate { config, mesh } => commands::simulate(&config, mesh.as_deref(), level),
        Commands::Benchmark {
            scenario,
            backend,
            output,
        } => {
            init_tracing(level);
            commands::benchmark(&scenario, backend, output.as_deref())
        }
        Commands::Validate { path } => {
            init_tracing(level);
            commands::validate(&path)
        }
        Commands::Probe {
            kernel,
            workgroup_size,
        } => {
            init_tracing(level);
            commands::probe(kernel.as_deref(), workgroup_size)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
