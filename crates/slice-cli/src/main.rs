use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "slice",
    about = "Slicegrid — distribute a split model across a device fleet",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for the optimal layer placement and write the
    /// configuration artifact.
    Configure {
        /// Benchmark report JSON, as produced by the benchmarking stage.
        #[arg(long)]
        report: PathBuf,
        /// Ordered layer-model manifest JSON.
        #[arg(long)]
        models: PathBuf,
        /// Device that receives inference requests.
        #[arg(long)]
        source: String,
        /// Raw request-input size in bytes.
        #[arg(long)]
        input_bytes: u64,
        /// Placement constraints, e.g. "must={layer_2:worker-a},mustnot={layer_0:worker-b}".
        #[arg(long)]
        constraints: Option<String>,
        /// Project preferences file.
        #[arg(long, default_value = "slice.toml")]
        config: PathBuf,
        /// Where to write the configuration artifact.
        #[arg(long, default_value = "configuration.json")]
        output: PathBuf,
    },
    /// Deploy a previously computed configuration as a service pipeline.
    Deploy {
        /// Configuration artifact written by `slice configure`.
        #[arg(long, default_value = "configuration.json")]
        configuration: PathBuf,
        /// Project preferences file.
        #[arg(long, default_value = "slice.toml")]
        config: PathBuf,
    },
    /// Scaffold a slice.toml for a new project.
    Init {
        /// Project name.
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,slicegrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Configure {
            report,
            models,
            source,
            input_bytes,
            constraints,
            config,
            output,
        } => commands::configure::run(
            &report,
            &models,
            &source,
            input_bytes,
            constraints.as_deref(),
            &config,
            &output,
        ),
        Commands::Deploy {
            configuration,
            config,
        } => commands::deploy::run(&configuration, &config).await,
        Commands::Init { name } => commands::init::run(&name),
    }
}
