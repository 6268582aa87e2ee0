use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod context;
mod error;
mod events;
mod model;
mod orientation;
mod pass_target;
mod pipeline;
mod possession;
mod roster;
mod source;
mod summary;
mod table;
mod tempo;
mod tracking;

use config::PipelineConfig;

#[derive(Parser, Debug)]
#[command(
    name = "possession-tempo",
    about = "Possession segmentation and ball tempo features from match event and tracking data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and write every table to the output directory
    Process(PipelineConfig),

    /// Print match and team summaries from a previous `process` run
    Summary {
        /// Directory written by `process`
        #[arg(long, env = "POSSESSION_OUT_DIR", default_value = "out")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Process(config) => pipeline::process(&config)?,
        Command::Summary { out_dir } => summary::print_summary(&out_dir)?,
    }

    Ok(())
}
