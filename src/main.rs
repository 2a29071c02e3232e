mod assemble;
mod commands;
mod corpus;
mod error;
mod llm;
mod pipeline;
mod sources;
mod state;
mod translate;
mod validate;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, Level};

use commands::Command;
use error::PipelineError;
use state::PipelineConfig;

/// Traditional Chinese RAG benchmark builder
#[derive(Debug, Parser)]
#[command(name = "zhtw-rag-bench", version)]
struct Cli {
    /// JSON config file; defaults apply to anything it omits
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;
    info!(command = ?cli.command, "Starting");
    commands::run(cli.command, &config).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Load env
    let _ = dotenv::dotenv();

    if let Err(err) = run(cli).await {
        let code = match err.downcast_ref::<PipelineError>() {
            Some(e) => {
                error!(kind = e.kind(), "{:#}", err);
                e.exit_code()
            }
            None => {
                error!("{:#}", err);
                1
            }
        };
        std::process::exit(code);
    }
}
