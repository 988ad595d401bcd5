mod commands;
mod wiring;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gleaner_common::observability::init_logging;
use gleaner_config::{GleanerConfig, GleanerConfigLoader};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "gleaner")]
#[command(about = "Fetch pages or answers, extract structured records, persist them")]
struct Cli {
    /// YAML configuration file; `GLEANER__*` variables override it
    #[arg(long, short, default_value = "gleaner.yaml", global = true, env = "GLEANER_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured backend over targets
    Run(commands::run::RunArgs),
    /// Open the push listener and persist answer events
    Listen(commands::listen::ListenArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Env wins over the file; a missing file leaves defaults plus env.
    let cfg: GleanerConfig = GleanerConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()?;

    let log_path = init_logging(wiring::log_config(&cfg.log))?;
    tracing::info!(
        config = %cli.config.display(),
        log = %log_path.display(),
        version = cfg.version.as_deref().unwrap_or("-"),
        "gleaner.start"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("gleaner.interrupted");
            on_signal.cancel();
        }
    });

    let ok = match &cli.command {
        Commands::Run(args) => commands::run::run(args, &cfg, cancel).await?,
        Commands::Listen(args) => commands::listen::run(args, &cfg, cancel).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
