// crates/windsync/src/main.rs

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod report;
mod sources;

use commands::audit::handle_audit;
use commands::check::handle_check;
use commands::run::handle_run;

/// Harmonizes raw wind measurements into uniform per-entity time series.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Harmonizes every configured dataset (or just one) and writes parquet artifacts.
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        dataset: Option<String>,
        /// Run the full pipeline but keep artifacts in memory.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validates the configuration and lists the sources each dataset would read.
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Prints quality reports for a single source file without writing anything.
    Audit {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        dataset: String,
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Run {
            config,
            dataset,
            dry_run,
        } => handle_run(&config, dataset.as_deref(), dry_run),
        Commands::Check { config } => handle_check(&config),
        Commands::Audit {
            config,
            dataset,
            file,
        } => handle_audit(&config, &dataset, &file),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
