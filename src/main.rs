//! Spot grid bot - main entry point
//!
//! This binary provides two subcommands:
//! - run: Start every configured grid session (paper or real)
//! - filters: Print a symbol's exchange trading rules

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-bot")]
#[command(about = "Percentage grid trading bot for Binance spot markets", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the configured grid sessions until Ctrl+C
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/grid.json")]
        config: String,

        /// Paper trading mode (simulated orders against live prices)
        #[arg(long)]
        paper: bool,
    },

    /// Show lot size, tick size and notional rules for a symbol
    Filters {
        /// Symbol, e.g. ETHUSDT
        #[arg(short, long)]
        symbol: String,

        /// Path to configuration file (for the exchange section)
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Filters { .. } => "filters",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Run { config, paper } => commands::run::run(config, paper),
        Commands::Filters { symbol, config } => commands::filters::run(symbol, config),
    }
}
