//! Regime strategies - main entry point
//!
//! This binary provides two subcommands:
//! - label: Build regime features and forward labels (classifier training data)
//! - scan: Run the setup state machine on the entry timeframe

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "regime-strategies")]
#[command(about = "Regime labeling, setup state machine entries and ratcheting stops", long_about = None)]
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
    /// Compute regime features and forward labels on the regime timeframe
    Label {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Pairs to process (comma-separated), overrides config
        #[arg(short, long)]
        pairs: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Evaluate setups and entries on the entry timeframe
    Scan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Pairs to process (comma-separated), overrides config
        #[arg(short, long)]
        pairs: Option<String>,

        /// Directory with `{PAIR}_{timeframe}_predictions.csv` classifier output
        #[arg(long)]
        predictions: Option<PathBuf>,

        /// Keep republishing the latest regime signals for this many seconds
        #[arg(long, default_value_t = 0)]
        hold: u64,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
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

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format as the console, without ANSI colors
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
        Commands::Label { .. } => "label",
        Commands::Scan { .. } => "scan",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Label {
            config,
            pairs,
            start,
            end,
        } => commands::label::run(config, pairs, start, end),

        Commands::Scan {
            config,
            pairs,
            predictions,
            hold,
            start,
            end,
        } => commands::scan::run(config, pairs, predictions, hold, start, end),
    }
}
