//! XAUUSD strategies - main entry point
//!
//! This binary provides two subcommands:
//! - run: paper-trading loop replaying a candle file
//! - analyze: evaluate the configured strategy on a candle file

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "xauusd-strategies")]
#[command(about = "XAUUSD signal evaluation and position protection engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines instead of text
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the paper-trading loop
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/xauusd_m15.json")]
        config: String,

        /// Strategy name (overrides config file)
        #[arg(short, long)]
        strategy: Option<String>,

        /// CSV file with base-timeframe candles
        #[arg(long)]
        candles: String,

        /// CSV file with higher-timeframe candles (resampled when omitted)
        #[arg(long)]
        htf_candles: Option<String>,

        /// Starting paper balance
        #[arg(long, default_value = "10000")]
        balance: f64,

        /// Paper spread in points
        #[arg(long, default_value = "20")]
        spread: f64,

        /// Poll interval in seconds (default from config)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many polls
        #[arg(long)]
        max_ticks: Option<usize>,
    },

    /// Evaluate the strategy on a candle file
    Analyze {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/xauusd_m15.json")]
        config: String,

        /// Strategy name (overrides config file)
        #[arg(short, long)]
        strategy: Option<String>,

        /// CSV file with base-timeframe candles
        #[arg(long)]
        candles: String,

        /// CSV file with higher-timeframe candles (resampled when omitted)
        #[arg(long)]
        htf_candles: Option<String>,

        /// Print every entry signal and a summary instead of the last bar only
        #[arg(long)]
        all: bool,
    },
}

fn setup_logging(verbose: bool, json: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // Built per branch: the layer's subscriber type differs between the two stacks
    macro_rules! file_layer {
        () => {
            tracing_subscriber::fmt::layer()
                .with_writer(tracing_appender::rolling::never("logs", &log_filename))
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
        };
    }

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .with(file_layer!())
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer!())
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    // Environment overrides are read while the configuration loads
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Analyze { .. } => "analyze",
    };
    setup_logging(cli.verbose, cli.json_logs, command_name)?;

    match cli.command {
        Commands::Run {
            config,
            strategy,
            candles,
            htf_candles,
            balance,
            spread,
            interval,
            max_ticks,
        } => commands::run::run(commands::run::RunArgs {
            config,
            strategy,
            candles,
            htf_candles,
            balance,
            spread_points: spread,
            interval,
            max_ticks,
        }),

        Commands::Analyze {
            config,
            strategy,
            candles,
            htf_candles,
            all,
        } => commands::analyze::run(config, strategy, candles, htf_candles, all),
    }
}
