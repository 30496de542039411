//! Tollgate CLI - Main entry point

mod commands;
mod watch;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tollgate_foundation::TollgateConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tollgate - response cache and spend governor for metered inference APIs
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data directory (ledger and cache); overrides config and TOLLGATE_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the usage report as JSON
    Report,
    /// Set the daily cost limit (USD)
    SetLimit {
        limit: f64,
        /// Do not write the new limit to the global config
        #[arg(long)]
        no_save: bool,
    },
    /// Replace the active market set
    Markets {
        /// Explicit symbols; when empty the set comes from the feed files
        symbols: Vec<String>,
        /// Positions file ({"positions": [{"symbol": ...}]})
        #[arg(long)]
        positions: Option<PathBuf>,
        /// Signals file ({"signals": {SYMBOL: {"signal": ...}}})
        #[arg(long)]
        signals: Option<PathBuf>,
    },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run synthetic requests through the governor and ledger
    Simulate {
        /// Number of simulated requests
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
    /// Periodically clean the cache and refresh active markets
    Watch {
        /// Seconds between passes
        #[arg(long, default_value = "300")]
        interval_secs: u64,
        #[arg(long)]
        positions: Option<PathBuf>,
        #[arg(long)]
        signals: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Entry count and size per category
    Stats,
    /// Run one janitor pass now
    Clean,
    /// Show the cache key and path a query maps to
    Key {
        query: String,
        #[arg(long)]
        model: Option<String>,
        /// Model parameter as name=value (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
        #[arg(long, default_value = "default")]
        category: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut config = TollgateConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        let mut config = TollgateConfig::default();
        config.apply_env();
        config
    });
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }

    let app = commands::App::new(config);

    match args.command {
        Command::Report => app.report(),
        Command::SetLimit { limit, no_save } => app.set_limit(limit, !no_save),
        Command::Markets {
            symbols,
            positions,
            signals,
        } => {
            let feed = app.feed(positions, signals);
            app.markets(symbols, &feed)
        }
        Command::Cache { action } => match action {
            CacheAction::Stats => app.cache_stats(),
            CacheAction::Clean => app.cache_clean(),
            CacheAction::Key {
                query,
                model,
                params,
                category,
            } => {
                let params = commands::parse_params(&params).context("Invalid --param")?;
                app.cache_key(&query, model.as_deref(), &params, &category)
            }
        },
        Command::Simulate { count } => app.simulate(count),
        Command::Watch {
            interval_secs,
            positions,
            signals,
        } => {
            let feed = app.feed(positions, signals);
            watch::run(app, feed, interval_secs).await
        }
    }
}
