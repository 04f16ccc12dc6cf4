// Storefront Throttle - Main Entry Point
//
// Operator tool for the storefront rate limiter:
// - Replay attempts against a fresh limiter
// - Inspect and validate configuration
// - Print Prometheus metrics after a short run

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use storefront_throttle::config::{Config, LoggingConfig};
use storefront_throttle::metrics;
use storefront_throttle::rate_limit::{ManualClock, RateLimiter};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Storefront Throttle: per-user rate limiting for the storefront bot
#[derive(Parser, Debug)]
#[command(name = "storefront-throttle")]
#[command(author = "Storefront Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Per-user rate limiting with exponential backoff", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "storefront.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay attempts for one actor against a fresh limiter
    Simulate {
        /// Actor (user) id
        #[arg(long, default_value_t = 1)]
        actor: i64,

        /// Category tag to check
        #[arg(long, default_value = "message")]
        category: String,

        /// Number of attempts
        #[arg(long, default_value_t = 10)]
        attempts: u32,

        /// Simulated seconds between attempts
        #[arg(long, default_value_t = 0)]
        interval_secs: i64,

        /// Print decisions as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    ShowConfig {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Load and validate the configuration file
    CheckConfig,
    /// Run a short simulation and print Prometheus metrics
    Metrics {
        /// Attempts per well-known category
        #[arg(long, default_value_t = 5)]
        attempts: u32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::load_from_path(&args.config);
    init_logging(args.verbose, loaded.as_ref().ok().map(|config| &config.logging));
    let config =
        loaded.with_context(|| format!("Configuration at {:?} is invalid", args.config))?;

    match args.command {
        Some(Commands::Simulate {
            actor,
            category,
            attempts,
            interval_secs,
            json,
        }) => {
            simulate(config, actor, &category, attempts, interval_secs, json)?;
        }
        Some(Commands::ShowConfig { json }) => {
            show_config(&config, json)?;
        }
        Some(Commands::CheckConfig) => {
            println!("Configuration OK: {}", args.config.display());
        }
        Some(Commands::Metrics { attempts }) => {
            print_metrics(config, attempts)?;
        }
        None => {
            println!("No command specified. Use \"storefront-throttle --help\" for usage.");
        }
    }

    Ok(())
}

/// Logs go to stderr so command output stays machine readable
fn init_logging(verbose: bool, logging: Option<&LoggingConfig>) {
    let level = if verbose {
        Level::DEBUG
    } else {
        logging
            .and_then(|logging| logging.level.parse().ok())
            .unwrap_or(Level::WARN)
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.map(|logging| logging.format.to_lowercase()) {
        Some(format) if format == "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

/// Replay `attempts` checks and print each decision
fn simulate(
    config: Config,
    actor: i64,
    category: &str,
    attempts: u32,
    interval_secs: i64,
    json: bool,
) -> Result<()> {
    let clock = ManualClock::starting_now();
    let limiter: RateLimiter<i64> =
        RateLimiter::with_clock(config.rate_limit, Arc::new(clock.clone()));

    info!(actor, category, attempts, "Starting simulation");

    for attempt in 1..=attempts {
        let admission = limiter.check_limit(Some(&actor), category);
        if json {
            println!("{}", serde_json::to_string(&admission)?);
        } else {
            println!("attempt {:>3}: {:?}", attempt, admission);
        }
        clock.advance_secs(interval_secs);
    }

    let remaining = limiter.get_remaining_attempts(Some(&actor), category);
    if json {
        println!("{}", serde_json::to_string(&remaining)?);
    } else {
        println!(
            "remaining: {}, wait: {}s",
            remaining.remaining, remaining.wait_secs
        );
    }

    Ok(())
}

fn show_config(config: &Config, json: bool) -> Result<()> {
    let rendered = if json {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config).context("Failed to render configuration")?
    };
    println!("{}", rendered);
    Ok(())
}

fn print_metrics(config: Config, attempts: u32) -> Result<()> {
    metrics::init().context("Failed to register metrics")?;

    let limiter: RateLimiter<i64> = RateLimiter::new(config.rate_limit);
    for category in storefront_throttle::Category::ALL {
        for _ in 0..attempts {
            limiter.check(&1, category);
        }
    }
    limiter.sweep_idle();

    print!("{}", metrics::gather_metrics()?);
    Ok(())
}
