use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prize_pool::{CliArgs, Clock, Config, Planner, SystemClock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "prize-pool")]
#[command(about = "Time-smoothed reward allocation with an atomic claim pool")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v debug, -vv trace)")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan every seeded reward and run the feeder until Ctrl-C
    Serve {
        #[arg(short, long, help = "Configuration file (TOML or JSON)")]
        config: Option<PathBuf>,

        #[arg(long, help = "JSON file with rewards and codes to load")]
        seed: Option<PathBuf>,

        #[arg(long, help = "Redis URL; selects the redis backend")]
        store_url: Option<String>,

        #[arg(long, help = "Snapshot file for the memory backend")]
        snapshot: Option<PathBuf>,

        #[arg(long, help = "Seconds between feeder ticks")]
        feed_interval: Option<u64>,
    },

    /// Print a release plan as JSON
    Plan {
        #[arg(long)]
        total: u64,

        #[arg(long)]
        days: u32,

        #[arg(long, help = "Random seed for a reproducible plan")]
        seed: Option<u64>,

        #[arg(long, help = "Start time in unix seconds (default: now)")]
        now: Option<i64>,
    },
}

fn init_tracing(verbose: u8, configured: &str) -> Result<()> {
    let level = match verbose {
        0 => tracing::Level::from_str(configured).unwrap_or(tracing::Level::INFO),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            seed,
            store_url,
            snapshot,
            feed_interval,
        } => {
            let args = CliArgs {
                config_file: config,
                store_url,
                snapshot_path: snapshot,
                feed_interval,
            };
            let config = Config::load_with_cli(&args).context("Failed to load configuration")?;
            config.validate().context("Invalid configuration")?;
            init_tracing(cli.verbose, &config.logging.level)?;
            prize_pool::run(config, seed).await
        }
        Command::Plan {
            total,
            days,
            seed,
            now,
        } => {
            let config = Config::load().context("Failed to load configuration")?;
            init_tracing(cli.verbose, &config.logging.level)?;

            let planner =
                Planner::from_config(&config.planner).context("Invalid planner configuration")?;
            let now = now.unwrap_or_else(|| SystemClock.now());
            let plan = match seed {
                Some(seed) => planner.build(total, days, now, &mut StdRng::seed_from_u64(seed)),
                None => planner.build(total, days, now, &mut rand::rng()),
            };

            println!("{}", serde_json::to_string_pretty(plan.events())?);
            Ok(())
        }
    }
}
