//! barrier-labels — candle fetcher and triple-barrier feature table builder
//!
//! Usage:
//!   barrier-labels fetch --symbol BTCUSDT --interval 4h --years 5
//!   barrier-labels build --profit-take 0.03 --stop-loss 0.02 --horizon 12
//!   barrier-labels run                      — fetch then build
//!   barrier-labels summary                  — label distribution of the stored table
//!   barrier-labels export --out train.json  — chronological train/test JSON

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use engine::config::{DEFAULT_DB_PATH, DEFAULT_INTERVAL, DEFAULT_SYMBOL};
use engine::{
    chronological_split, BarrierParameters, BinanceClient, FeaturePipeline, LabelDistribution,
    LabeledDataset, LabeledRow, PipelineConfig,
};
use persistence::repository::{CandleRepository, FeatureRepository};
use persistence::Database;
use tracing::info;

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "barrier-labels", version = APP_VERSION)]
#[command(about = "Builds triple-barrier labeled feature tables from exchange candles", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// SQLite database path (env: BARRIER_LABELS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct MarketArgs {
    /// Trading pair (env: SYMBOL, default BTCUSDT)
    #[arg(long)]
    symbol: Option<String>,
    /// Binance interval string (env: INTERVAL, default 4h)
    #[arg(long)]
    interval: Option<String>,
}

#[derive(Args, Clone)]
struct BarrierArgs {
    /// Upper barrier as a fraction of the entry price
    #[arg(long, default_value_t = 0.03)]
    profit_take: f64,
    /// Lower barrier as a fraction of the entry price
    #[arg(long, default_value_t = 0.02)]
    stop_loss: f64,
    /// Forward bars examined before a timeout
    #[arg(long, default_value_t = 12)]
    horizon: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Download historical candles into the database
    Fetch {
        #[command(flatten)]
        market: MarketArgs,
        /// Years of history
        #[arg(long, default_value_t = 5)]
        years: u32,
    },
    /// Compute features and labels from stored candles
    Build {
        #[command(flatten)]
        market: MarketArgs,
        #[command(flatten)]
        barriers: BarrierArgs,
    },
    /// Fetch candles, then build the labeled table
    Run {
        #[command(flatten)]
        market: MarketArgs,
        #[command(flatten)]
        barriers: BarrierArgs,
        /// Years of history
        #[arg(long, default_value_t = 5)]
        years: u32,
    },
    /// Show stored row counts and label distribution
    Summary {
        #[command(flatten)]
        market: MarketArgs,
    },
    /// Write the labeled table as JSON with a chronological train/test split
    Export {
        #[command(flatten)]
        market: MarketArgs,
        /// Output file
        #[arg(long)]
        out: String,
        /// Fraction of the newest rows held out as the test set
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,barrier_labels=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,persistence=info,barrier_labels=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

/// Resolve flags, then environment, then defaults into one explicit config value
fn resolve_config(
    db: Option<String>,
    market: &MarketArgs,
    barriers: Option<&BarrierArgs>,
    years: Option<u32>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<PipelineConfig> {
    let env_or = |key: &str, default: &str| env(key).unwrap_or_else(|| default.to_string());

    let mut config = PipelineConfig {
        symbol: market
            .symbol
            .clone()
            .unwrap_or_else(|| env_or("SYMBOL", DEFAULT_SYMBOL))
            .to_uppercase(),
        interval: market
            .interval
            .clone()
            .unwrap_or_else(|| env_or("INTERVAL", DEFAULT_INTERVAL)),
        db_path: db.unwrap_or_else(|| env_or("BARRIER_LABELS_DB_PATH", DEFAULT_DB_PATH)),
        ..PipelineConfig::default()
    };
    if let Some(url) = env("BINANCE_BASE_URL") {
        config.binance_base_url = url;
    }
    if let Some(years) = years {
        config.years = years;
    }
    if let Some(b) = barriers {
        config.barriers = BarrierParameters::new(b.profit_take, b.stop_loss, b.horizon)?;
    }
    Ok(config)
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

async fn open_db(config: &PipelineConfig) -> anyhow::Result<Database> {
    let db = Database::new(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("Database initialization failed: {}", e))?;
    info!("Database: {}", config.db_path);
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Fetch { market, years } => {
            let config = resolve_config(cli.db, &market, None, Some(years), process_env)?;
            cmd_fetch(&config).await?;
        }
        Commands::Build { market, barriers } => {
            let config = resolve_config(cli.db, &market, Some(&barriers), None, process_env)?;
            cmd_build(&config).await?;
        }
        Commands::Run {
            market,
            barriers,
            years,
        } => {
            let config =
                resolve_config(cli.db, &market, Some(&barriers), Some(years), process_env)?;
            cmd_run(&config).await?;
        }
        Commands::Summary { market } => {
            let config = resolve_config(cli.db, &market, None, None, process_env)?;
            cmd_summary(&config).await?;
        }
        Commands::Export {
            market,
            out,
            test_fraction,
        } => {
            let config = resolve_config(cli.db, &market, None, None, process_env)?;
            cmd_export(&config, &out, test_fraction).await?;
        }
    }

    Ok(())
}

async fn cmd_fetch(config: &PipelineConfig) -> anyhow::Result<()> {
    println!("\n=== barrier-labels v{} ===", APP_VERSION);
    println!(
        "Fetching {} {} | {} years",
        config.symbol, config.interval, config.years
    );

    let db = open_db(config).await?;
    let binance = BinanceClient::with_base_url(&config.binance_base_url)?;
    let fetched = FeaturePipeline::new(&binance, &db)
        .fetch_and_store(config)
        .await?;

    println!("Stored {} candles in {}", fetched, config.db_path);
    Ok(())
}

async fn cmd_build(config: &PipelineConfig) -> anyhow::Result<()> {
    println!("\n=== barrier-labels v{} ===", APP_VERSION);
    print_barriers(config);

    let db = open_db(config).await?;
    let binance = BinanceClient::with_base_url(&config.binance_base_url)?;
    let dataset = FeaturePipeline::new(&binance, &db)
        .build_and_store(config)
        .await?;

    print_dataset(config, &dataset);
    Ok(())
}

async fn cmd_run(config: &PipelineConfig) -> anyhow::Result<()> {
    println!("\n=== barrier-labels v{} ===", APP_VERSION);
    print_barriers(config);

    let db = open_db(config).await?;
    let binance = BinanceClient::with_base_url(&config.binance_base_url)?;
    let dataset = FeaturePipeline::new(&binance, &db).run(config).await?;

    print_dataset(config, &dataset);
    Ok(())
}

async fn cmd_summary(config: &PipelineConfig) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let candles = CandleRepository::new(db.pool())
        .count(&config.symbol, &config.interval)
        .await?;
    let counts = FeatureRepository::new(db.pool())
        .label_counts(&config.symbol, &config.interval)
        .await?;

    println!("\n{} {}", config.symbol, config.interval);
    println!("  Candles stored:  {}", candles);
    println!("  Labeled rows:    {}", counts.total());
    let total = counts.total().max(1) as f64;
    for (name, count) in [
        ("profit (+1)", counts.profit),
        ("timeout (0)", counts.timeout),
        ("loss (-1)", counts.loss),
    ] {
        println!(
            "  {:<15}  {:>7}  {:>5.1}%",
            name,
            count,
            count as f64 / total * 100.0
        );
    }
    Ok(())
}

async fn cmd_export(config: &PipelineConfig, out: &str, test_fraction: f64) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let records = FeatureRepository::new(db.pool())
        .load(&config.symbol, &config.interval)
        .await?;
    if records.is_empty() {
        anyhow::bail!(
            "No labeled rows for {} {}; run `build` first",
            config.symbol,
            config.interval
        );
    }

    let rows = records
        .iter()
        .map(LabeledRow::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let (train, test) = chronological_split(&rows, test_fraction)?;
    let first = &records[0];

    let export = serde_json::json!({
        "symbol": config.symbol,
        "interval": config.interval,
        "exported_at": Utc::now().to_rfc3339(),
        "barriers": {
            "profit_take": first.profit_take,
            "stop_loss": first.stop_loss,
            "horizon": first.horizon,
        },
        "distribution": LabelDistribution::from_rows(&rows),
        "test_fraction": test_fraction,
        "train": train,
        "test": test,
    });

    if let Some(parent) = std::path::Path::new(out).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(out, &json).with_context(|| format!("writing {out}"))?;

    println!(
        "Exported {} rows ({} train / {} test) to {}",
        rows.len(),
        train.len(),
        test.len(),
        out
    );
    Ok(())
}

fn print_barriers(config: &PipelineConfig) {
    println!(
        "{} {} | PT {:.2}% | SL {:.2}% | Horizon {} bars",
        config.symbol,
        config.interval,
        config.barriers.profit_take() * 100.0,
        config.barriers.stop_loss() * 100.0,
        config.barriers.horizon()
    );
}

fn print_dataset(config: &PipelineConfig, dataset: &LabeledDataset) {
    let dist = &dataset.distribution;
    println!("\n  Candles:        {}", dataset.candles);
    println!("  Feature rows:   {}", dataset.feature_rows);
    println!(
        "  Labeled rows:   {} ({} dropped without a full horizon)",
        dataset.rows.len(),
        dist.insufficient
    );
    for (code, share) in dist.fractions() {
        println!("  label {:>2}:      {:.1}%", code, share * 100.0);
    }
    println!("\nSaved labeled features to {}", config.db_path);
}
