//! Walk-Forward Backtest CLI
//!
//! Replays a season dataset in date order and prints the report.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin walk_forward -- \
//!   --dataset season.json \
//!   --event goals \
//!   --line-rule nearest-half --floor 1.5 \
//!   --odds 1.90 \
//!   --output report.json
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lineedge_backend::backtest::{BacktestConfig, LineRule, WalkForwardBacktest};
use lineedge_backend::config::EngineConfig;
use lineedge_backend::data::MatchDataset;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================

/// Walk-forward backtest over a match dataset
#[derive(Parser, Debug)]
#[command(name = "walk_forward")]
struct Cli {
    /// Dataset (JSON array of matches)
    #[arg(short, long)]
    dataset: PathBuf,

    /// Engine config TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "goals")]
    event: String,

    #[arg(long, default_value = "combined")]
    market: String,

    #[arg(long, default_value = "over")]
    direction: String,

    /// fixed | nearest-half
    #[arg(long, default_value = "fixed")]
    line_rule: String,

    /// Line for the fixed rule
    #[arg(long, default_value_t = 2.5)]
    line: f64,

    /// Lowest line the nearest-half rule may pick
    #[arg(long, default_value_t = 0.5)]
    floor: f64,

    #[arg(long, default_value_t = 1.90)]
    odds: f64,

    #[arg(long, default_value_t = 5)]
    min_matches: usize,

    /// Flat stake as a fraction of bankroll
    #[arg(long, default_value_t = 0.01)]
    stake_pct: f64,

    #[arg(long, default_value_t = 20_000.0)]
    bankroll: f64,

    /// Simulation seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write the full report as JSON here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lineedge_backend=info,walk_forward=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut engine_config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    engine_config.distribution.seed = Some(cli.seed);

    let line_rule = match cli.line_rule.as_str() {
        "fixed" => LineRule::Fixed { line: cli.line },
        "nearest-half" | "nearest_half" => LineRule::NearestHalf { floor: cli.floor },
        other => bail!("unknown line rule: {other}"),
    };

    let config = BacktestConfig {
        event: cli.event.parse()?,
        market: cli.market.parse()?,
        direction: cli.direction.parse()?,
        line_rule,
        odds: cli.odds,
        min_matches: cli.min_matches,
        stake_pct: cli.stake_pct,
        initial_bankroll: cli.bankroll,
    };

    let dataset = MatchDataset::load_json(&cli.dataset)?;
    let backtest = WalkForwardBacktest::new(config, Arc::new(engine_config))?;
    let report = backtest.run(&dataset)?;

    println!("Matches:        {}", report.matches_seen);
    println!(
        "Bets:           {} ({} W / {} L / {} P)",
        report.total_bets, report.wins, report.losses, report.pushes
    );
    println!("Staked:         {:.2}", report.total_staked);
    println!("Profit:         {:+.2}", report.total_profit);
    println!("ROI:            {:+.2}%", report.roi * 100.0);
    println!("Final bankroll: {:.2}", report.final_bankroll);
    println!("Max drawdown:   {:.2}%", report.max_drawdown * 100.0);
    println!(
        "Skipped:        history {}, sample {}, missing event {}, below threshold {}",
        report.skipped_due_to_history,
        report.skipped_due_to_sample,
        report.skipped_missing_event,
        report.rejected_by_threshold
    );

    if let Some(path) = &cli.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    Ok(())
}
