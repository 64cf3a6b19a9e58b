//! LineEdge - count-event line evaluator
//! Mission: Price a quoted line from match history, size it, and keep the bankroll out of trouble
//!
//! Usage:
//!   lineedge evaluate --dataset season.json --home Betis --away Sevilla --event corners \
//!       --market combined --direction over --line 9.5 --odds 1.90
//!   lineedge risk
//!   lineedge settle --index 3 --result win
//!   lineedge history

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lineedge_backend::config::EngineConfig;
use lineedge_backend::data::{MatchDataset, SeasonData};
use lineedge_backend::ledger::{PickResult, SqliteLedger, Tracker};
use lineedge_backend::models::{AnalysisMode, AppSettings, Direction, EventKind, MarketKind, OperatingMode};
use lineedge_backend::pipeline::{PickQuery, Pipeline};

/// Count-event line evaluator
#[derive(Parser, Debug)]
#[command(name = "lineedge")]
#[command(about = "Evaluate count-event lines against match history and track picks")]
struct Cli {
    /// SQLite ledger path (overrides LINEEDGE_DB_PATH)
    #[arg(long)]
    db_path: Option<String>,

    /// Engine config TOML (overrides LINEEDGE_CONFIG_PATH)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Price one line and print the outcome as JSON
    Evaluate {
        /// Current-season dataset (JSON array of matches)
        #[arg(long)]
        dataset: PathBuf,

        /// Prior-season dataset for blending
        #[arg(long)]
        prior: Option<PathBuf>,

        #[arg(long)]
        home: String,

        #[arg(long)]
        away: String,

        /// goals | shots | shots_on_target | corners | cards | fouls
        #[arg(long)]
        event: String,

        /// combined | home | away
        #[arg(long, default_value = "combined")]
        market: String,

        /// over | under
        #[arg(long, default_value = "over")]
        direction: String,

        #[arg(long)]
        line: f64,

        /// Decimal odds
        #[arg(long)]
        odds: f64,

        #[arg(long)]
        referee: Option<String>,

        /// Home team at home vs away team away
        #[arg(long)]
        specific: bool,

        /// production | lab (overrides LINEEDGE_MODE)
        #[arg(long)]
        mode: Option<String>,

        /// Currency value of one unit
        #[arg(long)]
        unit_value: Option<f64>,
    },

    /// Print the current risk state
    Risk,

    /// Settle a pending pick by ledger index
    Settle {
        #[arg(long)]
        index: usize,

        /// win | loss | push
        #[arg(long)]
        result: String,
    },

    /// List logged picks
    History {
        /// Only the last N picks
        #[arg(long)]
        last: Option<usize>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = AppSettings::from_env()?;
    let db_path = cli.db_path.clone().unwrap_or(settings.database_path.clone());
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.config_path));
    let config = Arc::new(load_config(&config_path)?);

    let ledger = Arc::new(
        SqliteLedger::new(&db_path).with_context(|| format!("Failed to open ledger {db_path}"))?,
    );
    let tracker = Arc::new(Tracker::new(
        ledger.clone(),
        ledger.clone(),
        config.risk.clone(),
    ));

    match cli.command {
        Commands::Evaluate {
            dataset,
            prior,
            home,
            away,
            event,
            market,
            direction,
            line,
            odds,
            referee,
            specific,
            mode,
            unit_value,
        } => {
            let mut season = SeasonData::new(MatchDataset::load_json(&dataset)?, config.observations.clone());
            if let Some(prior) = prior {
                season = season.with_prior(MatchDataset::load_json(&prior)?);
            }
            let season = Arc::new(season);

            let mode = match mode {
                Some(m) => m.parse::<OperatingMode>()?,
                None => settings.mode,
            };
            let query = PickQuery {
                home_team: home,
                away_team: away,
                event: event.parse::<EventKind>()?,
                market: market.parse::<MarketKind>()?,
                direction: direction.parse::<Direction>()?,
                line,
                odds,
                analysis: if specific {
                    AnalysisMode::Specific
                } else {
                    AnalysisMode::Global
                },
                referee,
                mode,
                unit_value,
            };

            let pipeline = Pipeline::new(config.clone(), season.clone(), season, tracker)
                .with_audit(ledger.clone());
            let outcome = pipeline.evaluate(&query)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Risk => {
            let state = tracker.risk_state()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Settle { index, result } => {
            let result: PickResult = result.parse()?;
            let record = tracker.settle(index, result)?;
            info!(
                index,
                profit = record.profit,
                bankroll = record.bankroll_after.unwrap_or_default(),
                "settled"
            );
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::History { last } => {
            let history = tracker.history()?;
            let skip = last.map(|n| history.len().saturating_sub(n)).unwrap_or(0);
            for (index, record) in history.iter().enumerate().skip(skip) {
                let result = record
                    .result
                    .map(|r| format!("{r:?}"))
                    .unwrap_or_else(|| "pending".to_string());
                println!(
                    "{index:>4}  {}  {} vs {}  {} {} {} {:.1} @ {:.2}  stake {:.2}  {}  {:+.2}",
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    record.home_team,
                    record.away_team,
                    record.event,
                    record.market,
                    record.direction,
                    record.line,
                    record.odds,
                    record.stake,
                    result,
                    record.profit,
                );
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    if path.exists() {
        EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))
    } else {
        Ok(EngineConfig::default())
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lineedge_backend=info,lineedge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
