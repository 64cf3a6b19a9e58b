//! Backtesting Framework
//! Pilot in Command: Walk-Forward Replay
//! Mission: Replay a season match by match, pricing each line only from what was known before kickoff

use crate::config::EngineConfig;
use crate::data::{EventCount, MatchDataset, ObservationSource, SeasonData};
use crate::decision::{DecisionEngine, PickRequest};
use crate::lambda::{LambdaBuilder, ScheduleStrength, TeamSamples};
use crate::ledger::PickResult;
use crate::models::{Direction, EventKind, FilterMode, MarketKind, OperatingMode};
use crate::stats::SampleStatistics;
use anyhow::{ensure, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the quoted line is chosen for a replayed match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LineRule {
    Fixed { line: f64 },
    /// `max(round(lambda) - 0.5, floor)`
    NearestHalf { floor: f64 },
}

impl LineRule {
    pub fn line(&self, lambda: f64) -> f64 {
        match self {
            LineRule::Fixed { line } => *line,
            LineRule::NearestHalf { floor } => (lambda.round() - 0.5).max(*floor),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub event: EventKind,
    pub market: MarketKind,
    pub direction: Direction,
    pub line_rule: LineRule,
    /// Decimal odds assumed for every replayed line
    pub odds: f64,
    /// Minimum prior matches per team before a fixture is priced
    pub min_matches: usize,
    /// Flat stake as a fraction of the running bankroll
    pub stake_pct: f64,
    pub initial_bankroll: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            event: EventKind::Goals,
            market: MarketKind::Combined,
            direction: Direction::Over,
            line_rule: LineRule::Fixed { line: 2.5 },
            odds: 1.90,
            min_matches: 5,
            stake_pct: 0.01,
            initial_bankroll: 20_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestBet {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub line: f64,
    pub p_model: f64,
    pub edge: f64,
    pub stake: f64,
    pub actual: f64,
    pub result: PickResult,
    pub profit: f64,
    pub bankroll_after: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub matches_seen: usize,
    pub total_bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub total_staked: f64,
    pub total_profit: f64,
    pub roi: f64,
    pub final_bankroll: f64,
    pub max_drawdown: f64,
    pub bets: Vec<BacktestBet>,
    pub equity_curve: Vec<(NaiveDate, f64)>,
    pub skipped_due_to_history: usize,
    pub skipped_due_to_sample: usize,
    pub skipped_missing_event: usize,
    pub rejected_by_threshold: usize,
}

#[derive(Default)]
struct SkipCounters {
    history: usize,
    sample: usize,
    missing_event: usize,
    threshold: usize,
}

pub struct WalkForwardBacktest {
    config: BacktestConfig,
    engine_config: Arc<EngineConfig>,
    engine: DecisionEngine,
}

impl WalkForwardBacktest {
    pub fn new(config: BacktestConfig, engine_config: Arc<EngineConfig>) -> Result<Self> {
        ensure!(config.odds > 1.0, "backtest odds must exceed 1.0, got {}", config.odds);
        ensure!(
            config.stake_pct > 0.0 && config.stake_pct <= 1.0,
            "stake_pct must be in (0, 1], got {}",
            config.stake_pct
        );
        ensure!(
            config.initial_bankroll > 0.0,
            "initial bankroll must be positive"
        );
        let engine = DecisionEngine::new(engine_config.clone());
        Ok(Self {
            config,
            engine_config,
            engine,
        })
    }

    pub fn run(&self, dataset: &MatchDataset) -> Result<BacktestReport> {
        tracing::info!(
            event = %self.config.event,
            market = %self.config.market,
            matches = dataset.len(),
            "Starting walk-forward backtest"
        );

        let event = self.config.event;
        let mut bankroll = self.config.initial_bankroll;
        let mut bets = Vec::new();
        let mut equity_curve = Vec::new();
        let mut skips = SkipCounters::default();

        for m in dataset.matches() {
            let Some(actual) = m.counts.get(&event).copied() else {
                skips.missing_event += 1;
                continue;
            };

            let known = dataset.before(m.date);
            let played = |team: &str| {
                known
                    .team_series(team, event, FilterMode::Global, usize::MAX)
                    .len()
            };
            if played(&m.home_team).min(played(&m.away_team)) < self.config.min_matches {
                skips.history += 1;
                continue;
            }

            let season = SeasonData::new(known, self.engine_config.observations.clone());
            let Some((samples, schedule)) = self.samples(&season, &m.home_team, &m.away_team)? else {
                skips.sample += 1;
                continue;
            };

            let params = season.current().league_parameters(event);
            let lambda = LambdaBuilder::new(&self.engine_config, event).build(
                &samples,
                params.league_total(),
                schedule,
            )?;
            let line = self.config.line_rule.line(self.config.market.lambda_for(&lambda));

            let decision = self.engine.evaluate(&PickRequest {
                event,
                market: self.config.market,
                direction: self.config.direction,
                line,
                odds: self.config.odds,
                lambda_home: lambda.lambda_home,
                lambda_away: lambda.lambda_away,
                cv_home: samples.home_for.cv,
                cv_away: samples.away_for.cv,
                rho: params.rho,
                n: lambda.n_effective,
                bankroll,
                unit_value: None,
                mode: OperatingMode::Lab,
                risk: None,
            })?;
            if !decision.accepted {
                skips.threshold += 1;
                continue;
            }

            let stake = bankroll * self.config.stake_pct;
            let actual = self.actual_count(&actual);
            let result = settle(actual, line, self.config.direction);
            let profit = result.profit(stake, self.config.odds);
            bankroll += profit;

            equity_curve.push((m.date, bankroll));
            bets.push(BacktestBet {
                date: m.date,
                home_team: m.home_team.clone(),
                away_team: m.away_team.clone(),
                line,
                p_model: decision.p_model,
                edge: decision.edge,
                stake,
                actual,
                result,
                profit,
                bankroll_after: bankroll,
            });
        }

        let report = self.report(dataset.len(), bets, equity_curve, bankroll, skips);
        tracing::info!(
            "Backtest complete: {} bets, {:.2}% ROI, bankroll {:.2}, max drawdown {:.2}% (skipped history: {}, sample: {}, threshold: {})",
            report.total_bets,
            report.roi * 100.0,
            report.final_bankroll,
            report.max_drawdown * 100.0,
            report.skipped_due_to_history,
            report.skipped_due_to_sample,
            report.rejected_by_threshold
        );
        Ok(report)
    }

    /// Global-filter samples for both teams, or None when any is unusable
    fn samples(&self, season: &SeasonData, home: &str, away: &str) -> Result<Option<(TeamSamples, ScheduleStrength)>> {
        let event = self.config.event;
        let home_obs = season.observations(home, event, FilterMode::Global)?;
        let away_obs = season.observations(away, event, FilterMode::Global)?;
        let samples = TeamSamples {
            home_for: SampleStatistics::extract(&home_obs.scored, event, &self.engine_config)?,
            home_against: SampleStatistics::extract(&home_obs.conceded, event, &self.engine_config)?,
            away_for: SampleStatistics::extract(&away_obs.scored, event, &self.engine_config)?,
            away_against: SampleStatistics::extract(&away_obs.conceded, event, &self.engine_config)?,
        };
        if !samples.invalid_roles().is_empty() {
            return Ok(None);
        }
        let schedule = ScheduleStrength {
            home: home_obs.schedule_strength,
            away: away_obs.schedule_strength,
        };
        Ok(Some((samples, schedule)))
    }

    fn actual_count(&self, count: &EventCount) -> f64 {
        match self.config.market {
            MarketKind::Combined => count.total(),
            MarketKind::Home => count.home,
            MarketKind::Away => count.away,
        }
    }

    fn report(
        &self,
        matches_seen: usize,
        bets: Vec<BacktestBet>,
        equity_curve: Vec<(NaiveDate, f64)>,
        final_bankroll: f64,
        skips: SkipCounters,
    ) -> BacktestReport {
        let count = |r: PickResult| bets.iter().filter(|b| b.result == r).count();
        let total_staked: f64 = bets.iter().map(|b| b.stake).sum();
        let total_profit: f64 = bets.iter().map(|b| b.profit).sum();
        let roi = if total_staked > 0.0 {
            total_profit / total_staked
        } else {
            0.0
        };

        BacktestReport {
            matches_seen,
            total_bets: bets.len(),
            wins: count(PickResult::Win),
            losses: count(PickResult::Loss),
            pushes: count(PickResult::Push),
            total_staked,
            total_profit,
            roi,
            final_bankroll,
            max_drawdown: max_drawdown(self.config.initial_bankroll, &equity_curve),
            bets,
            equity_curve,
            skipped_due_to_history: skips.history,
            skipped_due_to_sample: skips.sample,
            skipped_missing_event: skips.missing_event,
            rejected_by_threshold: skips.threshold,
        }
    }
}

/// Over wins strictly above the line, under strictly below; equal is a push
pub fn settle(actual: f64, line: f64, direction: Direction) -> PickResult {
    if actual == line {
        return PickResult::Push;
    }
    let over = actual > line;
    match (direction, over) {
        (Direction::Over, true) | (Direction::Under, false) => PickResult::Win,
        _ => PickResult::Loss,
    }
}

fn max_drawdown(initial: f64, equity_curve: &[(NaiveDate, f64)]) -> f64 {
    let mut peak = initial;
    let mut max_drawdown: f64 = 0.0;
    for (_, equity) in equity_curve {
        if *equity > peak {
            peak = *equity;
        }
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }
    max_drawdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MatchRecord;
    use std::collections::BTreeMap;

    fn season(rounds: usize) -> MatchDataset {
        let teams = ["Norte", "Sur", "Este", "Oeste"];
        let start = NaiveDate::from_ymd_opt(2023, 8, 12).expect("date");
        let mut matches = Vec::new();
        let mut day = 0i64;
        for round in 0..rounds {
            for (i, home) in teams.iter().enumerate() {
                for (j, away) in teams.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let mut counts = BTreeMap::new();
                    counts.insert(
                        EventKind::Goals,
                        EventCount {
                            home: ((i * 3 + j + round) % 4) as f64,
                            away: ((i + j * 2 + round) % 3) as f64,
                        },
                    );
                    matches.push(MatchRecord {
                        date: start + chrono::Duration::days(day),
                        home_team: home.to_string(),
                        away_team: away.to_string(),
                        referee: None,
                        counts,
                    });
                    day += 1;
                }
            }
        }
        MatchDataset::new(matches)
    }

    fn engine_config() -> Arc<EngineConfig> {
        let mut config = EngineConfig::default();
        config.distribution.seed = Some(5);
        config.distribution.simulations = 2_000;
        Arc::new(config)
    }

    #[test]
    fn settle_handles_push_and_both_directions() {
        assert_eq!(settle(3.0, 2.5, Direction::Over), PickResult::Win);
        assert_eq!(settle(2.0, 2.5, Direction::Over), PickResult::Loss);
        assert_eq!(settle(2.0, 2.5, Direction::Under), PickResult::Win);
        assert_eq!(settle(3.0, 3.0, Direction::Under), PickResult::Push);
    }

    #[test]
    fn nearest_half_respects_floor() {
        let rule = LineRule::NearestHalf { floor: 1.5 };
        assert_eq!(rule.line(2.7), 2.5);
        assert_eq!(rule.line(0.4), 1.5);
        assert_eq!(LineRule::Fixed { line: 9.5 }.line(3.0), 9.5);
    }

    #[test]
    fn early_matches_are_skipped_for_history() {
        let backtest = WalkForwardBacktest::new(BacktestConfig::default(), engine_config()).expect("backtest");
        let report = backtest.run(&season(3)).expect("report");
        assert_eq!(report.matches_seen, 36);
        assert!(report.skipped_due_to_history > 0);
        assert_eq!(
            report.total_bets
                + report.skipped_due_to_history
                + report.skipped_due_to_sample
                + report.skipped_missing_event
                + report.rejected_by_threshold,
            36
        );
    }

    #[test]
    fn bankroll_follows_bet_ledger() {
        let config = BacktestConfig {
            line_rule: LineRule::NearestHalf { floor: 0.5 },
            ..BacktestConfig::default()
        };
        let backtest = WalkForwardBacktest::new(config, engine_config()).expect("backtest");
        let report = backtest.run(&season(4)).expect("report");
        let expected = 20_000.0 + report.bets.iter().map(|b| b.profit).sum::<f64>();
        assert!((report.final_bankroll - expected).abs() < 1e-6);
        assert_eq!(report.wins + report.losses + report.pushes, report.total_bets);
        assert!(report.max_drawdown >= 0.0 && report.max_drawdown <= 1.0);
        assert_eq!(report.equity_curve.len(), report.total_bets);
    }

    #[test]
    fn rejects_bad_config() {
        let config = BacktestConfig {
            odds: 1.0,
            ..BacktestConfig::default()
        };
        assert!(WalkForwardBacktest::new(config, engine_config()).is_err());
    }
}
