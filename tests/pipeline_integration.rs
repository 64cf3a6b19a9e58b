//! End-to-end tests for the decision pipeline
//!
//! These exercise the public library API: samples -> lambda -> pricing ->
//! decision, the risk gate in front of it, and both ledger backends.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use lineedge_backend::config::EngineConfig;
use lineedge_backend::data::{EventCount, MatchDataset, MatchRecord, SeasonData};
use lineedge_backend::decision::{DecisionEngine, PickRequest};
use lineedge_backend::distribution::exact_total_probability;
use lineedge_backend::distribution::CountModel;
use lineedge_backend::lambda::{LambdaBuilder, ScheduleStrength, TeamSamples};
use lineedge_backend::ledger::{
    MemoryLedger, OutcomeLedger, PickResult, PickTicket, SqliteLedger, Tracker,
};
use lineedge_backend::models::{AnalysisMode, Direction, EventKind, MarketKind, OperatingMode};
use lineedge_backend::pipeline::{PickQuery, Pipeline, PipelineOutcome};
use lineedge_backend::risk::{GatePhase, RiskStatus};
use lineedge_backend::stats::SampleStatistics;

// =============================================================================
// FIXTURES
// =============================================================================

fn seeded_config() -> Arc<EngineConfig> {
    let mut config = EngineConfig::default();
    config.distribution.seed = Some(2024);
    Arc::new(config)
}

/// Double round robin of four teams with moderately varying corner counts
fn corners_league(rounds: usize) -> MatchDataset {
    let teams = ["Alpha", "Beta", "Gamma", "Delta"];
    let start = NaiveDate::from_ymd_opt(2024, 8, 17).expect("date");
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
                    EventKind::Corners,
                    EventCount {
                        home: 4.0 + ((i + round) % 4) as f64,
                        away: 3.0 + ((j + round) % 5) as f64,
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

fn ticket(stake: f64, result: Option<PickResult>) -> PickTicket {
    PickTicket {
        home_team: "Alpha".into(),
        away_team: "Beta".into(),
        event: EventKind::Corners,
        market: MarketKind::Combined,
        direction: Direction::Over,
        line: 9.5,
        odds: 2.0,
        p_model: 0.55,
        edge: 0.05,
        stake,
        stake_units: stake / 200.0,
        accepted: true,
        result,
    }
}

fn corners_query(odds: f64) -> PickQuery {
    PickQuery {
        home_team: "Alpha".into(),
        away_team: "Beta".into(),
        event: EventKind::Corners,
        market: MarketKind::Combined,
        direction: Direction::Over,
        line: 9.5,
        odds,
        analysis: AnalysisMode::Global,
        referee: None,
        mode: OperatingMode::Production,
        unit_value: None,
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn reference_goals_scenario() {
    let config = seeded_config();
    let sample = |v: f64| SampleStatistics::extract(&[v; 25], EventKind::Goals, &config).expect("sample");
    let samples = TeamSamples {
        home_for: sample(1.8),
        home_against: sample(1.3),
        away_for: sample(1.3),
        away_against: sample(1.3),
    };

    let lambda = LambdaBuilder::new(&config, EventKind::Goals)
        .build(&samples, Some(2.6), ScheduleStrength::default())
        .expect("lambda");
    assert!(lambda.lambda_total > 2.6);
    assert_eq!(lambda.n_effective, 25);

    let decision = DecisionEngine::new(config.clone())
        .evaluate(&PickRequest {
            event: EventKind::Goals,
            market: MarketKind::Combined,
            direction: Direction::Over,
            line: 2.5,
            odds: 1.90,
            lambda_home: lambda.lambda_home,
            lambda_away: lambda.lambda_away,
            cv_home: samples.home_for.cv,
            cv_away: samples.away_for.cv,
            rho: 0.1,
            n: lambda.n_effective,
            bankroll: 20_000.0,
            unit_value: None,
            mode: OperatingMode::Production,
            risk: None,
        })
        .expect("decision");

    assert!(decision.p_model > 0.5);
    assert!(decision.threshold >= config.event(EventKind::Goals).min_edge);
    if decision.accepted {
        assert!(decision.stake > 0.0);
        assert!(decision.stake_fraction <= config.decision.kelly_cap);
    } else {
        assert_eq!(decision.stake, 0.0);
    }
}

#[test]
fn monte_carlo_tracks_exact_convolution() {
    let config = seeded_config();
    let engine = DecisionEngine::new(config);
    let home = CountModel::select(1.6, 0.0).expect("home");
    let away = CountModel::select(1.1, 0.0).expect("away");
    let exact = exact_total_probability(&home, &away, 2.5, Direction::Over);

    let decision = engine
        .evaluate(&PickRequest {
            event: EventKind::Goals,
            market: MarketKind::Combined,
            direction: Direction::Over,
            line: 2.5,
            odds: 2.0,
            lambda_home: 1.6,
            lambda_away: 1.1,
            cv_home: 0.0,
            cv_away: 0.0,
            rho: 0.0,
            n: 40,
            bankroll: 1_000.0,
            unit_value: None,
            mode: OperatingMode::Lab,
            risk: None,
        })
        .expect("decision");
    assert!((decision.p_model - exact).abs() < 3.0 / (8000f64).sqrt());
}

#[test]
fn production_acceptance_logs_pending_pick() {
    let config = seeded_config();
    let season = Arc::new(SeasonData::new(corners_league(3), config.observations.clone()));
    let ledger = Arc::new(MemoryLedger::new());
    let tracker = Arc::new(Tracker::new(ledger.clone(), ledger.clone(), config.risk.clone()));
    let pipeline = Pipeline::new(config.clone(), season.clone(), season, tracker.clone())
        .with_audit(ledger.clone());

    let outcome = pipeline.evaluate(&corners_query(8.0)).expect("pipeline");
    let PipelineOutcome::Evaluated { decision, pick, state, .. } = outcome else {
        panic!("expected an evaluated pick");
    };
    assert_eq!(state.status, RiskStatus::Normal);
    assert!(decision.accepted, "{}", decision.reason);
    assert!(decision.stake > 0.0);
    assert!(decision.stake_fraction <= config.decision.kelly_cap);

    let pick = pick.expect("pick logged");
    assert!(pick.result.is_none());
    let history = tracker.history().expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, pick.id);
    assert_eq!(ledger.decisions().len(), 1);

    let settled = tracker.settle(0, PickResult::Win).expect("settle");
    assert!((settled.profit - pick.stake * 7.0).abs() < 1e-9);
    assert!(tracker.current_bankroll().expect("bankroll") > config.risk.initial_bankroll);
}

#[test]
fn blocked_history_refuses_before_decision() {
    let config = seeded_config();
    let season = Arc::new(SeasonData::new(corners_league(3), config.observations.clone()));
    let ledger = Arc::new(MemoryLedger::new());
    let tracker = Arc::new(Tracker::new(ledger.clone(), ledger.clone(), config.risk.clone()));

    // 6 000 lost on 20 000: 30% drawdown
    for _ in 0..6 {
        tracker
            .log_pick(ticket(1_000.0, Some(PickResult::Loss)))
            .expect("log");
    }
    assert_eq!(tracker.risk_state().expect("state").status, RiskStatus::Blocked);

    let pipeline = Pipeline::new(config, season.clone(), season, tracker.clone())
        .with_audit(ledger.clone());
    let outcome = pipeline.evaluate(&corners_query(8.0)).expect("pipeline");
    let PipelineOutcome::Refused { verdict, state } = outcome else {
        panic!("expected refusal");
    };
    assert!(!verdict.allowed);
    assert!(verdict.has("SISTEMA_BLOQUEADO"));
    assert!(verdict.has("DRAWDOWN_ALTO"));
    assert!((state.drawdown - 0.30).abs() < 1e-9);

    let rejections = ledger.rejections();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].phase, GatePhase::Pre);
    assert!(rejections[0].reasons.iter().any(|r| r == "SISTEMA_BLOQUEADO"));
    assert!(ledger.decisions().is_empty());
    assert_eq!(tracker.history().expect("history").len(), 6);
}

#[test]
fn lab_mode_ignores_blocked_state() {
    let config = seeded_config();
    let season = Arc::new(SeasonData::new(corners_league(3), config.observations.clone()));
    let ledger = Arc::new(MemoryLedger::new());
    let tracker = Arc::new(Tracker::new(ledger.clone(), ledger.clone(), config.risk.clone()));
    for _ in 0..6 {
        tracker
            .log_pick(ticket(1_000.0, Some(PickResult::Loss)))
            .expect("log");
    }

    let pipeline = Pipeline::new(config, season.clone(), season, tracker.clone());
    let mut query = corners_query(8.0);
    query.mode = OperatingMode::Lab;
    let outcome = pipeline.evaluate(&query).expect("pipeline");
    let PipelineOutcome::Evaluated { pick, .. } = outcome else {
        panic!("lab mode must evaluate");
    };
    assert!(pick.is_none());
    assert_eq!(tracker.history().expect("history").len(), 6);
}

#[test]
fn recovery_after_three_losses() {
    let config = seeded_config();
    let ledger = Arc::new(MemoryLedger::new());
    let tracker = Tracker::new(ledger.clone(), ledger, config.risk.clone());
    for _ in 0..10 {
        tracker.log_pick(ticket(100.0, Some(PickResult::Win))).expect("log");
    }
    for _ in 0..3 {
        tracker.log_pick(ticket(100.0, Some(PickResult::Loss))).expect("log");
    }
    let state = tracker.risk_state().expect("state");
    assert_eq!(state.status, RiskStatus::Recovery);
    assert_eq!(state.z_adjustment, Some(1.3));
    assert_eq!(state.kelly_multiplier, 0.5);
    assert!((state.bankroll - 20_700.0).abs() < 1e-9);
}

#[test]
fn sqlite_ledger_round_trips_pipeline_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lineedge.db");
    let path = path.to_str().expect("utf8 path");
    let config = seeded_config();

    {
        let ledger = Arc::new(SqliteLedger::new(path).expect("open"));
        let tracker = Arc::new(Tracker::new(ledger.clone(), ledger.clone(), config.risk.clone()));
        for _ in 0..6 {
            tracker
                .log_pick(ticket(1_000.0, Some(PickResult::Loss)))
                .expect("log");
        }
        let season = Arc::new(SeasonData::new(corners_league(3), config.observations.clone()));
        let pipeline = Pipeline::new(config.clone(), season.clone(), season, tracker)
            .with_audit(ledger.clone());
        let outcome = pipeline.evaluate(&corners_query(8.0)).expect("pipeline");
        assert!(matches!(outcome, PipelineOutcome::Refused { .. }));
        assert_eq!(ledger.rejection_count().expect("count"), 1);
    }

    let ledger = Arc::new(SqliteLedger::new(path).expect("reopen"));
    assert_eq!(ledger.history().expect("history").len(), 6);
    let tracker = Tracker::new(ledger.clone(), ledger.clone(), config.risk.clone());
    let state = tracker.risk_state().expect("state");
    assert_eq!(state.status, RiskStatus::Blocked);
    assert!((state.bankroll - 14_000.0).abs() < 1e-9);
    assert_eq!(ledger.rejection_count().expect("count"), 1);
}
