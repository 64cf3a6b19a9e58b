//! End-to-end evaluation of one priced line
//!
//! observations -> four samples -> lambda (+ context) -> risk gate -> decision
//! -> post-decision audit / pick ledger

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::data::{LeagueParameterSource, LeagueParameters, ObservationSource};
use crate::decision::{DecisionEngine, DecisionResult, PickRequest};
use crate::lambda::{
    finishing_factor, referee_factor, ContextFactors, LambdaBuilder, LambdaResult, ScheduleStrength,
    TeamSamples,
};
use crate::ledger::{AuditLog, OutcomeRecord, PickTicket, Tracker};
use crate::models::{AnalysisMode, Direction, EventKind, MarketKind, OperatingMode};
use crate::risk::{GatePhase, GateReason, GateVerdict, PreDecisionGate, RejectionRecord, RiskState};
use crate::stats::SampleStatistics;

/// One fixture, one event, one quoted line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickQuery {
    pub home_team: String,
    pub away_team: String,
    pub event: EventKind,
    pub market: MarketKind,
    pub direction: Direction,
    pub line: f64,
    pub odds: f64,
    #[serde(default)]
    pub analysis: AnalysisMode,
    #[serde(default)]
    pub referee: Option<String>,
    #[serde(default)]
    pub mode: OperatingMode,
    #[serde(default)]
    pub unit_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// At least one of the four samples is unusable
    InsufficientData { roles: Vec<String> },
    /// Pre-decision gate refused
    Refused { verdict: GateVerdict, state: RiskState },
    Evaluated {
        lambda: LambdaResult,
        decision: DecisionResult,
        state: RiskState,
        /// Pick appended to the ledger (production acceptances only)
        pick: Option<OutcomeRecord>,
    },
}

pub struct Pipeline {
    config: Arc<EngineConfig>,
    observations: Arc<dyn ObservationSource>,
    league: Arc<dyn LeagueParameterSource>,
    tracker: Arc<Tracker>,
    audit: Option<Arc<dyn AuditLog>>,
    engine: DecisionEngine,
}

impl Pipeline {
    pub fn new(
        config: Arc<EngineConfig>,
        observations: Arc<dyn ObservationSource>,
        league: Arc<dyn LeagueParameterSource>,
        tracker: Arc<Tracker>,
    ) -> Self {
        let engine = DecisionEngine::new(config.clone());
        Self {
            config,
            observations,
            league,
            tracker,
            audit: None,
            engine,
        }
    }

    /// Route decision and rejection audit records to `audit`
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.engine = self.engine.with_audit(audit.clone());
        self.audit = Some(audit);
        self
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn evaluate(&self, query: &PickQuery) -> Result<PipelineOutcome> {
        let event = query.event;
        let params = self.league.league_parameters(event)?;

        let (home_filter, away_filter) = query.analysis.filters();
        let home = self
            .observations
            .observations(&query.home_team, event, home_filter)?;
        let away = self
            .observations
            .observations(&query.away_team, event, away_filter)?;

        let samples = TeamSamples {
            home_for: SampleStatistics::extract(&home.scored, event, &self.config)?,
            home_against: SampleStatistics::extract(&home.conceded, event, &self.config)?,
            away_for: SampleStatistics::extract(&away.scored, event, &self.config)?,
            away_against: SampleStatistics::extract(&away.conceded, event, &self.config)?,
        };
        let invalid = samples.invalid_roles();
        if !invalid.is_empty() {
            info!(
                home = %query.home_team,
                away = %query.away_team,
                event = %event,
                roles = ?invalid,
                "insufficient data"
            );
            return Ok(PipelineOutcome::InsufficientData {
                roles: invalid.into_iter().map(String::from).collect(),
            });
        }

        let schedule = ScheduleStrength {
            home: home.schedule_strength,
            away: away.schedule_strength,
        };
        let mut lambda =
            LambdaBuilder::new(&self.config, event).build(&samples, params.league_total(), schedule)?;
        lambda.apply_context(&self.context_factors(query, &params));

        let state = self.tracker.risk_state()?;
        let cv_max = samples.max_attack_cv();

        let verdict = PreDecisionGate::new(&self.config.risk).evaluate(query.mode, &state, cv_max);
        if !verdict.allowed {
            info!(
                home = %query.home_team,
                away = %query.away_team,
                status = state.status.as_str(),
                reasons = ?verdict.reasons.iter().map(|r| r.code()).collect::<Vec<_>>(),
                "pick refused before decision"
            );
            self.record_rejection(GatePhase::Pre, &state, cv_max, &verdict.reasons);
            return Ok(PipelineOutcome::Refused { verdict, state });
        }

        let request = PickRequest {
            event,
            market: query.market,
            direction: query.direction,
            line: query.line,
            odds: query.odds,
            lambda_home: lambda.lambda_home,
            lambda_away: lambda.lambda_away,
            cv_home: samples.home_for.cv,
            cv_away: samples.away_for.cv,
            rho: params.rho,
            n: lambda.n_effective,
            bankroll: state.bankroll,
            unit_value: query.unit_value,
            mode: query.mode,
            risk: state.overlay(&self.config.risk),
        };
        let decision = self.engine.evaluate(&request)?;

        let mut pick = None;
        if query.mode == OperatingMode::Production {
            if !decision.accepted {
                let reason = GateReason::InsufficientEdge {
                    edge: decision.edge,
                    threshold: decision.threshold,
                };
                self.record_rejection(GatePhase::Post, &state, cv_max, &[reason]);
            } else if decision.stake > 0.0 {
                pick = Some(self.tracker.log_pick(PickTicket {
                    home_team: query.home_team.clone(),
                    away_team: query.away_team.clone(),
                    event,
                    market: query.market,
                    direction: query.direction,
                    line: query.line,
                    odds: query.odds,
                    p_model: decision.p_model,
                    edge: decision.edge,
                    stake: decision.stake,
                    stake_units: decision.stake_units,
                    accepted: true,
                    result: None,
                })?);
            }
        }

        Ok(PipelineOutcome::Evaluated {
            lambda,
            decision,
            state,
            pick,
        })
    }

    fn context_factors(&self, query: &PickQuery, params: &LeagueParameters) -> ContextFactors {
        let cfg = &self.config.context;
        let event = query.event;

        if event.uses_finishing_factor() {
            let league_ratio = self.league.finishing_ratio(None, event);
            let home = finishing_factor(
                self.league.finishing_ratio(Some(&query.home_team), event),
                league_ratio,
                cfg,
            );
            let away = finishing_factor(
                self.league.finishing_ratio(Some(&query.away_team), event),
                league_ratio,
                cfg,
            );
            return ContextFactors::finishing(home, away);
        }

        if event.uses_referee_factor() {
            if let Some(referee) = &query.referee {
                let record = self.league.referee_record(referee, event);
                let factor = referee_factor(
                    record.map(|r| r.average),
                    record.map(|r| r.matches).unwrap_or(0),
                    params.mean_total,
                    cfg,
                );
                return ContextFactors::referee(factor);
            }
        }

        ContextFactors::neutral()
    }

    fn record_rejection(&self, phase: GatePhase, state: &RiskState, cv: f64, reasons: &[GateReason]) {
        let Some(audit) = &self.audit else {
            return;
        };
        let record = RejectionRecord::new(phase, state, cv, reasons, &self.config.risk);
        if let Err(e) = audit.record_rejection(&record) {
            warn!("rejection audit write failed: {e:#}");
        }
    }
}
