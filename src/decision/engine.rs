//! Edge, acceptance and stake for one priced line

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::kelly::{fractional_kelly, KellyParams};
use super::threshold::{acceptance_threshold, ThresholdBasis};
use crate::config::EngineConfig;
use crate::distribution::{DistributionEngine, DistributionKind};
use crate::error::{EngineError, Result};
use crate::ledger::AuditLog;
use crate::models::{Direction, EventKind, MarketKind, OperatingMode};
use crate::risk::RiskOverlay;

/// Everything the engine needs to price and size one line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickRequest {
    pub event: EventKind,
    pub market: MarketKind,
    pub direction: Direction,
    pub line: f64,
    /// Decimal odds
    pub odds: f64,
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub cv_home: f64,
    pub cv_away: f64,
    pub rho: f64,
    /// Effective historical sample size
    pub n: usize,
    pub bankroll: f64,
    /// Currency value of one unit; defaults to `unit_pct` of the bankroll
    pub unit_value: Option<f64>,
    pub mode: OperatingMode,
    /// Risk-state adjustments, honored in production only
    pub risk: Option<RiskOverlay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub event: EventKind,
    pub market: MarketKind,
    pub direction: Direction,
    pub line: f64,
    pub odds: f64,
    pub p_model: f64,
    /// Break-even probability implied by the odds
    pub p_market: f64,
    pub edge: f64,
    pub se: f64,
    pub threshold: f64,
    pub threshold_basis: ThresholdBasis,
    pub z_event: f64,
    pub kelly_raw: f64,
    /// Bankroll fraction staked
    pub stake_fraction: f64,
    pub stake: f64,
    pub stake_units: f64,
    pub accepted: bool,
    pub distribution_used: DistributionKind,
    /// Lambda of the priced market (sum for combined)
    pub lambda_used: f64,
    pub reason: String,
}

/// Decision audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionAuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub request: PickRequest,
    pub decision: DecisionResult,
}

pub struct DecisionEngine {
    config: Arc<EngineConfig>,
    distribution: DistributionEngine,
    audit: Option<Arc<dyn AuditLog>>,
}

impl DecisionEngine {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let distribution = DistributionEngine::new(config.distribution.clone());
        Self {
            config,
            distribution,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn evaluate(&self, request: &PickRequest) -> Result<DecisionResult> {
        validate(request)?;

        let event_cfg = self.config.event(request.event);
        let decision_cfg = &self.config.decision;

        let (p_model, internal_kind, lambda_used) = match request.market {
            MarketKind::Combined => {
                let joint = self.distribution.joint_tail(
                    (request.lambda_home, request.cv_home),
                    (request.lambda_away, request.cv_away),
                    request.rho,
                    request.line,
                )?;
                let kind = if joint.home_kind == DistributionKind::NegativeBinomial
                    || joint.away_kind == DistributionKind::NegativeBinomial
                {
                    DistributionKind::NegativeBinomial
                } else {
                    DistributionKind::Poisson
                };
                (
                    joint.probability(request.direction),
                    kind,
                    request.lambda_home + request.lambda_away,
                )
            }
            MarketKind::Home => {
                let tail = self.distribution.single_tail(
                    request.lambda_home,
                    request.cv_home,
                    request.line,
                    request.direction,
                )?;
                (tail.probability, tail.kind, request.lambda_home)
            }
            MarketKind::Away => {
                let tail = self.distribution.single_tail(
                    request.lambda_away,
                    request.cv_away,
                    request.line,
                    request.direction,
                )?;
                (tail.probability, tail.kind, request.lambda_away)
            }
        };

        let distribution_used = reported_distribution(request);
        debug_assert_eq!(
            distribution_used, internal_kind,
            "reported distribution disagrees with the model used"
        );

        let p_market = if request.odds > 0.0 { 1.0 / request.odds } else { 0.0 };
        let edge = if request.odds > 1.0 { p_model - p_market } else { 0.0 };

        let overlay = match request.mode {
            OperatingMode::Production => request.risk.unwrap_or_default(),
            OperatingMode::Lab => RiskOverlay::default(),
        };
        let mut z_event = event_cfg.z_score * overlay.z_scale;
        if request.mode.is_production() {
            z_event = z_event.max(decision_cfg.production_z_floor);
        }

        let threshold = acceptance_threshold(p_model, request.n, z_event, event_cfg, decision_cfg);
        let accepted = edge >= threshold.value;

        let unit_value = request
            .unit_value
            .unwrap_or(request.bankroll * decision_cfg.unit_pct);
        let stake = if accepted {
            fractional_kelly(
                edge,
                request.odds,
                &KellyParams {
                    bankroll: request.bankroll,
                    kelly_fraction: decision_cfg.kelly_fraction,
                    cap: decision_cfg.kelly_cap,
                    multiplier: overlay.kelly_multiplier,
                    unit_value,
                },
            )
        } else {
            Default::default()
        };

        let comparison = if accepted { ">=" } else { "<" };
        let reason = format!(
            "edge {:.4} {} threshold {:.4} [{}]",
            edge, comparison, threshold.value, threshold.reason
        );

        let result = DecisionResult {
            event: request.event,
            market: request.market,
            direction: request.direction,
            line: request.line,
            odds: request.odds,
            p_model,
            p_market,
            edge,
            se: threshold.se,
            threshold: threshold.value,
            threshold_basis: threshold.basis,
            z_event,
            kelly_raw: stake.kelly_raw,
            stake_fraction: stake.fraction,
            stake: stake.stake,
            stake_units: stake.units,
            accepted,
            distribution_used,
            lambda_used,
            reason,
        };

        if result.accepted {
            info!(
                event = %request.event,
                market = %request.market,
                line = request.line,
                odds = request.odds,
                p_model = result.p_model,
                edge = result.edge,
                stake = result.stake,
                "pick accepted"
            );
        } else {
            debug!(
                event = %request.event,
                market = %request.market,
                edge = result.edge,
                threshold = result.threshold,
                "pick rejected"
            );
        }

        self.audit(request, &result);
        Ok(result)
    }

    fn audit(&self, request: &PickRequest, decision: &DecisionResult) {
        let Some(audit) = &self.audit else {
            return;
        };
        let record = DecisionAuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request: request.clone(),
            decision: decision.clone(),
        };
        if let Err(e) = audit.record_decision(&record) {
            warn!("decision audit write failed: {e:#}");
        }
    }
}

/// Over-dispersed whenever a priced side's variance exceeds its mean
fn reported_distribution(request: &PickRequest) -> DistributionKind {
    let home = DistributionKind::for_dispersion(request.lambda_home, request.cv_home);
    let away = DistributionKind::for_dispersion(request.lambda_away, request.cv_away);
    let over_dispersed = match request.market {
        MarketKind::Combined => {
            home == DistributionKind::NegativeBinomial || away == DistributionKind::NegativeBinomial
        }
        MarketKind::Home => home == DistributionKind::NegativeBinomial,
        MarketKind::Away => away == DistributionKind::NegativeBinomial,
    };
    if over_dispersed {
        DistributionKind::NegativeBinomial
    } else {
        DistributionKind::Poisson
    }
}

fn validate(request: &PickRequest) -> Result<()> {
    if !request.line.is_finite() {
        return Err(EngineError::InvalidInput("line must be finite".into()));
    }
    if !request.odds.is_finite() {
        return Err(EngineError::InvalidInput("odds must be finite".into()));
    }
    if !request.bankroll.is_finite() || request.bankroll < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "bankroll must be non-negative, got {}",
            request.bankroll
        )));
    }
    if !request.rho.is_finite() {
        return Err(EngineError::InvalidInput("rho must be finite".into()));
    }
    Ok(())
}
