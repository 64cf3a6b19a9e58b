//! Pre-decision gate and rejection records
//!
//! Refusals are values, never errors. Every firing reason is reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::{dynamic_z, RiskState, RiskStatus};
use crate::config::RiskConfig;
use crate::models::OperatingMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum GateReason {
    #[serde(rename = "SISTEMA_BLOQUEADO")]
    SystemBlocked,
    #[serde(rename = "DRAWDOWN_ALTO")]
    HighDrawdown { drawdown: f64 },
    #[serde(rename = "KELLY_COLAPSADO")]
    KellyCollapsed { multiplier: f64 },
    #[serde(rename = "ROI_ROLLING_NEGATIVO")]
    NegativeRollingRoi { roi: f64 },
    #[serde(rename = "CV_CRITICO")]
    CriticalCv { cv: f64, max: f64 },
    /// Post-decision: edge did not clear the threshold
    #[serde(rename = "EDGE_INSUFICIENTE")]
    InsufficientEdge { edge: f64, threshold: f64 },
}

impl GateReason {
    pub fn code(&self) -> &'static str {
        match self {
            GateReason::SystemBlocked => "SISTEMA_BLOQUEADO",
            GateReason::HighDrawdown { .. } => "DRAWDOWN_ALTO",
            GateReason::KellyCollapsed { .. } => "KELLY_COLAPSADO",
            GateReason::NegativeRollingRoi { .. } => "ROI_ROLLING_NEGATIVO",
            GateReason::CriticalCv { .. } => "CV_CRITICO",
            GateReason::InsufficientEdge { .. } => "EDGE_INSUFICIENTE",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::CriticalCv { cv, max } => write!(f, "CV_CRITICO ({cv:.2} > {max:.2})"),
            GateReason::InsufficientEdge { edge, threshold } => {
                write!(f, "EDGE_INSUFICIENTE ({edge:.4} < {threshold:.4})")
            }
            other => f.write_str(other.code()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatePhase {
    Pre,
    Post,
}

impl GatePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePhase::Pre => "PRE",
            GatePhase::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    pub allowed: bool,
    pub reasons: Vec<GateReason>,
}

impl GateVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }

    pub fn has(&self, code: &str) -> bool {
        self.reasons.iter().any(|r| r.code() == code)
    }
}

/// Refuses staking when the system is unhealthy or the pick is too volatile
pub struct PreDecisionGate<'a> {
    cfg: &'a RiskConfig,
}

impl<'a> PreDecisionGate<'a> {
    pub fn new(cfg: &'a RiskConfig) -> Self {
        Self { cfg }
    }

    /// Lab mode always passes. `cv_max` is the larger per-side CV of the pick.
    pub fn evaluate(&self, mode: OperatingMode, state: &RiskState, cv_max: f64) -> GateVerdict {
        if !mode.is_production() {
            return GateVerdict::allow();
        }

        let mut reasons = Vec::new();
        if state.status == RiskStatus::Blocked {
            reasons.push(GateReason::SystemBlocked);
        }
        if state.drawdown >= self.cfg.gate_drawdown {
            reasons.push(GateReason::HighDrawdown {
                drawdown: state.drawdown,
            });
        }
        if state.kelly_multiplier < self.cfg.gate_kelly {
            reasons.push(GateReason::KellyCollapsed {
                multiplier: state.kelly_multiplier,
            });
        }
        if state.rolling_roi < self.cfg.gate_roi {
            reasons.push(GateReason::NegativeRollingRoi {
                roi: state.rolling_roi,
            });
        }
        if cv_max > self.cfg.max_cv {
            reasons.push(GateReason::CriticalCv {
                cv: cv_max,
                max: self.cfg.max_cv,
            });
        }

        GateVerdict {
            allowed: reasons.is_empty(),
            reasons,
        }
    }
}

/// Audit row for a refusal at either gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: GatePhase,
    pub state: RiskState,
    pub z_base: Option<f64>,
    pub z_dynamic: Option<f64>,
    pub cv: f64,
    pub reasons: Vec<String>,
}

impl RejectionRecord {
    pub fn new(phase: GatePhase, state: &RiskState, cv: f64, reasons: &[GateReason], cfg: &RiskConfig) -> Self {
        let z_base = state.z_adjustment;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            phase,
            state: state.clone(),
            z_base,
            z_dynamic: z_base.map(|z| dynamic_z(z, cv, state.drawdown, cfg)),
            cv,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Reasons joined the way the audit table stores them
    pub fn joined_reasons(&self) -> String {
        self.reasons.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PickResult;
    use crate::risk::state::tests::settled;

    #[test]
    fn blocked_state_refuses_with_all_reasons() {
        let cfg = RiskConfig::default();
        let history: Vec<_> = (0..6).map(|_| settled(1_000.0, 2.0, PickResult::Loss)).collect();
        let state = RiskState::derive(&history, &cfg);
        let verdict = PreDecisionGate::new(&cfg).evaluate(OperatingMode::Production, &state, 0.4);
        assert!(!verdict.allowed);
        assert!(verdict.has("SISTEMA_BLOQUEADO"));
        assert!(verdict.has("DRAWDOWN_ALTO"));
        assert!(verdict.has("KELLY_COLAPSADO"));
        assert!(verdict.has("ROI_ROLLING_NEGATIVO"));
        assert!(!verdict.has("CV_CRITICO"));
    }

    #[test]
    fn healthy_state_passes() {
        let cfg = RiskConfig::default();
        let state = RiskState::derive(&[], &cfg);
        let verdict = PreDecisionGate::new(&cfg).evaluate(OperatingMode::Production, &state, 0.4);
        assert!(verdict.allowed);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn volatile_pick_is_refused_alone() {
        let cfg = RiskConfig::default();
        let state = RiskState::derive(&[], &cfg);
        let verdict = PreDecisionGate::new(&cfg).evaluate(OperatingMode::Production, &state, 0.91);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reasons.len(), 1);
        assert_eq!(verdict.reasons[0].to_string(), "CV_CRITICO (0.91 > 0.85)");
    }

    #[test]
    fn recovery_state_is_not_refused_for_kelly() {
        let cfg = RiskConfig::default();
        let mut history: Vec<_> = (0..10).map(|_| settled(100.0, 2.0, PickResult::Win)).collect();
        history.extend((0..3).map(|_| settled(100.0, 2.0, PickResult::Loss)));
        let state = RiskState::derive(&history, &cfg);
        assert_eq!(state.status, RiskStatus::Recovery);
        let verdict = PreDecisionGate::new(&cfg).evaluate(OperatingMode::Production, &state, 0.3);
        assert!(verdict.allowed);
    }

    #[test]
    fn lab_mode_bypasses_gate() {
        let cfg = RiskConfig::default();
        let history: Vec<_> = (0..6).map(|_| settled(1_000.0, 2.0, PickResult::Loss)).collect();
        let state = RiskState::derive(&history, &cfg);
        assert!(PreDecisionGate::new(&cfg).evaluate(OperatingMode::Lab, &state, 2.0).allowed);
    }

    #[test]
    fn rejection_record_snapshots_state() {
        let cfg = RiskConfig::default();
        let state = RiskState::derive(&[], &cfg);
        let reasons = vec![GateReason::CriticalCv { cv: 0.9, max: 0.85 }];
        let record = RejectionRecord::new(GatePhase::Pre, &state, 0.9, &reasons, &cfg);
        assert_eq!(record.z_base, Some(1.0));
        assert_eq!(record.z_dynamic, Some(1.3));
        assert_eq!(record.joined_reasons(), "CV_CRITICO (0.90 > 0.85)");
        assert_eq!(record.phase.as_str(), "PRE");
    }
}
