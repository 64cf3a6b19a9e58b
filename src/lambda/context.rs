//! Match-context corrections applied after the four lambda layers.
//!
//! Finishing efficiency (goals, shots on target) scales each side by its own
//! conversion rate relative to the league. The referee factor (cards, fouls)
//! scales both sides by the referee's per-match average relative to the league.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LambdaResult;
use crate::config::ContextConfig;

/// Per-side multipliers plus the label fragment describing them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFactors {
    pub home: f64,
    pub away: f64,
    pub label: Option<String>,
}

impl ContextFactors {
    pub fn neutral() -> Self {
        Self {
            home: 1.0,
            away: 1.0,
            label: None,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.home == 1.0 && self.away == 1.0
    }

    pub fn finishing(home: f64, away: f64) -> Self {
        Self {
            home,
            away,
            label: Some(format!("K[h{home:.2}|a{away:.2}]")),
        }
    }

    pub fn referee(factor: f64) -> Self {
        Self {
            home: factor,
            away: factor,
            label: Some(format!("ARB[{factor:.2}]")),
        }
    }
}

/// Team ratio over league ratio, clamped. Neutral when either is unknown.
pub fn finishing_factor(team_ratio: Option<f64>, league_ratio: Option<f64>, cfg: &ContextConfig) -> f64 {
    match (team_ratio, league_ratio) {
        (Some(team), Some(league)) if league > 0.0 && team.is_finite() => {
            (team / league).clamp(cfg.finishing_floor, cfg.finishing_ceiling)
        }
        _ => 1.0,
    }
}

/// Referee average over league average. Needs `referee_min_games` matches.
pub fn referee_factor(
    referee_avg: Option<f64>,
    referee_games: usize,
    league_avg: f64,
    cfg: &ContextConfig,
) -> f64 {
    match referee_avg {
        Some(avg) if referee_games >= cfg.referee_min_games && league_avg > 0.0 => {
            (avg / league_avg).clamp(cfg.referee_floor, cfg.referee_ceiling)
        }
        _ => 1.0,
    }
}

impl LambdaResult {
    /// Multiply both sides and record the label. `n_effective` is untouched.
    pub fn apply_context(&mut self, factors: &ContextFactors) {
        if factors.is_neutral() || factors.home <= 0.0 || factors.away <= 0.0 {
            return;
        }
        self.lambda_home *= factors.home;
        self.lambda_away *= factors.away;
        self.lambda_total = self.lambda_home + self.lambda_away;
        if let Some(label) = &factors.label {
            self.push_label(label);
        }
        debug!(
            home = factors.home,
            away = factors.away,
            lambda_total = self.lambda_total,
            "context factors applied"
        );
    }
}
