//! Lambda construction
//!
//! Four multiplicative layers, applied in order:
//! 1. Base cross: `attack_for × rival_against / league_per_team`
//!    (linear average when no league mean is known)
//! 2. Schedule strength
//! 3. Volatility shrinkage toward the league per-team mean
//! 4. Defensive dampening by the rival's concession rate
//!
//! Every factor is positive, so no layer can produce a non-positive lambda.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EngineConfig, EventConfig, LambdaConfig};
use crate::error::{EngineError, Result};
use crate::models::{EventKind, MarketKind};
use crate::stats::SampleStatistics;

/// The four samples a match lambda is built from
#[derive(Debug, Clone)]
pub struct TeamSamples {
    pub home_for: SampleStatistics,
    pub home_against: SampleStatistics,
    pub away_for: SampleStatistics,
    pub away_against: SampleStatistics,
}

impl TeamSamples {
    fn roles(&self) -> [(&'static str, &SampleStatistics); 4] {
        [
            ("home_for", &self.home_for),
            ("home_against", &self.home_against),
            ("away_for", &self.away_for),
            ("away_against", &self.away_against),
        ]
    }

    /// Roles whose sample is not usable
    pub fn invalid_roles(&self) -> Vec<&'static str> {
        self.roles()
            .into_iter()
            .filter(|(_, s)| !s.valid)
            .map(|(role, _)| role)
            .collect()
    }

    /// Smallest sample size across the four
    pub fn weakest_n(&self) -> usize {
        self.roles().iter().map(|(_, s)| s.n).min().unwrap_or(0)
    }

    /// Larger attacking CV of the two sides
    pub fn max_attack_cv(&self) -> f64 {
        self.home_for.cv.max(self.away_for.cv)
    }
}

/// Average rival defensive strength relative to league, per side. 1.0 is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStrength {
    pub home: f64,
    pub away: f64,
}

impl Default for ScheduleStrength {
    fn default() -> Self {
        Self {
            home: 1.0,
            away: 1.0,
        }
    }
}

/// Factors each layer applied, per side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaAdjustments {
    pub schedule_home: f64,
    pub schedule_away: f64,
    pub shrink_home: f64,
    pub shrink_away: f64,
    pub defensive_home: f64,
    pub defensive_away: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaResult {
    pub event: EventKind,
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub lambda_total: f64,
    /// Weakest-link sample size; later adjustments never raise it
    pub n_effective: usize,
    /// Informational only
    pub method_label: String,
    /// Layer 1 output
    pub raw_home: f64,
    pub raw_away: f64,
    pub adjustments: LambdaAdjustments,
}

impl LambdaResult {
    pub fn push_label(&mut self, part: &str) {
        self.method_label.push_str(" + ");
        self.method_label.push_str(part);
    }
}

impl MarketKind {
    /// Lambda the market is priced on (sum for combined)
    pub fn lambda_for(&self, result: &LambdaResult) -> f64 {
        match self {
            MarketKind::Combined => result.lambda_home + result.lambda_away,
            MarketKind::Home => result.lambda_home,
            MarketKind::Away => result.lambda_away,
        }
    }
}

pub struct LambdaBuilder<'a> {
    lambda: &'a LambdaConfig,
    event_config: &'a EventConfig,
    event: EventKind,
}

impl<'a> LambdaBuilder<'a> {
    pub fn new(config: &'a EngineConfig, event: EventKind) -> Self {
        Self {
            lambda: &config.lambda,
            event_config: config.event(event),
            event,
        }
    }

    /// `league_total` is the league's mean match total (both teams).
    pub fn build(
        &self,
        samples: &TeamSamples,
        league_total: Option<f64>,
        schedule: ScheduleStrength,
    ) -> Result<LambdaResult> {
        self.check_samples(samples)?;
        for (side, factor) in [("home", schedule.home), ("away", schedule.away)] {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "{side} schedule strength must be positive, got {factor}"
                )));
            }
        }

        let league_total = league_total.filter(|m| m.is_finite() && *m > 0.0);
        let per_team = league_total.unwrap_or(self.lambda.fallback_league_total) / 2.0;

        let home_for = samples.home_for.lambda();
        let home_against = samples.home_against.lambda();
        let away_for = samples.away_for.lambda();
        let away_against = samples.away_against.lambda();

        // Layer 1
        let mut parts: Vec<String> = Vec::new();
        let (raw_home, raw_away) = match league_total {
            Some(total) => {
                let per_team = total / 2.0;
                parts.push("MULTIPLICATIVO".to_string());
                (
                    home_for * away_against / per_team,
                    away_for * home_against / per_team,
                )
            }
            None => {
                debug!(event = %self.event, "no league mean, falling back to linear average");
                parts.push("LINEAL (Sin Media)".to_string());
                (
                    (home_for + away_against) / 2.0,
                    (away_for + home_against) / 2.0,
                )
            }
        };

        // Layer 2
        let mut lambda_home = raw_home * schedule.home;
        let mut lambda_away = raw_away * schedule.away;
        if schedule.home != 1.0 || schedule.away != 1.0 {
            parts.push("SoS".to_string());
        }

        // Layer 3
        let shrink_home = self.shrink_weight(samples.home_for.cv);
        let shrink_away = self.shrink_weight(samples.away_for.cv);
        lambda_home = lambda_home * (1.0 - shrink_home) + per_team * shrink_home;
        lambda_away = lambda_away * (1.0 - shrink_away) + per_team * shrink_away;
        if shrink_home > 0.0 || shrink_away > 0.0 {
            parts.push("VOLATILIDAD".to_string());
        }

        // Layer 4: each side scaled by the rival's adjustment
        let defensive_home = self.defensive_factor(away_against / per_team);
        let defensive_away = self.defensive_factor(home_against / per_team);
        lambda_home *= defensive_home;
        lambda_away *= defensive_away;
        parts.push(format!(
            "DEF[{:.2}](h{:.3}|a{:.3})",
            self.event_config.defensive_coefficient, defensive_home, defensive_away
        ));

        let result = LambdaResult {
            event: self.event,
            lambda_home,
            lambda_away,
            lambda_total: lambda_home + lambda_away,
            n_effective: samples.weakest_n(),
            method_label: parts.join(" + "),
            raw_home,
            raw_away,
            adjustments: LambdaAdjustments {
                schedule_home: schedule.home,
                schedule_away: schedule.away,
                shrink_home,
                shrink_away,
                defensive_home,
                defensive_away,
            },
        };

        debug!(
            event = %self.event,
            lambda_home = result.lambda_home,
            lambda_away = result.lambda_away,
            n_effective = result.n_effective,
            method = %result.method_label,
            "lambda built"
        );

        Ok(result)
    }

    fn check_samples(&self, samples: &TeamSamples) -> Result<()> {
        for (role, sample) in samples.roles() {
            let reason = if !sample.valid {
                Some("sample flagged invalid".to_string())
            } else if !sample.lambda().is_finite() || sample.lambda() <= 0.0 {
                Some(format!("lambda must be positive, got {}", sample.lambda()))
            } else if sample.event != self.event {
                Some(format!(
                    "sample is for {}, builder is for {}",
                    sample.event, self.event
                ))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(EngineError::InvalidSample {
                    role: role.to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// `min((cv − threshold)·rate, cap)` above the threshold, else 0
    fn shrink_weight(&self, cv: f64) -> f64 {
        if cv > self.lambda.volatility_threshold {
            ((cv - self.lambda.volatility_threshold) * self.lambda.shrink_rate)
                .min(self.lambda.shrink_cap)
        } else {
            0.0
        }
    }

    /// `(ratio − 1)·coef + 1`, clamped to the event's band
    fn defensive_factor(&self, ratio: f64) -> f64 {
        let coef = self.event_config.defensive_coefficient;
        ((ratio - 1.0) * coef + 1.0).clamp(
            self.lambda.defensive_floor,
            self.event_config.defensive_ceiling,
        )
    }
}
