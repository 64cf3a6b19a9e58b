//! Engine configuration
//!
//! Every calibrated constant of the pipeline lives here, keyed by event type
//! where it differs per event. Loaded from TOML; missing keys fall back to the
//! calibrated defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::models::EventKind;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Descriptive statistics extraction
    #[serde(default)]
    pub sample: SampleConfig,

    /// Lambda construction layers
    #[serde(default)]
    pub lambda: LambdaConfig,

    /// Count models and simulation
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Edge, threshold and staking
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Risk state machine and pre-decision gate
    #[serde(default)]
    pub risk: RiskConfig,

    /// Observation extraction and prior-season blending
    #[serde(default)]
    pub observations: ObservationConfig,

    /// Finishing and referee context factors
    #[serde(default)]
    pub context: ContextConfig,

    /// Per-event calibration table
    #[serde(default)]
    pub events: EventTable,
}

impl EngineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path = std::env::var("LINEEDGE_CONFIG_PATH")
            .unwrap_or_else(|_| "lineedge.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default engine config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn event(&self, event: EventKind) -> &EventConfig {
        self.events.get(event)
    }

    /// Reject values that would break the numerical contracts downstream
    pub fn validate(&self) -> Result<()> {
        if self.sample.min_sample == 0 {
            return Err(EngineError::Config("sample.min_sample must be >= 1".into()));
        }
        if self.distribution.simulations == 0 {
            return Err(EngineError::Config(
                "distribution.simulations must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decision.kelly_fraction) {
            return Err(EngineError::Config(
                "decision.kelly_fraction must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decision.kelly_cap) {
            return Err(EngineError::Config(
                "decision.kelly_cap must be in [0, 1]".into(),
            ));
        }
        if self.lambda.defensive_floor <= 0.0 {
            return Err(EngineError::Config(
                "lambda.defensive_floor must be positive".into(),
            ));
        }
        for event in EventKind::ALL {
            let cfg = self.event(event);
            if cfg.expected_cv <= 0.0 {
                return Err(EngineError::Config(format!(
                    "events.{event}.expected_cv must be positive"
                )));
            }
            if cfg.defensive_ceiling < self.lambda.defensive_floor {
                return Err(EngineError::Config(format!(
                    "events.{event}.defensive_ceiling below lambda.defensive_floor"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Below this many observations the sample is invalid
    pub min_sample: usize,
    /// Exponential recency decay per position
    pub decay_alpha: f64,
    /// Tukey fence multiplier
    pub iqr_factor: f64,
    /// Outlier screening needs at least this many values
    pub min_outlier_len: usize,
    /// Normalized CV at which a sample is flagged volatile
    pub cv_high: f64,
    /// Normalized CV at which a sample is flagged uncertain
    pub cv_very_high: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            min_sample: 5,
            decay_alpha: 0.15,
            iqr_factor: 3.0,
            min_outlier_len: 4,
            cv_high: 1.2,
            cv_very_high: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaConfig {
    /// Attacking CV above which shrinkage toward the league kicks in
    pub volatility_threshold: f64,
    pub shrink_rate: f64,
    pub shrink_cap: f64,
    /// League match total used as shrink target when none is supplied
    pub fallback_league_total: f64,
    /// Lower clamp for the defensive adjustment factor
    pub defensive_floor: f64,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            volatility_threshold: 0.50,
            shrink_rate: 0.5,
            shrink_cap: 0.30,
            fallback_league_total: 2.5,
            defensive_floor: 0.80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Monte Carlo draws per joint evaluation
    pub simulations: usize,
    /// Fixed seed; None draws one from the OS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Draws per rayon chunk (one RNG stream each)
    pub chunk_size: usize,
    /// Score matrix size for 1X2 probabilities
    pub max_goals: u32,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            simulations: 8000,
            seed: None,
            chunk_size: 1000,
            max_goals: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Fixed minimum margin added to the SE term
    pub m_fixed: f64,
    /// Below this n the threshold is m_fixed alone
    pub n_dynamic: usize,
    /// SE is projected to this sample size for n in [n_dynamic, projection_n)
    pub projection_n: usize,
    /// z floor applied in production mode
    pub production_z_floor: f64,
    pub kelly_fraction: f64,
    pub kelly_cap: f64,
    /// Unit value as a share of the bankroll
    pub unit_pct: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            m_fixed: 0.10,
            n_dynamic: 10,
            projection_n: 30,
            production_z_floor: 0.6,
            kelly_fraction: 0.5,
            kelly_cap: 0.05,
            unit_pct: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub initial_bankroll: f64,
    /// Settled picks in the rolling ROI window
    pub rolling_window: usize,

    pub block_drawdown: f64,
    pub block_roi: f64,
    pub recovery_streak: usize,
    pub baseline_z: f64,
    pub recovery_z: f64,
    pub recovery_kelly: f64,

    pub gate_drawdown: f64,
    pub gate_kelly: f64,
    pub gate_roi: f64,
    pub max_cv: f64,

    pub dynamic_z_cap: f64,
    pub cv_step_mid: f64,
    pub cv_step_high: f64,
    pub drawdown_step_mid: f64,
    pub drawdown_step_high: f64,
    pub z_step_mid: f64,
    pub z_step_high: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: 20_000.0,
            rolling_window: 20,
            block_drawdown: 0.25,
            block_roi: -0.15,
            recovery_streak: 3,
            baseline_z: 1.0,
            recovery_z: 1.3,
            recovery_kelly: 0.5,
            gate_drawdown: 0.10,
            gate_kelly: 0.5,
            gate_roi: -0.10,
            max_cv: 0.85,
            dynamic_z_cap: 2.5,
            cv_step_mid: 0.25,
            cv_step_high: 0.30,
            drawdown_step_mid: 0.05,
            drawdown_step_high: 0.10,
            z_step_mid: 0.15,
            z_step_high: 0.30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Cap on retained history per series
    pub max_history: usize,
    /// Max relative gap between season means before the prior is ignored
    pub regime_change: f64,
    /// Prior-season observations appended when blending
    pub prior_lookback: usize,
    /// Prior season needs this many matches to be considered
    pub prior_min: usize,
    /// Floor on a rival's conceded rate in the schedule-strength ratio
    pub rival_floor: f64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            max_history: 40,
            regime_change: 0.25,
            prior_lookback: 10,
            prior_min: 5,
            rival_floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub finishing_floor: f64,
    pub finishing_ceiling: f64,
    pub referee_min_games: usize,
    pub referee_floor: f64,
    pub referee_ceiling: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            finishing_floor: 0.75,
            finishing_ceiling: 1.01,
            referee_min_games: 3,
            referee_floor: 0.80,
            referee_ceiling: 1.0,
        }
    }
}

// ============================================================================
// Per-event table
// ============================================================================

/// Calibration for one event type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Display name
    pub name: String,
    /// Baseline CV the normalized CV is measured against
    pub expected_cv: f64,
    /// Floor for the acceptance threshold
    pub min_edge: f64,
    /// Informational; the CV gate applies to every event
    #[serde(default = "default_true")]
    pub uses_cv: bool,
    /// When false the threshold is min_edge alone
    #[serde(default = "default_true")]
    pub uses_threshold: bool,
    /// z applied to the probability SE
    pub z_score: f64,
    /// How far an opponent's concession rate may move the lambda
    pub defensive_coefficient: f64,
    /// Upper clamp for the defensive adjustment factor
    pub defensive_ceiling: f64,
}

fn default_true() -> bool {
    true
}

impl EventConfig {
    fn calibrated(
        name: &str,
        expected_cv: f64,
        min_edge: f64,
        z_score: f64,
        defensive_coefficient: f64,
        defensive_ceiling: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            expected_cv,
            min_edge,
            uses_cv: true,
            uses_threshold: true,
            z_score,
            defensive_coefficient,
            defensive_ceiling,
        }
    }
}

/// One entry per [`EventKind`], so lookup is exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTable {
    pub goals: EventConfig,
    pub shots: EventConfig,
    pub shots_on_target: EventConfig,
    pub corners: EventConfig,
    pub cards: EventConfig,
    pub fouls: EventConfig,
}

impl Default for EventTable {
    fn default() -> Self {
        Self {
            goals: EventConfig::calibrated("Goles", 0.55, 0.020, 1.0, 0.50, 1.35),
            shots: EventConfig::calibrated("Remates", 0.85, 0.025, 0.7, 0.24, 1.25),
            shots_on_target: EventConfig::calibrated("Remates a puerta", 0.95, 0.020, 0.6, 0.30, 1.25),
            corners: EventConfig::calibrated("Córners", 0.80, 0.030, 0.7, 0.15, 1.25),
            cards: EventConfig::calibrated("Tarjetas", 0.90, 0.030, 0.7, 0.05, 1.25),
            fouls: EventConfig::calibrated("Faltas", 0.75, 0.025, 0.7, 0.05, 1.25),
        }
    }
}

impl EventTable {
    pub fn get(&self, event: EventKind) -> &EventConfig {
        match event {
            EventKind::Goals => &self.goals,
            EventKind::Shots => &self.shots,
            EventKind::ShotsOnTarget => &self.shots_on_target,
            EventKind::Corners => &self.corners,
            EventKind::Cards => &self.cards,
            EventKind::Fouls => &self.fouls,
        }
    }

    /// String lookup; unknown names are a hard error
    pub fn lookup(&self, name: &str) -> Result<&EventConfig> {
        let event: EventKind = name.parse()?;
        Ok(self.get(event))
    }
}
