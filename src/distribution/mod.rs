//! Count-model probability engine
//!
//! Picks Poisson or negative binomial from the dispersion estimate and prices
//! single-side tails directly. Combined totals go through the correlated
//! Monte Carlo in [`montecarlo`]; [`matrix`] holds the exact independent
//! convolution and the 1X2 score matrix.

pub mod matrix;
pub mod montecarlo;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Discrete, DiscreteCDF, NegativeBinomial, Poisson};
use tracing::debug;

use crate::config::DistributionConfig;
use crate::error::{EngineError, Result};
use crate::models::Direction;

pub use matrix::{exact_total_probability, match_outcome_probabilities, MatchOutcomeProbabilities};
pub use montecarlo::{simulate_total, JointTail};

/// CDF mass beyond which the quantile table stops growing
const TABLE_TAIL_EPS: f64 = 1e-12;
/// Hard cap on table length
const TABLE_MAX_LEN: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Poisson,
    NegativeBinomial,
}

impl DistributionKind {
    pub fn label(&self) -> &'static str {
        match self {
            DistributionKind::Poisson => "Poisson",
            DistributionKind::NegativeBinomial => "NegBinomial",
        }
    }

    /// Dispersion rule: over-dispersed iff σ² > λ, σ² = (cv·λ)² or λ when cv = 0
    pub fn for_dispersion(lambda: f64, cv: f64) -> Self {
        if implied_variance(lambda, cv) > lambda {
            DistributionKind::NegativeBinomial
        } else {
            DistributionKind::Poisson
        }
    }
}

pub fn implied_variance(lambda: f64, cv: f64) -> f64 {
    if cv == 0.0 {
        lambda
    } else {
        (cv * lambda).powi(2)
    }
}

/// One team's count distribution
#[derive(Debug, Clone)]
pub enum CountModel {
    Poisson(Poisson),
    NegativeBinomial {
        dist: NegativeBinomial,
        shape: f64,
        p: f64,
    },
}

impl CountModel {
    /// Moment-match a model to `(λ, σ²)`. Hard switch, never a blend.
    pub fn select(lambda: f64, cv: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "lambda must be positive, got {lambda}"
            )));
        }
        if !cv.is_finite() || cv < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "cv must be non-negative, got {cv}"
            )));
        }

        let variance = implied_variance(lambda, cv);
        match DistributionKind::for_dispersion(lambda, cv) {
            DistributionKind::NegativeBinomial => {
                let p = lambda / variance;
                let shape = lambda * lambda / (variance - lambda);
                let dist = NegativeBinomial::new(shape, p)?;
                Ok(CountModel::NegativeBinomial { dist, shape, p })
            }
            DistributionKind::Poisson => Ok(CountModel::Poisson(Poisson::new(lambda)?)),
        }
    }

    pub fn kind(&self) -> DistributionKind {
        match self {
            CountModel::Poisson(_) => DistributionKind::Poisson,
            CountModel::NegativeBinomial { .. } => DistributionKind::NegativeBinomial,
        }
    }

    pub fn pmf(&self, k: u64) -> f64 {
        match self {
            CountModel::Poisson(d) => d.pmf(k),
            CountModel::NegativeBinomial { dist, .. } => dist.pmf(k),
        }
    }

    pub fn cdf(&self, k: u64) -> f64 {
        match self {
            CountModel::Poisson(d) => d.cdf(k),
            CountModel::NegativeBinomial { dist, .. } => dist.cdf(k),
        }
    }

    /// `P(X > floor(line))` for over, `P(X <= floor(line))` for under
    pub fn tail(&self, line: f64, direction: Direction) -> f64 {
        let cdf = if line < 0.0 {
            0.0
        } else {
            self.cdf(line.floor() as u64)
        };
        let p = match direction {
            Direction::Over => 1.0 - cdf,
            Direction::Under => cdf,
        };
        p.clamp(0.0, 1.0)
    }

    /// Precomputed CDF for inverse-transform sampling
    pub fn quantile_table(&self) -> QuantileTable {
        let mut cdf = Vec::with_capacity(64);
        let mut acc = 0.0;
        for k in 0..TABLE_MAX_LEN as u64 {
            acc += self.pmf(k);
            cdf.push(acc.min(1.0));
            if acc >= 1.0 - TABLE_TAIL_EPS {
                break;
            }
        }
        QuantileTable { cdf }
    }

    /// One-off inverse CDF; build a table when sampling repeatedly
    pub fn quantile(&self, u: f64) -> u64 {
        self.quantile_table().quantile(u)
    }
}

/// Cumulative probabilities indexed by count
#[derive(Debug, Clone)]
pub struct QuantileTable {
    cdf: Vec<f64>,
}

impl QuantileTable {
    /// Smallest k with CDF(k) >= u
    pub fn quantile(&self, u: f64) -> u64 {
        self.cdf.partition_point(|&c| c < u) as u64
    }

    /// Probability mass at k, zero past the table
    pub fn mass(&self, k: usize) -> f64 {
        match k {
            0 => self.cdf.first().copied().unwrap_or(0.0),
            _ if k < self.cdf.len() => (self.cdf[k] - self.cdf[k - 1]).max(0.0),
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.cdf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cdf.is_empty()
    }
}

/// Single-side tail probability with the model that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailProbability {
    pub probability: f64,
    pub kind: DistributionKind,
}

/// Prices single and combined count markets
#[derive(Debug, Clone, Default)]
pub struct DistributionEngine {
    config: DistributionConfig,
}

impl DistributionEngine {
    pub fn new(config: DistributionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    pub fn single_tail(
        &self,
        lambda: f64,
        cv: f64,
        line: f64,
        direction: Direction,
    ) -> Result<TailProbability> {
        let model = CountModel::select(lambda, cv)?;
        let probability = model.tail(line, direction);
        debug!(
            lambda,
            cv,
            line,
            model = model.kind().label(),
            probability,
            "single-side tail"
        );
        Ok(TailProbability {
            probability,
            kind: model.kind(),
        })
    }

    /// Correlated home + away total, estimated by simulation
    pub fn joint_tail(
        &self,
        home: (f64, f64),
        away: (f64, f64),
        rho: f64,
        line: f64,
    ) -> Result<JointTail> {
        let home_model = CountModel::select(home.0, home.1)?;
        let away_model = CountModel::select(away.0, away.1)?;
        simulate_total(&home_model, &away_model, rho, line, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equidispersed_input_selects_poisson() {
        assert_eq!(CountModel::select(2.0, 0.0).expect("model").kind(), DistributionKind::Poisson);
        // σ² = (0.5·2)² = 1 < 2
        assert_eq!(CountModel::select(2.0, 0.5).expect("model").kind(), DistributionKind::Poisson);
        // σ² = λ exactly stays light-tailed
        let cv = (1.0f64 / 4.0).sqrt();
        assert_eq!(CountModel::select(4.0, cv).expect("model").kind(), DistributionKind::Poisson);
    }

    #[test]
    fn overdispersed_input_selects_negative_binomial() {
        // σ² = (0.9·5)² = 20.25 > 5
        let model = CountModel::select(5.0, 0.9).expect("model");
        assert_eq!(model.kind(), DistributionKind::NegativeBinomial);
        if let CountModel::NegativeBinomial { shape, p, .. } = model {
            assert!((p - 5.0 / 20.25).abs() < 1e-12);
            assert!((shape - 25.0 / 15.25).abs() < 1e-12);
        }
    }

    #[test]
    fn negative_binomial_matches_requested_mean() {
        let model = CountModel::select(3.5, 0.8).expect("model");
        let table = model.quantile_table();
        let mean: f64 = (0..table.len()).map(|k| k as f64 * table.mass(k)).sum();
        assert!((mean - 3.5).abs() < 1e-3, "mean {mean}");
    }

    #[test]
    fn over_and_under_are_complementary() {
        for (lambda, cv) in [(1.3, 0.0), (2.7, 0.4), (4.0, 0.9), (10.5, 0.6)] {
            let model = CountModel::select(lambda, cv).expect("model");
            for line in [0.5, 1.5, 2.5, 3.0, 9.5] {
                let over = model.tail(line, Direction::Over);
                let under = model.tail(line, Direction::Under);
                assert!((over + under - 1.0).abs() < 1e-9);
                assert!((0.0..=1.0).contains(&over));
            }
        }
    }

    #[test]
    fn quantile_inverts_cdf() {
        let model = CountModel::select(2.0, 0.0).expect("model");
        let table = model.quantile_table();
        assert_eq!(table.quantile(0.0), 0);
        // P(X=0) = e^-2 ~ 0.135
        assert_eq!(table.quantile(0.10), 0);
        assert_eq!(table.quantile(0.20), 1);
        assert_eq!(table.quantile(model.cdf(3) - 1e-9), 3);
        assert_eq!(model.quantile(0.20), 1);
    }

    #[test]
    fn rejects_non_positive_lambda() {
        assert!(CountModel::select(0.0, 0.3).is_err());
        assert!(CountModel::select(-1.0, 0.3).is_err());
    }

    #[test]
    fn engine_reports_model_kind() {
        let engine = DistributionEngine::default();
        let tail = engine
            .single_tail(2.0, 1.0, 2.5, Direction::Over)
            .expect("tail");
        assert_eq!(tail.kind, DistributionKind::NegativeBinomial);
    }
}
