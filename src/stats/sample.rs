//! Time-weighted descriptive statistics for one observation series
//!
//! Input is ordered most-recent first. Output is a `SampleStatistics` record
//! that is either valid (usable mean and dispersion) or an invalid sentinel
//! with every numeric field zeroed.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::{EngineConfig, SampleConfig};
use crate::error::{EngineError, Result};
use crate::models::EventKind;

/// Diagnostic flags attached to a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticFlag {
    /// Fewer observations than the minimum sample size
    #[serde(rename = "MUESTRA_INSUFICIENTE")]
    InsufficientSample,
    #[serde(rename = "MEDIA_INVALIDA")]
    InvalidMean,
    #[serde(rename = "CV_ALTO")]
    HighCv,
    #[serde(rename = "CV_MUY_ALTO")]
    VeryHighCv,
    #[serde(rename = "OUTLIERS_DETECTADOS")]
    OutliersDetected,
}

impl DiagnosticFlag {
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticFlag::InsufficientSample => "MUESTRA_INSUFICIENTE",
            DiagnosticFlag::InvalidMean => "MEDIA_INVALIDA",
            DiagnosticFlag::HighCv => "CV_ALTO",
            DiagnosticFlag::VeryHighCv => "CV_MUY_ALTO",
            DiagnosticFlag::OutliersDetected => "OUTLIERS_DETECTADOS",
        }
    }
}

/// Human-facing stability classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatisticalState {
    #[serde(rename = "ESTABLE")]
    Stable,
    #[serde(rename = "VOLÁTIL")]
    Volatile,
    #[serde(rename = "INCIERTO")]
    Uncertain,
}

impl StatisticalState {
    pub fn label(&self) -> &'static str {
        match self {
            StatisticalState::Stable => "ESTABLE",
            StatisticalState::Volatile => "VOLÁTIL",
            StatisticalState::Uncertain => "INCIERTO",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleStatistics {
    pub valid: bool,
    pub event: EventKind,
    /// Observations supplied, outliers included
    pub n: usize,
    pub mean: f64,
    pub variance: f64,
    pub std: f64,
    pub cv: f64,
    pub cv_normalized: f64,
    pub median: f64,
    pub mode: f64,
    pub range: f64,
    /// Distinct values excluded by the IQR screen, ascending
    pub outliers: Vec<f64>,
    pub flags: Vec<DiagnosticFlag>,
    pub state: StatisticalState,
}

impl SampleStatistics {
    /// Extract with the event's expected CV and time decay enabled
    pub fn extract(observations: &[f64], event: EventKind, config: &EngineConfig) -> Result<Self> {
        Self::compute(
            observations,
            event,
            config.event(event).expected_cv,
            true,
            &config.sample,
        )
    }

    /// Compute the record. Negative or non-finite observations are an error;
    /// a short series or a non-positive mean yields an invalid record.
    pub fn compute(
        observations: &[f64],
        event: EventKind,
        expected_cv: f64,
        time_decay: bool,
        cfg: &SampleConfig,
    ) -> Result<Self> {
        for (index, &value) in observations.iter().enumerate() {
            if !value.is_finite() {
                return Err(EngineError::NonFiniteObservation { index });
            }
            if value < 0.0 {
                return Err(EngineError::NegativeObservation { index, value });
            }
        }

        let n = observations.len();
        if n < cfg.min_sample {
            return Ok(Self::invalid(
                event,
                n,
                vec![DiagnosticFlag::InsufficientSample],
            ));
        }

        let (retained, outliers) = screen_outliers(observations, cfg);

        let (mean, variance) = if time_decay {
            weighted_moments(&retained, cfg.decay_alpha)
        } else {
            let mean = retained.iter().mean();
            let variance = if retained.len() > 1 {
                retained.iter().variance()
            } else {
                0.0
            };
            (mean, variance)
        };

        if mean <= 0.0 || !mean.is_finite() {
            return Ok(Self::invalid(event, n, vec![DiagnosticFlag::InvalidMean]));
        }

        let variance = variance.max(0.0);
        let std = variance.sqrt();
        let cv = std / mean;
        let cv_normalized = if expected_cv > 0.0 {
            cv / expected_cv
        } else {
            0.0
        };

        let mut flags = Vec::new();
        let state = if cv_normalized >= cfg.cv_very_high {
            flags.push(DiagnosticFlag::VeryHighCv);
            StatisticalState::Uncertain
        } else if cv_normalized >= cfg.cv_high {
            flags.push(DiagnosticFlag::HighCv);
            StatisticalState::Volatile
        } else {
            StatisticalState::Stable
        };
        if !outliers.is_empty() {
            flags.push(DiagnosticFlag::OutliersDetected);
        }

        let (lo, hi) = retained
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        Ok(Self {
            valid: true,
            event,
            n,
            mean,
            variance,
            std,
            cv,
            cv_normalized,
            median: median(&retained),
            mode: mode(&retained),
            range: hi - lo,
            outliers,
            flags,
            state,
        })
    }

    fn invalid(event: EventKind, n: usize, flags: Vec<DiagnosticFlag>) -> Self {
        Self {
            valid: false,
            event,
            n,
            mean: 0.0,
            variance: 0.0,
            std: 0.0,
            cv: 0.0,
            cv_normalized: 0.0,
            median: 0.0,
            mode: 0.0,
            range: 0.0,
            outliers: Vec::new(),
            flags,
            state: StatisticalState::Uncertain,
        }
    }

    /// Expected count for this series. Zero when invalid.
    pub fn lambda(&self) -> f64 {
        self.mean
    }

    pub fn has_flag(&self, flag: DiagnosticFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Positional quartiles over the sorted values, fences at `f·IQR`.
/// Returns (retained in input order, distinct outliers ascending).
fn screen_outliers(values: &[f64], cfg: &SampleConfig) -> (Vec<f64>, Vec<f64>) {
    if values.len() < cfg.min_outlier_len {
        return (values.to_vec(), Vec::new());
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[(3 * n) / 4];
    let iqr = q3 - q1;
    let lower = q1 - cfg.iqr_factor * iqr;
    let upper = q3 + cfg.iqr_factor * iqr;

    let mut outliers: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| *v < lower || *v > upper)
        .collect();
    outliers.dedup();

    if outliers.is_empty() {
        return (values.to_vec(), outliers);
    }

    let retained: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| *v >= lower && *v <= upper)
        .collect();

    if retained.is_empty() {
        (values.to_vec(), outliers)
    } else {
        (retained, outliers)
    }
}

/// Weights `exp(-α·i)` normalized to 1; population-style variance.
fn weighted_moments(values: &[f64], alpha: f64) -> (f64, f64) {
    let weights: Vec<f64> = (0..values.len())
        .map(|i| (-alpha * i as f64).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }

    let mean = values
        .iter()
        .zip(&weights)
        .map(|(v, w)| v * w / total)
        .sum::<f64>();
    let variance = values
        .iter()
        .zip(&weights)
        .map(|(v, w)| w / total * (v - mean).powi(2))
        .sum::<f64>();
    (mean, variance)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Most frequent value, ties go to the first one seen
fn mode(values: &[f64]) -> f64 {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, count)) => *count += 1,
            None => counts.push((v, 1)),
        }
    }
    let mut best: Option<(f64, usize)> = None;
    for (v, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((v, count));
        }
    }
    best.map(|(v, _)| v).unwrap_or(0.0)
}
