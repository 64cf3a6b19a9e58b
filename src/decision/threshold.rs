//! Dynamic acceptance threshold
//!
//! `threshold = max(min_edge, z·SE + m)` with three sample-size regimes:
//! below `n_dynamic` the SE term is dropped, in `[n_dynamic, projection_n)` the
//! SE is projected to `projection_n` (multiplied by `sqrt(n / projection_n)`),
//! and above that the raw SE is used.

use serde::{Deserialize, Serialize};

use crate::config::{DecisionConfig, EventConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBasis {
    /// Event opts out of the dynamic threshold
    MinEdgeOnly,
    /// n too small for an SE term
    Fixed,
    /// SE projected to the reference sample size
    Projected,
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    /// Final acceptance threshold, never below the event's min edge
    pub value: f64,
    /// SE actually used (after projection)
    pub se: f64,
    pub z: f64,
    pub basis: ThresholdBasis,
    pub reason: String,
}

/// Raw binomial SE of a probability estimate, 0 when n = 0
pub fn standard_error(p: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    (p * (1.0 - p) / n as f64).sqrt()
}

pub fn acceptance_threshold(
    p_model: f64,
    n: usize,
    z: f64,
    event: &EventConfig,
    cfg: &DecisionConfig,
) -> Threshold {
    if !event.uses_threshold {
        return Threshold {
            value: event.min_edge,
            se: 0.0,
            z,
            basis: ThresholdBasis::MinEdgeOnly,
            reason: format!("MIN_EDGE ({:.3})", event.min_edge),
        };
    }

    let raw_se = standard_error(p_model, n);
    let (dynamic, se, basis, reason) = if n < cfg.n_dynamic {
        (
            cfg.m_fixed,
            0.0,
            ThresholdBasis::Fixed,
            format!("FIXED (n={}, m={:.2})", n, cfg.m_fixed),
        )
    } else if n < cfg.projection_n {
        let se = raw_se * (n as f64 / cfg.projection_n as f64).sqrt();
        (
            z * se + cfg.m_fixed,
            se,
            ThresholdBasis::Projected,
            format!(
                "PROJECTED_N{} (z={:.2}*SE + m={:.2})",
                cfg.projection_n, z, cfg.m_fixed
            ),
        )
    } else {
        (
            z * raw_se + cfg.m_fixed,
            raw_se,
            ThresholdBasis::Dynamic,
            format!("DYNAMIC (z={:.2}*SE + m={:.2})", z, cfg.m_fixed),
        )
    };

    Threshold {
        value: dynamic.max(event.min_edge),
        se,
        z,
        basis,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventTable;

    #[test]
    fn small_samples_use_fixed_margin() {
        let events = EventTable::default();
        let cfg = DecisionConfig::default();
        let t = acceptance_threshold(0.6, 7, 1.0, &events.goals, &cfg);
        assert_eq!(t.basis, ThresholdBasis::Fixed);
        assert_eq!(t.se, 0.0);
        assert!((t.value - 0.10).abs() < 1e-12);
        assert!(t.reason.starts_with("FIXED"));
    }

    #[test]
    fn mid_samples_project_se_down() {
        let events = EventTable::default();
        let cfg = DecisionConfig::default();
        let n = 20;
        let t = acceptance_threshold(0.6, n, 1.0, &events.goals, &cfg);
        let raw = standard_error(0.6, n);
        assert_eq!(t.basis, ThresholdBasis::Projected);
        assert!((t.se - raw * (20.0f64 / 30.0).sqrt()).abs() < 1e-12);
        assert!(t.se < raw);
        assert!((t.value - (t.se + 0.10)).abs() < 1e-12);
    }

    #[test]
    fn large_samples_use_raw_se() {
        let events = EventTable::default();
        let cfg = DecisionConfig::default();
        let t = acceptance_threshold(0.55, 50, 0.7, &events.corners, &cfg);
        assert_eq!(t.basis, ThresholdBasis::Dynamic);
        assert!((t.value - (0.7 * standard_error(0.55, 50) + 0.10)).abs() < 1e-12);
    }

    #[test]
    fn threshold_never_below_min_edge() {
        let events = EventTable::default();
        let cfg = DecisionConfig {
            m_fixed: 0.0,
            ..DecisionConfig::default()
        };
        for event in [&events.goals, &events.shots, &events.corners, &events.cards] {
            for n in [0, 3, 9, 10, 15, 29, 30, 200, 10_000] {
                for p in [0.0, 0.01, 0.5, 0.99, 1.0] {
                    let t = acceptance_threshold(p, n, 0.6, event, &cfg);
                    assert!(t.value >= event.min_edge);
                }
            }
        }
    }

    #[test]
    fn opted_out_event_uses_min_edge() {
        let mut events = EventTable::default();
        events.fouls.uses_threshold = false;
        let t = acceptance_threshold(0.6, 100, 0.7, &events.fouls, &DecisionConfig::default());
        assert_eq!(t.basis, ThresholdBasis::MinEdgeOnly);
        assert_eq!(t.value, events.fouls.min_edge);
    }
}
