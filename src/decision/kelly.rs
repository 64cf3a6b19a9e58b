//! Fractional Kelly staking
//!
//! `kelly_raw = edge / (odds − 1)`, scaled by the configured fraction and the
//! risk-state multiplier, then clamped to `[0, cap]`.

use serde::{Deserialize, Serialize};

/// Kelly calculation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyParams {
    pub bankroll: f64,
    /// Fractional Kelly multiplier (0.5 = half Kelly)
    pub kelly_fraction: f64,
    /// Hard cap on the bankroll fraction
    pub cap: f64,
    /// Risk-state multiplier (1.0 normal, 0.5 recovery)
    pub multiplier: f64,
    /// Currency value of one unit
    pub unit_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KellyStake {
    pub kelly_raw: f64,
    /// Fraction of bankroll actually staked
    pub fraction: f64,
    pub stake: f64,
    pub units: f64,
    pub capped: bool,
}

pub fn fractional_kelly(edge: f64, odds: f64, params: &KellyParams) -> KellyStake {
    if odds <= 1.0 || !edge.is_finite() || edge <= 0.0 {
        return KellyStake::default();
    }

    let kelly_raw = edge / (odds - 1.0);
    let scaled = kelly_raw * params.kelly_fraction * params.multiplier.max(0.0);
    let capped = scaled > params.cap;
    let fraction = scaled.clamp(0.0, params.cap.max(0.0));

    let stake = params.bankroll.max(0.0) * fraction;
    let units = if params.unit_value > 0.0 {
        stake / params.unit_value
    } else {
        0.0
    };

    KellyStake {
        kelly_raw,
        fraction,
        stake,
        units,
        capped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> KellyParams {
        KellyParams {
            bankroll: 20_000.0,
            kelly_fraction: 0.5,
            cap: 0.05,
            multiplier: 1.0,
            unit_value: 200.0,
        }
    }

    #[test]
    fn half_kelly_below_cap() {
        let stake = fractional_kelly(0.045, 1.9, &params());
        assert!((stake.kelly_raw - 0.05).abs() < 1e-12);
        assert!((stake.fraction - 0.025).abs() < 1e-12);
        assert!((stake.stake - 500.0).abs() < 1e-9);
        assert!((stake.units - 2.5).abs() < 1e-9);
        assert!(!stake.capped);
    }

    #[test]
    fn huge_edge_is_capped() {
        let stake = fractional_kelly(0.6, 1.5, &params());
        assert!(stake.capped);
        assert_eq!(stake.fraction, 0.05);
        assert!((stake.stake - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn recovery_multiplier_halves_stake() {
        let normal = fractional_kelly(0.045, 1.9, &params());
        let recovery = fractional_kelly(
            0.045,
            1.9,
            &KellyParams {
                multiplier: 0.5,
                ..params()
            },
        );
        assert!((recovery.fraction - normal.fraction / 2.0).abs() < 1e-12);
    }

    #[test]
    fn no_stake_without_edge_or_payout() {
        assert_eq!(fractional_kelly(-0.02, 1.9, &params()).stake, 0.0);
        assert_eq!(fractional_kelly(0.1, 1.0, &params()).stake, 0.0);
    }
}
