//! Exact score-matrix computations for independent counts

use serde::{Deserialize, Serialize};
use statrs::distribution::{Discrete, Poisson};

use super::CountModel;
use crate::error::Result;
use crate::models::Direction;

/// Convolution of two independent count models against a line.
/// Strict inequalities, matching the simulator: an exact hit is neither side.
pub fn exact_total_probability(
    home: &CountModel,
    away: &CountModel,
    line: f64,
    direction: Direction,
) -> f64 {
    let home_table = home.quantile_table();
    let away_table = away.quantile_table();

    let mut p = 0.0;
    for i in 0..home_table.len() {
        let ph = home_table.mass(i);
        if ph == 0.0 {
            continue;
        }
        for j in 0..away_table.len() {
            let total = (i + j) as f64;
            let hit = match direction {
                Direction::Over => total > line,
                Direction::Under => total < line,
            };
            if hit {
                p += ph * away_table.mass(j);
            }
        }
    }
    p.clamp(0.0, 1.0)
}

/// Home win / draw / away win from an independent Poisson score matrix
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchOutcomeProbabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl MatchOutcomeProbabilities {
    /// `p·odds − 1` for each quoted outcome; None where odds are not above 1
    pub fn edges(&self, odds: (f64, f64, f64)) -> (Option<f64>, Option<f64>, Option<f64>) {
        let edge = |p: f64, o: f64| if o > 1.0 { Some(p * o - 1.0) } else { None };
        (
            edge(self.home, odds.0),
            edge(self.draw, odds.1),
            edge(self.away, odds.2),
        )
    }
}

/// Scores 0..=max_goals per side, renormalized over the truncated matrix
pub fn match_outcome_probabilities(
    lambda_home: f64,
    lambda_away: f64,
    max_goals: u32,
) -> Result<MatchOutcomeProbabilities> {
    let home = Poisson::new(lambda_home)?;
    let away = Poisson::new(lambda_away)?;

    let home_pmf: Vec<f64> = (0..=max_goals as u64).map(|k| home.pmf(k)).collect();
    let away_pmf: Vec<f64> = (0..=max_goals as u64).map(|k| away.pmf(k)).collect();

    let (mut h, mut d, mut a) = (0.0, 0.0, 0.0);
    for (i, ph) in home_pmf.iter().enumerate() {
        for (j, pa) in away_pmf.iter().enumerate() {
            let cell = ph * pa;
            match i.cmp(&j) {
                std::cmp::Ordering::Greater => h += cell,
                std::cmp::Ordering::Equal => d += cell,
                std::cmp::Ordering::Less => a += cell,
            }
        }
    }

    let total = h + d + a;
    if total <= 0.0 {
        return Ok(MatchOutcomeProbabilities {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        });
    }

    Ok(MatchOutcomeProbabilities {
        home: h / total,
        draw: d / total,
        away: a / total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisson_sum_matches_closed_form() {
        // Poisson(1) + Poisson(1.5) = Poisson(2.5)
        let home = CountModel::select(1.0, 0.0).expect("model");
        let away = CountModel::select(1.5, 0.0).expect("model");
        let sum = CountModel::select(2.5, 0.0).expect("model");
        let exact = exact_total_probability(&home, &away, 2.5, Direction::Over);
        assert!((exact - sum.tail(2.5, Direction::Over)).abs() < 1e-9);
    }

    #[test]
    fn outcome_probabilities_sum_to_one() {
        let probs = match_outcome_probabilities(1.8, 1.1, 10).expect("matrix");
        assert!((probs.home + probs.draw + probs.away - 1.0).abs() < 1e-12);
        assert!(probs.home > probs.away);
    }

    #[test]
    fn symmetric_lambdas_give_symmetric_outcomes() {
        let probs = match_outcome_probabilities(1.3, 1.3, 10).expect("matrix");
        assert!((probs.home - probs.away).abs() < 1e-12);
    }

    #[test]
    fn edges_skip_invalid_odds() {
        let probs = MatchOutcomeProbabilities {
            home: 0.5,
            draw: 0.3,
            away: 0.2,
        };
        let (h, d, a) = probs.edges((2.2, 1.0, 6.0));
        assert!((h.expect("home edge") - 0.1).abs() < 1e-12);
        assert!(d.is_none());
        assert!((a.expect("away edge") - 0.2).abs() < 1e-12);
    }
}
