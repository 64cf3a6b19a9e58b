//! Observation and league-parameter sources
//!
//! The pipeline only sees the two traits below. `SeasonData` serves them
//! from a current-season dataset, optionally blended with the prior season.

pub mod dataset;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::config::ObservationConfig;
use crate::models::{EventKind, FilterMode};

pub use dataset::{
    EventCount, LeagueParameters, MatchDataset, MatchRecord, RefereeRecord, TeamSeries,
};

/// One team's observation series for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamObservations {
    pub team: String,
    pub event: EventKind,
    pub filter: FilterMode,
    /// Most recent first
    pub scored: Vec<f64>,
    pub conceded: Vec<f64>,
    pub schedule_strength: f64,
    pub prior_blended: bool,
}

pub trait ObservationSource: Send + Sync {
    fn observations(&self, team: &str, event: EventKind, filter: FilterMode) -> Result<TeamObservations>;
}

pub trait LeagueParameterSource: Send + Sync {
    fn league_parameters(&self, event: EventKind) -> Result<LeagueParameters>;

    /// `team = None` asks for the league-wide ratio
    fn finishing_ratio(&self, team: Option<&str>, event: EventKind) -> Option<f64>;

    fn referee_record(&self, referee: &str, event: EventKind) -> Option<RefereeRecord>;
}

/// Current season plus an optional prior season
#[derive(Debug, Clone)]
pub struct SeasonData {
    current: MatchDataset,
    prior: Option<MatchDataset>,
    config: ObservationConfig,
}

impl SeasonData {
    pub fn new(current: MatchDataset, config: ObservationConfig) -> Self {
        Self {
            current,
            prior: None,
            config,
        }
    }

    pub fn with_prior(mut self, prior: MatchDataset) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn current(&self) -> &MatchDataset {
        &self.current
    }

    /// Prior-season series to append, or None when the prior is absent, too
    /// short, or shows a regime change against the current season.
    fn prior_series(&self, team: &str, event: EventKind, filter: FilterMode, current: &TeamSeries) -> Option<TeamSeries> {
        let prior = self.prior.as_ref()?;
        let series = prior.team_series(team, event, filter, usize::MAX);
        if series.len() < self.config.prior_min || current.is_empty() {
            return None;
        }

        let mean_current = current.scored.iter().mean();
        let mean_prior = series.scored.iter().mean();
        let delta = if mean_prior > 0.0 {
            (mean_current - mean_prior).abs() / mean_prior
        } else {
            1.0
        };
        if delta > self.config.regime_change {
            info!(
                team,
                event = %event,
                delta,
                "prior season ignored: regime change"
            );
            return None;
        }

        let take = self.config.prior_lookback.min(series.len());
        Some(TeamSeries {
            scored: series.scored[..take].to_vec(),
            conceded: series.conceded[..take].to_vec(),
            opponents: series.opponents[..take].to_vec(),
        })
    }
}

impl ObservationSource for SeasonData {
    fn observations(&self, team: &str, event: EventKind, filter: FilterMode) -> Result<TeamObservations> {
        let cap = self.config.max_history;
        let params = self.current.league_parameters(event);
        let mut series = self.current.team_series(team, event, filter, cap);
        let schedule_strength = self
            .current
            .schedule_strength(&series.opponents, &params, &self.config);

        let mut prior_blended = false;
        if let Some(prior) = self.prior_series(team, event, filter, &series) {
            series.scored.extend(prior.scored);
            series.conceded.extend(prior.conceded);
            series.scored.truncate(cap);
            series.conceded.truncate(cap);
            prior_blended = true;
        }

        debug!(
            team,
            event = %event,
            n = series.scored.len(),
            schedule_strength,
            prior_blended,
            "observations extracted"
        );

        Ok(TeamObservations {
            team: team.to_string(),
            event,
            filter,
            scored: series.scored,
            conceded: series.conceded,
            schedule_strength,
            prior_blended,
        })
    }
}

impl LeagueParameterSource for SeasonData {
    fn league_parameters(&self, event: EventKind) -> Result<LeagueParameters> {
        Ok(self.current.league_parameters(event))
    }

    fn finishing_ratio(&self, team: Option<&str>, event: EventKind) -> Option<f64> {
        self.current.finishing_ratio(team, event)
    }

    fn referee_record(&self, referee: &str, event: EventKind) -> Option<RefereeRecord> {
        self.current.referee_record(referee, event)
    }
}

#[cfg(test)]
mod tests {
    use super::dataset::tests::fixture;
    use super::*;

    fn season(goals_for_a: &[f64]) -> MatchDataset {
        MatchDataset::new(
            goals_for_a
                .iter()
                .enumerate()
                .map(|(day, &g)| fixture(day as u32, "A", "B", (g, 1.0)))
                .collect(),
        )
    }

    #[test]
    fn similar_prior_season_is_appended() {
        let data = SeasonData::new(season(&[2.0; 6]), ObservationConfig::default())
            .with_prior(season(&[1.8; 12]));
        let obs = data
            .observations("A", EventKind::Goals, FilterMode::Global)
            .expect("observations");
        assert!(obs.prior_blended);
        assert_eq!(obs.scored.len(), 16);
        assert_eq!(obs.scored[0], 2.0);
        assert_eq!(obs.scored[15], 1.8);
    }

    #[test]
    fn regime_change_ignores_prior() {
        let data = SeasonData::new(season(&[2.0; 6]), ObservationConfig::default())
            .with_prior(season(&[1.0; 12]));
        let obs = data
            .observations("A", EventKind::Goals, FilterMode::Global)
            .expect("observations");
        assert!(!obs.prior_blended);
        assert_eq!(obs.scored.len(), 6);
    }

    #[test]
    fn short_prior_is_ignored() {
        let data = SeasonData::new(season(&[2.0; 6]), ObservationConfig::default())
            .with_prior(season(&[2.0; 4]));
        let obs = data
            .observations("A", EventKind::Goals, FilterMode::Global)
            .expect("observations");
        assert!(!obs.prior_blended);
    }

    #[test]
    fn history_is_capped() {
        let data = SeasonData::new(season(&[1.0; 45]), ObservationConfig::default())
            .with_prior(season(&[1.0; 12]));
        let obs = data
            .observations("A", EventKind::Goals, FilterMode::Global)
            .expect("observations");
        assert_eq!(obs.scored.len(), 40);
        assert_eq!(obs.conceded.len(), 40);
    }
}
