//! Per-match count dataset and the league parameters derived from it

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use crate::config::ObservationConfig;
use crate::models::{EventKind, FilterMode};

/// League mean match total used when a dataset has no usable rows
pub const EMPTY_LEAGUE_TOTAL: f64 = 2.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventCount {
    pub home: f64,
    pub away: f64,
}

impl EventCount {
    pub fn total(&self) -> f64 {
        self.home + self.away
    }
}

/// One played match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub referee: Option<String>,
    pub counts: BTreeMap<EventKind, EventCount>,
}

impl MatchRecord {
    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    /// `(scored, conceded, opponent)` from `team`'s side, if it played and the event was recorded
    fn side(&self, team: &str, event: EventKind, filter: FilterMode) -> Option<(f64, f64, &str)> {
        let count = self.counts.get(&event)?;
        if self.home_team == team && filter != FilterMode::AwayOnly {
            Some((count.home, count.away, self.away_team.as_str()))
        } else if self.away_team == team && filter != FilterMode::HomeOnly {
            Some((count.away, count.home, self.home_team.as_str()))
        } else {
            None
        }
    }
}

/// League-wide baselines for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueParameters {
    pub event: EventKind,
    /// Matches that recorded the event
    pub matches: usize,
    pub mean_total: f64,
    pub mean_per_team: f64,
    pub league_avg_conceded: f64,
    /// Pearson correlation of home vs away counts; 0 when undefined
    pub rho: f64,
    /// Team -> conceded per match
    pub defensive_strength: HashMap<String, f64>,
}

impl LeagueParameters {
    fn empty(event: EventKind) -> Self {
        Self {
            event,
            matches: 0,
            mean_total: EMPTY_LEAGUE_TOTAL,
            mean_per_team: EMPTY_LEAGUE_TOTAL / 2.0,
            league_avg_conceded: EMPTY_LEAGUE_TOTAL / 2.0,
            rho: 0.0,
            defensive_strength: HashMap::new(),
        }
    }

    /// The builder's league mean, or None when nothing was observed
    pub fn league_total(&self) -> Option<f64> {
        (self.matches > 0 && self.mean_total > 0.0).then_some(self.mean_total)
    }
}

/// A team's scored/conceded series, most recent first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamSeries {
    pub scored: Vec<f64>,
    pub conceded: Vec<f64>,
    /// Rivals met, most recent first
    pub opponents: Vec<String>,
}

impl TeamSeries {
    pub fn len(&self) -> usize {
        self.scored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty()
    }
}

/// Referee history for one event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefereeRecord {
    /// Match total per refereed game
    pub average: f64,
    pub matches: usize,
}

/// Matches ordered by date (stable for equal dates)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchDataset {
    matches: Vec<MatchRecord>,
}

impl MatchDataset {
    pub fn new(mut matches: Vec<MatchRecord>) -> Self {
        matches.sort_by_key(|m| m.date);
        Self { matches }
    }

    /// Load a JSON array of match records
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        let matches: Vec<MatchRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
        debug!(path = %path.display(), matches = matches.len(), "dataset loaded");
        Ok(Self::new(matches))
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The first `count` matches in date order
    pub fn prefix(&self, count: usize) -> Self {
        Self {
            matches: self.matches[..count.min(self.matches.len())].to_vec(),
        }
    }

    /// Matches strictly before `date`
    pub fn before(&self, date: NaiveDate) -> Self {
        let end = self.matches.partition_point(|m| m.date < date);
        self.prefix(end)
    }

    pub fn league_parameters(&self, event: EventKind) -> LeagueParameters {
        let rows: Vec<(&MatchRecord, EventCount)> = self
            .matches
            .iter()
            .filter_map(|m| m.counts.get(&event).map(|c| (m, *c)))
            .collect();
        if rows.is_empty() {
            return LeagueParameters::empty(event);
        }

        let n = rows.len() as f64;
        let home: Vec<f64> = rows.iter().map(|(_, c)| c.home).collect();
        let away: Vec<f64> = rows.iter().map(|(_, c)| c.away).collect();
        let mean_total = (home.iter().sum::<f64>() + away.iter().sum::<f64>()) / n;
        let mean_per_team = mean_total / 2.0;

        let mut conceded: HashMap<String, (f64, usize)> = HashMap::new();
        for (m, c) in &rows {
            let h = conceded.entry(m.home_team.clone()).or_default();
            h.0 += c.away;
            h.1 += 1;
            let a = conceded.entry(m.away_team.clone()).or_default();
            a.0 += c.home;
            a.1 += 1;
        }
        let defensive_strength = conceded
            .into_iter()
            .map(|(team, (sum, played))| (team, sum / played as f64))
            .collect();

        LeagueParameters {
            event,
            matches: rows.len(),
            mean_total,
            mean_per_team,
            league_avg_conceded: mean_per_team,
            rho: pearson(&home, &away),
            defensive_strength,
        }
    }

    /// Scored and conceded counts for `team`, most recent first, capped at `max_len`
    pub fn team_series(&self, team: &str, event: EventKind, filter: FilterMode, max_len: usize) -> TeamSeries {
        let mut series = TeamSeries::default();
        for m in self.matches.iter().rev() {
            if series.len() >= max_len {
                break;
            }
            if let Some((scored, conceded, opponent)) = m.side(team, event, filter) {
                series.scored.push(scored);
                series.conceded.push(conceded);
                series.opponents.push(opponent.to_string());
            }
        }
        series
    }

    /// Mean over past rivals of `league_avg_conceded / rival_conceded`. 1.0 with no rivals.
    pub fn schedule_strength(&self, opponents: &[String], params: &LeagueParameters, cfg: &ObservationConfig) -> f64 {
        if opponents.is_empty() {
            return 1.0;
        }
        let league_avg = params.league_avg_conceded.max(cfg.rival_floor);
        let ratios: Vec<f64> = opponents
            .iter()
            .map(|rival| {
                let conceded = params
                    .defensive_strength
                    .get(rival)
                    .copied()
                    .unwrap_or(league_avg);
                league_avg / conceded.max(cfg.rival_floor)
            })
            .collect();
        ratios.iter().mean()
    }

    /// Finishing ratio for the event (goals per shot, or shots on target per shot).
    /// League-wide with `team = None`. None when the event has no finishing ratio
    /// or no shots were recorded.
    pub fn finishing_ratio(&self, team: Option<&str>, event: EventKind) -> Option<f64> {
        if !event.uses_finishing_factor() {
            return None;
        }
        let (mut numerator, mut shots) = (0.0, 0.0);
        for m in &self.matches {
            let (Some(num), Some(den)) = (m.counts.get(&event), m.counts.get(&EventKind::Shots)) else {
                continue;
            };
            match team {
                None => {
                    numerator += num.total();
                    shots += den.total();
                }
                Some(t) if m.home_team == t => {
                    numerator += num.home;
                    shots += den.home;
                }
                Some(t) if m.away_team == t => {
                    numerator += num.away;
                    shots += den.away;
                }
                Some(_) => {}
            }
        }
        (shots > 0.0).then(|| numerator / shots)
    }

    pub fn referee_record(&self, referee: &str, event: EventKind) -> Option<RefereeRecord> {
        let totals: Vec<f64> = self
            .matches
            .iter()
            .filter(|m| m.referee.as_deref() == Some(referee))
            .filter_map(|m| m.counts.get(&event).map(EventCount::total))
            .collect();
        if totals.is_empty() {
            return None;
        }
        Some(RefereeRecord {
            average: totals.iter().mean(),
            matches: totals.len(),
        })
    }
}

/// Pearson correlation, 0 when undefined
fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || x.len() != y.len() {
        return 0.0;
    }
    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    if !(sx > 0.0 && sy > 0.0) {
        return 0.0;
    }
    let rho = x.iter().covariance(y.iter()) / (sx * sy);
    if rho.is_finite() {
        rho.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
