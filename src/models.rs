use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Count events the engine knows how to price
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goals,
    Shots,
    ShotsOnTarget,
    Corners,
    Cards,
    Fouls,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Goals,
        EventKind::Shots,
        EventKind::ShotsOnTarget,
        EventKind::Corners,
        EventKind::Cards,
        EventKind::Fouls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Goals => "goals",
            EventKind::Shots => "shots",
            EventKind::ShotsOnTarget => "shots_on_target",
            EventKind::Corners => "corners",
            EventKind::Cards => "cards",
            EventKind::Fouls => "fouls",
        }
    }

    /// Events whose lambda is corrected by the teams' finishing efficiency
    pub fn uses_finishing_factor(&self) -> bool {
        matches!(self, EventKind::Goals | EventKind::ShotsOnTarget)
    }

    /// Events whose lambda is corrected by the referee's history
    pub fn uses_referee_factor(&self) -> bool {
        matches!(self, EventKind::Cards | EventKind::Fouls)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "goals" => Ok(EventKind::Goals),
            "shots" => Ok(EventKind::Shots),
            "shots_on_target" | "sot" => Ok(EventKind::ShotsOnTarget),
            "corners" => Ok(EventKind::Corners),
            "cards" => Ok(EventKind::Cards),
            "fouls" => Ok(EventKind::Fouls),
            _ => Err(EngineError::UnknownEvent(s.to_string())),
        }
    }
}

/// Which count a line is quoted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Home + away total
    Combined,
    Home,
    Away,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Combined => "combined",
            MarketKind::Home => "home",
            MarketKind::Away => "away",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" | "total" | "match_total" => Ok(MarketKind::Combined),
            "home" | "local" => Ok(MarketKind::Home),
            "away" | "visitor" => Ok(MarketKind::Away),
            _ => Err(EngineError::UnknownMarket(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Over,
    Under,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Over => "over",
            Direction::Under => "under",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "over" => Ok(Direction::Over),
            "under" => Ok(Direction::Under),
            _ => Err(EngineError::UnknownDirection(s.to_string())),
        }
    }
}

/// Production applies the risk gate and the z floor; lab only evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Production,
    Lab,
}

impl OperatingMode {
    pub fn is_production(&self) -> bool {
        matches!(self, OperatingMode::Production)
    }
}

impl FromStr for OperatingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(OperatingMode::Production),
            "lab" => Ok(OperatingMode::Lab),
            _ => Err(EngineError::InvalidInput(format!("unknown mode: {s}"))),
        }
    }
}

/// Venue filter applied when extracting a team's observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Global,
    HomeOnly,
    AwayOnly,
}

/// Global compares whole-season form; specific compares home team at home
/// against away team away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Global,
    Specific,
}

impl AnalysisMode {
    pub fn filters(&self) -> (FilterMode, FilterMode) {
        match self {
            AnalysisMode::Global => (FilterMode::Global, FilterMode::Global),
            AnalysisMode::Specific => (FilterMode::HomeOnly, FilterMode::AwayOnly),
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub database_path: String,
    pub config_path: String,
    pub mode: OperatingMode,
}

impl AppSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("LINEEDGE_DB_PATH").unwrap_or_else(|_| "./lineedge.db".to_string());

        let config_path = std::env::var("LINEEDGE_CONFIG_PATH")
            .unwrap_or_else(|_| "lineedge.toml".to_string());

        let mode = std::env::var("LINEEDGE_MODE")
            .ok()
            .map(|m| m.parse::<OperatingMode>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            database_path,
            config_path,
            mode,
        })
    }
}
