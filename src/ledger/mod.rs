//! Outcome, bankroll and audit ledgers
//!
//! All three are append-only. Readers take a full snapshot per evaluation;
//! implementations serialize appends behind a single writer lock.

pub mod memory;
pub mod sqlite;
pub mod tracker;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::DecisionAuditRecord;
use crate::models::{Direction, EventKind, MarketKind};
use crate::risk::RejectionRecord;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use tracker::{PickTicket, Tracker};

/// Settled outcome of a pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickResult {
    Win,
    Loss,
    Push,
}

impl PickResult {
    /// +1 / -1 / 0
    pub fn as_i8(&self) -> i8 {
        match self {
            PickResult::Win => 1,
            PickResult::Loss => -1,
            PickResult::Push => 0,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(PickResult::Win),
            -1 => Some(PickResult::Loss),
            0 => Some(PickResult::Push),
            _ => None,
        }
    }

    pub fn profit(&self, stake: f64, odds: f64) -> f64 {
        match self {
            PickResult::Win => stake * (odds - 1.0),
            PickResult::Loss => -stake,
            PickResult::Push => 0.0,
        }
    }
}

impl std::str::FromStr for PickResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win" | "w" | "1" | "+1" => Ok(PickResult::Win),
            "loss" | "l" | "-1" => Ok(PickResult::Loss),
            "push" | "p" | "0" => Ok(PickResult::Push),
            other => anyhow::bail!("unknown result: {other}"),
        }
    }
}

/// One row of the outcome ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub event: EventKind,
    pub market: MarketKind,
    pub direction: Direction,
    pub line: f64,
    pub odds: f64,
    pub p_model: f64,
    pub edge: f64,
    pub stake: f64,
    pub stake_units: f64,
    pub accepted: bool,
    /// None while pending
    pub result: Option<PickResult>,
    pub profit: f64,
    pub bankroll_after: Option<f64>,
}

impl OutcomeRecord {
    pub fn is_settled(&self) -> bool {
        self.result.is_some()
    }
}

/// One point of the bankroll time series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollEntry {
    pub timestamp: DateTime<Utc>,
    pub bankroll: f64,
}

pub trait OutcomeLedger: Send + Sync {
    fn append_outcome(&self, record: OutcomeRecord) -> Result<()>;

    /// Full history in insertion order
    fn history(&self) -> Result<Vec<OutcomeRecord>>;

    /// Set result, profit and bankroll_after on the pending record at `index`.
    /// Out-of-range or already settled indices are an error.
    fn settle(&self, index: usize, result: PickResult, profit: f64, bankroll_after: f64) -> Result<OutcomeRecord>;
}

pub trait BankrollLedger: Send + Sync {
    fn append_bankroll(&self, entry: BankrollEntry) -> Result<()>;

    fn entries(&self) -> Result<Vec<BankrollEntry>>;

    /// Last entry, or `initial` when empty
    fn current(&self, initial: f64) -> Result<f64> {
        Ok(self
            .entries()?
            .last()
            .map(|e| e.bankroll)
            .unwrap_or(initial))
    }
}

/// Best-effort audit sink. Callers log and drop failures.
pub trait AuditLog: Send + Sync {
    fn record_rejection(&self, record: &RejectionRecord) -> Result<()>;

    fn record_decision(&self, record: &DecisionAuditRecord) -> Result<()>;
}
