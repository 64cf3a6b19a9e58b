//! Pick tracker: outcome ledger + bankroll series

use anyhow::{bail, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::{BankrollEntry, BankrollLedger, OutcomeLedger, OutcomeRecord, PickResult};
use crate::config::RiskConfig;
use crate::models::{Direction, EventKind, MarketKind};
use crate::risk::RiskState;

/// A pick to log. `result` is usually None; a known result settles it on insert.
#[derive(Debug, Clone)]
pub struct PickTicket {
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
    pub result: Option<PickResult>,
}

pub struct Tracker {
    outcomes: Arc<dyn OutcomeLedger>,
    bankroll: Arc<dyn BankrollLedger>,
    risk: RiskConfig,
    // appends that read the bankroll first must not interleave
    write_lock: Mutex<()>,
}

impl Tracker {
    pub fn new(outcomes: Arc<dyn OutcomeLedger>, bankroll: Arc<dyn BankrollLedger>, risk: RiskConfig) -> Self {
        Self {
            outcomes,
            bankroll,
            risk,
            write_lock: Mutex::new(()),
        }
    }

    pub fn current_bankroll(&self) -> Result<f64> {
        self.bankroll.current(self.risk.initial_bankroll)
    }

    pub fn log_pick(&self, ticket: PickTicket) -> Result<OutcomeRecord> {
        if !(ticket.stake > 0.0) {
            bail!("stake must be positive, got {}", ticket.stake);
        }
        if !(ticket.odds > 1.0) {
            bail!("odds must exceed 1.0, got {}", ticket.odds);
        }

        let _guard = self.write_lock.lock();
        let (profit, bankroll_after) = match ticket.result {
            Some(result) => {
                let profit = result.profit(ticket.stake, ticket.odds);
                let after = self.current_bankroll()? + profit;
                (profit, Some(after))
            }
            None => (0.0, None),
        };

        let record = OutcomeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            home_team: ticket.home_team,
            away_team: ticket.away_team,
            event: ticket.event,
            market: ticket.market,
            direction: ticket.direction,
            line: ticket.line,
            odds: ticket.odds,
            p_model: ticket.p_model,
            edge: ticket.edge,
            stake: ticket.stake,
            stake_units: ticket.stake_units,
            accepted: ticket.accepted,
            result: ticket.result,
            profit,
            bankroll_after,
        };
        self.outcomes.append_outcome(record.clone())?;
        if let Some(bankroll) = bankroll_after {
            self.bankroll.append_bankroll(BankrollEntry {
                timestamp: record.timestamp,
                bankroll,
            })?;
        }

        info!(
            id = %record.id,
            event = %record.event,
            stake = record.stake,
            odds = record.odds,
            "pick logged"
        );
        Ok(record)
    }

    pub fn settle(&self, index: usize, result: PickResult) -> Result<OutcomeRecord> {
        let _guard = self.write_lock.lock();
        let history = self.outcomes.history()?;
        let Some(pending) = history.get(index) else {
            bail!("pick index {index} out of range ({} picks)", history.len());
        };
        if pending.is_settled() {
            bail!("pick {index} is already settled");
        }

        let profit = result.profit(pending.stake, pending.odds);
        let bankroll_after = self.current_bankroll()? + profit;
        let settled = self.outcomes.settle(index, result, profit, bankroll_after)?;
        self.bankroll.append_bankroll(BankrollEntry {
            timestamp: Utc::now(),
            bankroll: bankroll_after,
        })?;

        info!(index, result = ?result, profit, bankroll = bankroll_after, "pick settled");
        Ok(settled)
    }

    pub fn history(&self) -> Result<Vec<OutcomeRecord>> {
        self.outcomes.history()
    }

    /// Derived from the outcome history; bankroll taken from the bankroll ledger
    pub fn risk_state(&self) -> Result<RiskState> {
        let history = self.outcomes.history()?;
        let mut state = RiskState::derive(&history, &self.risk);
        state.bankroll = self.current_bankroll()?;
        Ok(state)
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.risk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::risk::RiskStatus;

    fn tracker() -> (Tracker, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let tracker = Tracker::new(ledger.clone(), ledger.clone(), RiskConfig::default());
        (tracker, ledger)
    }

    fn ticket(stake: f64, odds: f64, result: Option<PickResult>) -> PickTicket {
        PickTicket {
            home_team: "Betis".into(),
            away_team: "Osasuna".into(),
            event: EventKind::Goals,
            market: MarketKind::Combined,
            direction: Direction::Over,
            line: 2.5,
            odds,
            p_model: 0.58,
            edge: 0.10,
            stake,
            stake_units: stake / 200.0,
            accepted: true,
            result,
        }
    }

    #[test]
    fn rejects_bad_stake_and_odds() {
        let (tracker, _) = tracker();
        assert!(tracker.log_pick(ticket(0.0, 1.9, None)).is_err());
        assert!(tracker.log_pick(ticket(100.0, 1.0, None)).is_err());
        assert!(tracker.history().expect("history").is_empty());
    }

    #[test]
    fn pending_pick_leaves_bankroll_untouched() {
        let (tracker, _) = tracker();
        tracker.log_pick(ticket(500.0, 1.9, None)).expect("log");
        assert_eq!(tracker.current_bankroll().expect("bankroll"), 20_000.0);
    }

    #[test]
    fn settle_updates_bankroll() {
        let (tracker, ledger) = tracker();
        tracker.log_pick(ticket(500.0, 1.9, None)).expect("log");
        let settled = tracker.settle(0, PickResult::Win).expect("settle");
        assert!((settled.profit - 450.0).abs() < 1e-9);
        assert!((tracker.current_bankroll().expect("bankroll") - 20_450.0).abs() < 1e-9);
        assert_eq!(ledger.entries().expect("entries").len(), 1);

        assert!(tracker.settle(0, PickResult::Loss).is_err());
        assert!(tracker.settle(3, PickResult::Loss).is_err());
    }

    #[test]
    fn logged_result_settles_immediately() {
        let (tracker, _) = tracker();
        let record = tracker
            .log_pick(ticket(400.0, 2.1, Some(PickResult::Loss)))
            .expect("log");
        assert_eq!(record.profit, -400.0);
        assert_eq!(record.bankroll_after, Some(19_600.0));
        assert_eq!(tracker.current_bankroll().expect("bankroll"), 19_600.0);
    }

    #[test]
    fn push_returns_stake() {
        let (tracker, _) = tracker();
        tracker.log_pick(ticket(300.0, 1.8, None)).expect("log");
        let settled = tracker.settle(0, PickResult::Push).expect("settle");
        assert_eq!(settled.profit, 0.0);
        assert_eq!(tracker.current_bankroll().expect("bankroll"), 20_000.0);
    }

    #[test]
    fn risk_state_follows_losses() {
        let (tracker, _) = tracker();
        for _ in 0..3 {
            tracker.log_pick(ticket(100.0, 2.0, None)).expect("log");
        }
        for i in 0..3 {
            tracker.settle(i, PickResult::Loss).expect("settle");
        }
        let state = tracker.risk_state().expect("state");
        assert_eq!(state.loss_streak, 3);
        // rolling ROI of -100% blocks before the streak can trigger recovery
        assert_eq!(state.status, RiskStatus::Blocked);
        assert_eq!(state.bankroll, 19_700.0);
    }
}
