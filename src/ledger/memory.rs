//! In-process ledger, used by tests, the backtest and lab runs

use anyhow::{bail, Result};
use parking_lot::{Mutex, RwLock};

use super::{AuditLog, BankrollEntry, BankrollLedger, OutcomeLedger, OutcomeRecord, PickResult};
use crate::decision::DecisionAuditRecord;
use crate::risk::RejectionRecord;

#[derive(Default)]
pub struct MemoryLedger {
    picks: RwLock<Vec<OutcomeRecord>>,
    bankroll: RwLock<Vec<BankrollEntry>>,
    rejections: Mutex<Vec<RejectionRecord>>,
    decisions: Mutex<Vec<DecisionAuditRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejections(&self) -> Vec<RejectionRecord> {
        self.rejections.lock().clone()
    }

    pub fn decisions(&self) -> Vec<DecisionAuditRecord> {
        self.decisions.lock().clone()
    }
}

impl OutcomeLedger for MemoryLedger {
    fn append_outcome(&self, record: OutcomeRecord) -> Result<()> {
        self.picks.write().push(record);
        Ok(())
    }

    fn history(&self) -> Result<Vec<OutcomeRecord>> {
        Ok(self.picks.read().clone())
    }

    fn settle(&self, index: usize, result: PickResult, profit: f64, bankroll_after: f64) -> Result<OutcomeRecord> {
        let mut picks = self.picks.write();
        let len = picks.len();
        let Some(record) = picks.get_mut(index) else {
            bail!("pick index {index} out of range ({len} picks)");
        };
        if record.is_settled() {
            bail!("pick {index} is already settled");
        }
        record.result = Some(result);
        record.profit = profit;
        record.bankroll_after = Some(bankroll_after);
        Ok(record.clone())
    }
}

impl BankrollLedger for MemoryLedger {
    fn append_bankroll(&self, entry: BankrollEntry) -> Result<()> {
        self.bankroll.write().push(entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<BankrollEntry>> {
        Ok(self.bankroll.read().clone())
    }
}

impl AuditLog for MemoryLedger {
    fn record_rejection(&self, record: &RejectionRecord) -> Result<()> {
        self.rejections.lock().push(record.clone());
        Ok(())
    }

    fn record_decision(&self, record: &DecisionAuditRecord) -> Result<()> {
        self.decisions.lock().push(record.clone());
        Ok(())
    }
}
