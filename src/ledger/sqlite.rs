//! SQLite-backed ledgers
//!
//! One database file holds the pick history, the bankroll series and both
//! audit tables. Rows are read back in insertion order (`seq`).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::{AuditLog, BankrollEntry, BankrollLedger, OutcomeLedger, OutcomeRecord, PickResult};
use crate::decision::DecisionAuditRecord;
use crate::risk::RejectionRecord;

#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open ledger db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory ledger db")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS picks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                ts TEXT NOT NULL,
                home_team TEXT NOT NULL,
                away_team TEXT NOT NULL,
                event TEXT NOT NULL,
                market TEXT NOT NULL,
                direction TEXT NOT NULL,
                line REAL NOT NULL,
                odds REAL NOT NULL,
                p_model REAL NOT NULL,
                edge REAL NOT NULL,
                stake REAL NOT NULL,
                stake_units REAL NOT NULL,
                accepted INTEGER NOT NULL,
                result INTEGER,
                profit REAL NOT NULL,
                bankroll_after REAL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bankroll (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                bankroll REAL NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rejections (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                ts TEXT NOT NULL,
                phase TEXT NOT NULL,
                status TEXT NOT NULL,
                z_base REAL,
                z_dynamic REAL,
                cv REAL NOT NULL,
                drawdown REAL NOT NULL,
                reasons TEXT NOT NULL,
                snapshot TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS decisions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                ts TEXT NOT NULL,
                event TEXT NOT NULL,
                market TEXT NOT NULL,
                accepted INTEGER NOT NULL,
                p_model REAL NOT NULL,
                edge REAL NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rejections_ts ON rejections(ts DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn rejection_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM rejections", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn decision_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM decisions", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

/// Raw `picks` row before enum and timestamp parsing
struct PickRow {
    id: String,
    ts: String,
    home_team: String,
    away_team: String,
    event: String,
    market: String,
    direction: String,
    line: f64,
    odds: f64,
    p_model: f64,
    edge: f64,
    stake: f64,
    stake_units: f64,
    accepted: bool,
    result: Option<i64>,
    profit: f64,
    bankroll_after: Option<f64>,
}

const PICK_COLUMNS: &str = "id, ts, home_team, away_team, event, market, direction, line, odds, \
     p_model, edge, stake, stake_units, accepted, result, profit, bankroll_after";

fn read_pick_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PickRow> {
    Ok(PickRow {
        id: row.get(0)?,
        ts: row.get(1)?,
        home_team: row.get(2)?,
        away_team: row.get(3)?,
        event: row.get(4)?,
        market: row.get(5)?,
        direction: row.get(6)?,
        line: row.get(7)?,
        odds: row.get(8)?,
        p_model: row.get(9)?,
        edge: row.get(10)?,
        stake: row.get(11)?,
        stake_units: row.get(12)?,
        accepted: row.get(13)?,
        result: row.get(14)?,
        profit: row.get(15)?,
        bankroll_after: row.get(16)?,
    })
}

fn parse_ts(ts: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(ts)
        .with_context(|| format!("bad timestamp {ts}"))?
        .with_timezone(&Utc))
}

impl TryFrom<PickRow> for OutcomeRecord {
    type Error = anyhow::Error;

    fn try_from(row: PickRow) -> Result<Self> {
        let result = match row.result {
            Some(v) => Some(
                PickResult::from_i8(v as i8)
                    .with_context(|| format!("bad result value {v} for pick {}", row.id))?,
            ),
            None => None,
        };
        Ok(OutcomeRecord {
            timestamp: parse_ts(&row.ts)?,
            event: row.event.parse()?,
            market: row.market.parse()?,
            direction: row.direction.parse()?,
            id: row.id,
            home_team: row.home_team,
            away_team: row.away_team,
            line: row.line,
            odds: row.odds,
            p_model: row.p_model,
            edge: row.edge,
            stake: row.stake,
            stake_units: row.stake_units,
            accepted: row.accepted,
            result,
            profit: row.profit,
            bankroll_after: row.bankroll_after,
        })
    }
}

impl OutcomeLedger for SqliteLedger {
    fn append_outcome(&self, record: OutcomeRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO picks ({PICK_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                record.id,
                record.timestamp.to_rfc3339(),
                record.home_team,
                record.away_team,
                record.event.as_str(),
                record.market.as_str(),
                record.direction.as_str(),
                record.line,
                record.odds,
                record.p_model,
                record.edge,
                record.stake,
                record.stake_units,
                record.accepted,
                record.result.map(|r| r.as_i8() as i64),
                record.profit,
                record.bankroll_after,
            ],
        )
        .context("insert pick")?;
        Ok(())
    }

    fn history(&self) -> Result<Vec<OutcomeRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {PICK_COLUMNS} FROM picks ORDER BY seq ASC"))?;
        let rows = stmt
            .query_map([], read_pick_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(OutcomeRecord::try_from).collect()
    }

    fn settle(&self, index: usize, result: PickResult, profit: f64, bankroll_after: f64) -> Result<OutcomeRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let found: Option<(i64, PickRow)> = tx
            .query_row(
                &format!("SELECT seq, {PICK_COLUMNS} FROM picks ORDER BY seq ASC LIMIT 1 OFFSET ?1"),
                params![index as i64],
                |row| {
                    let seq: i64 = row.get(0)?;
                    let pick = PickRow {
                        id: row.get(1)?,
                        ts: row.get(2)?,
                        home_team: row.get(3)?,
                        away_team: row.get(4)?,
                        event: row.get(5)?,
                        market: row.get(6)?,
                        direction: row.get(7)?,
                        line: row.get(8)?,
                        odds: row.get(9)?,
                        p_model: row.get(10)?,
                        edge: row.get(11)?,
                        stake: row.get(12)?,
                        stake_units: row.get(13)?,
                        accepted: row.get(14)?,
                        result: row.get(15)?,
                        profit: row.get(16)?,
                        bankroll_after: row.get(17)?,
                    };
                    Ok((seq, pick))
                },
            )
            .optional()?;

        let Some((seq, pick)) = found else {
            bail!("pick index {index} out of range");
        };
        if pick.result.is_some() {
            bail!("pick {index} is already settled");
        }

        tx.execute(
            "UPDATE picks SET result = ?1, profit = ?2, bankroll_after = ?3 WHERE seq = ?4",
            params![result.as_i8() as i64, profit, bankroll_after, seq],
        )?;
        tx.commit()?;

        let mut record = OutcomeRecord::try_from(pick)?;
        record.result = Some(result);
        record.profit = profit;
        record.bankroll_after = Some(bankroll_after);
        Ok(record)
    }
}

impl BankrollLedger for SqliteLedger {
    fn append_bankroll(&self, entry: BankrollEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bankroll (ts, bankroll) VALUES (?1, ?2)",
            params![entry.timestamp.to_rfc3339(), entry.bankroll],
        )
        .context("insert bankroll entry")?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<BankrollEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT ts, bankroll FROM bankroll ORDER BY seq ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(ts, bankroll)| {
                Ok(BankrollEntry {
                    timestamp: parse_ts(&ts)?,
                    bankroll,
                })
            })
            .collect()
    }

    fn current(&self, initial: f64) -> Result<f64> {
        let conn = self.conn.lock();
        let last: Option<f64> = conn
            .query_row(
                "SELECT bankroll FROM bankroll ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last.unwrap_or(initial))
    }
}

impl AuditLog for SqliteLedger {
    fn record_rejection(&self, record: &RejectionRecord) -> Result<()> {
        let snapshot = serde_json::to_string(&record.state)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rejections (id, ts, phase, status, z_base, z_dynamic, cv, drawdown, reasons, snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.timestamp.to_rfc3339(),
                record.phase.as_str(),
                record.state.status.as_str(),
                record.z_base,
                record.z_dynamic,
                record.cv,
                record.state.drawdown,
                record.joined_reasons(),
                snapshot,
            ],
        )
        .context("insert rejection")?;
        Ok(())
    }

    fn record_decision(&self, record: &DecisionAuditRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO decisions (id, ts, event, market, accepted, p_model, edge, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.timestamp.to_rfc3339(),
                record.decision.event.as_str(),
                record.decision.market.as_str(),
                record.decision.accepted,
                record.decision.p_model,
                record.decision.edge,
                payload,
            ],
        )
        .context("insert decision")?;
        Ok(())
    }
}
