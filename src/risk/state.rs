//! Risk state derivation
//!
//! No persisted state machine: every read recomputes NORMAL / RECOVERY /
//! BLOCKED from the outcome ledger.

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::ledger::{OutcomeRecord, PickResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    Normal,
    Recovery,
    Blocked,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Normal => "NORMAL",
            RiskStatus::Recovery => "RECOVERY",
            RiskStatus::Blocked => "BLOCKED",
        }
    }
}

/// Adjustments the decision engine takes from the risk state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskOverlay {
    /// Multiplies the event's z
    pub z_scale: f64,
    /// Multiplies the fractional Kelly stake
    pub kelly_multiplier: f64,
}

impl Default for RiskOverlay {
    fn default() -> Self {
        Self {
            z_scale: 1.0,
            kelly_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub status: RiskStatus,
    /// Current decline from the equity peak
    pub drawdown: f64,
    pub max_drawdown: f64,
    pub rolling_roi: f64,
    pub loss_streak: usize,
    /// None when blocked
    pub z_adjustment: Option<f64>,
    pub kelly_multiplier: f64,
    pub bankroll: f64,
    pub settled_picks: usize,
    pub total_profit: f64,
}

impl RiskState {
    /// Derive from the full history. Pending picks are ignored.
    pub fn derive(history: &[OutcomeRecord], cfg: &RiskConfig) -> Self {
        let settled: Vec<&OutcomeRecord> = history.iter().filter(|r| r.is_settled()).collect();

        let mut equity = cfg.initial_bankroll;
        let mut peak = equity;
        let mut drawdown = 0.0;
        let mut max_drawdown: f64 = 0.0;
        for record in &settled {
            equity += record.profit;
            peak = peak.max(equity);
            drawdown = if peak > 0.0 {
                ((peak - equity) / peak).max(0.0)
            } else {
                0.0
            };
            max_drawdown = max_drawdown.max(drawdown);
        }

        let window_start = settled.len().saturating_sub(cfg.rolling_window);
        let window = &settled[window_start..];
        let staked: f64 = window.iter().map(|r| r.stake).sum();
        let returned: f64 = window.iter().map(|r| r.profit).sum();
        let rolling_roi = if staked > 0.0 { returned / staked } else { 0.0 };

        let loss_streak = settled
            .iter()
            .rev()
            .take_while(|r| r.result == Some(PickResult::Loss))
            .count();

        let (status, z_adjustment, kelly_multiplier) =
            if drawdown > cfg.block_drawdown || rolling_roi < cfg.block_roi {
                (RiskStatus::Blocked, None, 0.0)
            } else if loss_streak >= cfg.recovery_streak {
                (
                    RiskStatus::Recovery,
                    Some(cfg.recovery_z),
                    cfg.recovery_kelly,
                )
            } else {
                (RiskStatus::Normal, Some(cfg.baseline_z), 1.0)
            };

        Self {
            status,
            drawdown,
            max_drawdown,
            rolling_roi,
            loss_streak,
            z_adjustment,
            kelly_multiplier,
            bankroll: equity,
            settled_picks: settled.len(),
            total_profit: equity - cfg.initial_bankroll,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == RiskStatus::Blocked
    }

    /// None when blocked; otherwise z relative to baseline and the Kelly multiplier
    pub fn overlay(&self, cfg: &RiskConfig) -> Option<RiskOverlay> {
        let z = self.z_adjustment?;
        let baseline = if cfg.baseline_z > 0.0 { cfg.baseline_z } else { 1.0 };
        Some(RiskOverlay {
            z_scale: z / baseline,
            kelly_multiplier: self.kelly_multiplier,
        })
    }
}

/// Base z raised by volatility and drawdown steps, capped and rounded to 2 dp
pub fn dynamic_z(z_base: f64, cv_max: f64, drawdown: f64, cfg: &RiskConfig) -> f64 {
    let mut z = z_base;
    if cv_max >= cfg.cv_step_high {
        z += cfg.z_step_high;
    } else if cv_max >= cfg.cv_step_mid {
        z += cfg.z_step_mid;
    }
    if drawdown >= cfg.drawdown_step_high {
        z += cfg.z_step_high;
    } else if drawdown >= cfg.drawdown_step_mid {
        z += cfg.z_step_mid;
    }
    (z.min(cfg.dynamic_z_cap) * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Direction, EventKind, MarketKind};
    use chrono::Utc;

    pub(crate) fn settled(stake: f64, odds: f64, result: PickResult) -> OutcomeRecord {
        OutcomeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            home_team: "Home".into(),
            away_team: "Away".into(),
            event: EventKind::Goals,
            market: MarketKind::Combined,
            direction: Direction::Over,
            line: 2.5,
            odds,
            p_model: 0.55,
            edge: 0.02,
            stake,
            stake_units: stake / 200.0,
            accepted: true,
            result: Some(result),
            profit: result.profit(stake, odds),
            bankroll_after: None,
        }
    }

    #[test]
    fn empty_history_is_normal() {
        let cfg = RiskConfig::default();
        let state = RiskState::derive(&[], &cfg);
        assert_eq!(state.status, RiskStatus::Normal);
        assert_eq!(state.z_adjustment, Some(1.0));
        assert_eq!(state.kelly_multiplier, 1.0);
        assert_eq!(state.bankroll, 20_000.0);
        assert_eq!(state.drawdown, 0.0);
    }

    #[test]
    fn thirty_percent_drawdown_blocks() {
        let cfg = RiskConfig::default();
        // 6 000 lost on 20 000 = 30%
        let history: Vec<_> = (0..6).map(|_| settled(1_000.0, 2.0, PickResult::Loss)).collect();
        let state = RiskState::derive(&history, &cfg);
        assert!((state.drawdown - 0.30).abs() < 1e-12);
        assert_eq!(state.status, RiskStatus::Blocked);
        assert_eq!(state.z_adjustment, None);
        assert_eq!(state.kelly_multiplier, 0.0);
        assert!(state.overlay(&cfg).is_none());
    }

    #[test]
    fn three_trailing_losses_enter_recovery() {
        let cfg = RiskConfig::default();
        let mut history: Vec<_> = (0..4).map(|_| settled(200.0, 2.0, PickResult::Win)).collect();
        history.extend((0..3).map(|_| settled(200.0, 2.0, PickResult::Loss)));
        let state = RiskState::derive(&history, &cfg);
        assert_eq!(state.loss_streak, 3);
        assert_eq!(state.status, RiskStatus::Recovery);
        assert_eq!(state.z_adjustment, Some(1.3));
        assert_eq!(state.kelly_multiplier, 0.5);
        let overlay = state.overlay(&cfg).expect("overlay");
        assert!((overlay.z_scale - 1.3).abs() < 1e-12);
    }

    #[test]
    fn push_breaks_loss_streak() {
        let cfg = RiskConfig::default();
        let mut history: Vec<_> = (0..10).map(|_| settled(100.0, 2.0, PickResult::Win)).collect();
        history.extend((0..3).map(|_| settled(100.0, 2.0, PickResult::Loss)));
        history.push(settled(100.0, 2.0, PickResult::Push));
        let state = RiskState::derive(&history, &cfg);
        assert_eq!(state.loss_streak, 0);
        assert_eq!(state.status, RiskStatus::Normal);
    }

    #[test]
    fn rolling_roi_only_sees_window() {
        let cfg = RiskConfig::default();
        // old heavy losses fall out of the 20-pick window
        let mut history: Vec<_> = (0..5).map(|_| settled(100.0, 2.0, PickResult::Loss)).collect();
        history.extend((0..20).map(|_| settled(100.0, 2.0, PickResult::Win)));
        let state = RiskState::derive(&history, &cfg);
        assert!((state.rolling_roi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn negative_roi_blocks_without_drawdown() {
        let cfg = RiskConfig::default();
        // small stakes: drawdown stays tiny, ROI = -1
        let mut history: Vec<_> = (0..2).map(|_| settled(10.0, 2.0, PickResult::Loss)).collect();
        history.push(settled(10.0, 2.0, PickResult::Push));
        let state = RiskState::derive(&history, &cfg);
        assert!(state.drawdown < 0.01);
        assert_eq!(state.status, RiskStatus::Blocked);
    }

    #[test]
    fn recovery_restores_normal_as_equity_recovers() {
        let cfg = RiskConfig::default();
        let mut history: Vec<_> = (0..6).map(|_| settled(1_000.0, 2.0, PickResult::Loss)).collect();
        history.extend((0..20).map(|_| settled(400.0, 2.0, PickResult::Win)));
        let state = RiskState::derive(&history, &cfg);
        assert!(state.max_drawdown >= 0.30 - 1e-12);
        assert_eq!(state.drawdown, 0.0);
        assert_eq!(state.status, RiskStatus::Normal);
    }

    #[test]
    fn pending_picks_do_not_count() {
        let cfg = RiskConfig::default();
        let mut pending = settled(500.0, 2.0, PickResult::Loss);
        pending.result = None;
        pending.profit = 0.0;
        let state = RiskState::derive(&[pending], &cfg);
        assert_eq!(state.settled_picks, 0);
        assert_eq!(state.loss_streak, 0);
    }

    #[test]
    fn dynamic_z_steps_and_cap() {
        let cfg = RiskConfig::default();
        assert_eq!(dynamic_z(1.0, 0.10, 0.0, &cfg), 1.0);
        assert_eq!(dynamic_z(1.0, 0.26, 0.0, &cfg), 1.15);
        assert_eq!(dynamic_z(1.0, 0.31, 0.06, &cfg), 1.45);
        assert_eq!(dynamic_z(1.3, 0.40, 0.12, &cfg), 1.9);
        assert_eq!(dynamic_z(2.2, 0.40, 0.12, &cfg), 2.5);
    }
}
