//! # engine::paper
//!
//! The simulated ledger. Opening a position reserves margin out of capital;
//! closing one (target, stop, or manual) credits the reserve plus realised
//! P&L back. A rejected open (insufficient capital) leaves the ledger
//! untouched.
//!
//! Marks are applied in one pass from a pre-resolved list so every position
//! in a cycle is judged against the same snapshot of prices.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{RiskParams, SignalEvent, Trade, TradeStatus};
use crate::premium::ResolvedPremium;

// ─── Settings ─────────────────────────────────────────────────────────────────

/// Ledger-level defaults, overridable per signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSettings {
    pub lot_size:          u32,
    pub risk_reward_ratio: f64,
    pub risk_percent:      f64,
    pub stop_loss_percent: f64,
    /// Fraction of premium × quantity reserved as margin. 1.0 = full debit.
    pub margin_fraction:   f64,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            lot_size:          65,
            risk_reward_ratio: 2.0,
            risk_percent:      2.0,
            stop_loss_percent: 10.0,
            margin_fraction:   1.0,
        }
    }
}

// ─── Stats ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradingStats {
    pub initial_capital: f64,
    pub current_capital: f64,
    pub open_trades:     usize,
    pub closed_trades:   usize,
    pub wins:            usize,
    pub losses:          usize,
    /// Percentage of closed trades with positive P&L.
    pub win_rate:        f64,
    /// Realised P&L across closed trades.
    pub realized_pnl:    f64,
    /// Running P&L across open positions at their last mark.
    pub unrealized_pnl:  f64,
    /// Free capital plus the mark-to-market value of open positions.
    pub total_value:     f64,
    /// Total value relative to initial capital, in percent.
    pub return_percent:  f64,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

pub struct PaperTradingEngine {
    initial_capital: f64,
    capital:         f64,
    open_positions:  Vec<Trade>,
    closed_trades:   Vec<Trade>,
    trade_counter:   u64,
    settings:        TradeSettings,
}

impl PaperTradingEngine {
    pub fn new(initial_capital: f64, settings: TradeSettings) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            trade_counter: 0,
            settings,
        }
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn settings(&self) -> &TradeSettings {
        &self.settings
    }

    pub fn open_positions(&self) -> &[Trade] {
        &self.open_positions
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    /// Size and open a position for a signal at an already-resolved premium.
    /// Returns `None` when margin would exceed available capital.
    pub fn open_from_signal(
        &mut self,
        signal: &SignalEvent,
        resolved: &ResolvedPremium,
        spot: f64,
    ) -> Option<&Trade> {
        let risk = signal.risk.unwrap_or(RiskParams {
            stop_loss_percent: self.settings.stop_loss_percent,
            risk_reward_ratio: self.settings.risk_reward_ratio,
            risk_percent:      self.settings.risk_percent,
        });

        let entry = resolved.premium;
        let stop = entry * (1.0 - risk.stop_loss_percent / 100.0);
        let target = entry + (entry - stop) * risk.risk_reward_ratio;

        let lot_size = if resolved.lot_size > 0 {
            resolved.lot_size
        } else {
            self.settings.lot_size
        };
        let risk_amount = self.capital * risk.risk_percent / 100.0;
        let per_unit_risk = entry - stop;
        let lots = if per_unit_risk > 0.0 {
            ((risk_amount / (per_unit_risk * lot_size as f64)).floor() as u32).max(1)
        } else {
            1
        };
        let quantity = lots * lot_size;

        self.open_position(signal, resolved, spot, entry, quantity, stop, target)
    }

    /// Open a fully specified position. Margin is checked before any state
    /// changes; a rejection leaves capital and the counter as they were.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        signal: &SignalEvent,
        resolved: &ResolvedPremium,
        spot: f64,
        entry_premium: f64,
        quantity: u32,
        stop_loss: f64,
        target: f64,
    ) -> Option<&Trade> {
        let margin = entry_premium * quantity as f64 * self.settings.margin_fraction;
        if margin > self.capital {
            warn!(
                "⛔ Rejected {} {:?}: margin {:.2} exceeds capital {:.2}",
                signal.strategy, signal.signal_type, margin, self.capital
            );
            return None;
        }

        self.trade_counter += 1;
        let trade_id = format!("{}-{:04}", strategy_prefix(&signal.strategy), self.trade_counter);

        self.capital -= margin;
        let trade = Trade {
            trade_id,
            signal_type: signal.signal_type,
            option_type: resolved.option_type,
            strike: resolved.strike,
            instrument_id: resolved.instrument_id,
            expiry: resolved.expiry.clone(),
            spot_at_entry: spot,
            entry_premium,
            entry_time: chrono::Utc::now(),
            quantity,
            stop_loss,
            target,
            margin_reserved: margin,
            strategy: signal.strategy.clone(),
            status: TradeStatus::Open,
            current_premium: entry_premium,
            pnl: 0.0,
            exit_premium: None,
            exit_time: None,
        };
        info!(
            "🚀 Opened {} {} {} x{} @ {:.2} (stop {:.2}, target {:.2}, capital {:.2})",
            trade.trade_id, trade.strike, trade.option_type, quantity,
            entry_premium, stop_loss, target, self.capital
        );
        self.open_positions.push(trade);
        self.open_positions.last()
    }

    /// Apply one cycle of pre-resolved marks. Positions without a mark in
    /// `marks` keep their previous premium. Returns the ids of trades that
    /// closed this cycle.
    pub fn update_positions(&mut self, marks: &[(String, f64)]) -> Vec<String> {
        let mut closed_ids = Vec::new();
        for (trade_id, premium) in marks {
            let Some(idx) = self
                .open_positions
                .iter()
                .position(|t| &t.trade_id == trade_id)
            else {
                continue;
            };
            let trade = &mut self.open_positions[idx];
            trade.update_current_premium(*premium);
            if trade.check_exit_conditions(*premium) {
                let trade = self.open_positions.remove(idx);
                self.settle(trade, &mut closed_ids);
            }
        }
        closed_ids
    }

    /// Close a position at the given premium regardless of its levels.
    /// Returns `false` when no open trade carries that id.
    pub fn manual_close(&mut self, trade_id: &str, premium: f64) -> bool {
        let Some(idx) = self
            .open_positions
            .iter()
            .position(|t| t.trade_id == trade_id)
        else {
            return false;
        };
        let mut trade = self.open_positions.remove(idx);
        trade.close(premium, TradeStatus::ManualExit);
        let mut ids = Vec::new();
        self.settle(trade, &mut ids);
        true
    }

    fn settle(&mut self, trade: Trade, closed_ids: &mut Vec<String>) {
        // Credit the reserve plus realised P&L. At margin fraction 1.0 this
        // equals exit premium × quantity.
        self.capital += trade.margin_reserved + trade.pnl;
        info!(
            "✅ Closed {} {:?} pnl {:.2}, capital {:.2}",
            trade.trade_id, trade.status, trade.pnl, self.capital
        );
        closed_ids.push(trade.trade_id.clone());
        self.closed_trades.push(trade);
    }

    pub fn statistics(&self) -> TradingStats {
        let wins = self.closed_trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = self.closed_trades.len() - wins;
        let win_rate = if self.closed_trades.is_empty() {
            0.0
        } else {
            wins as f64 / self.closed_trades.len() as f64 * 100.0
        };
        let total_value = self.capital
            + self
                .open_positions
                .iter()
                .map(|t| t.current_premium * t.quantity as f64)
                .sum::<f64>();
        let return_percent = if self.initial_capital > 0.0 {
            (total_value - self.initial_capital) / self.initial_capital * 100.0
        } else {
            0.0
        };
        TradingStats {
            initial_capital: self.initial_capital,
            current_capital: self.capital,
            open_trades:     self.open_positions.len(),
            closed_trades:   self.closed_trades.len(),
            wins,
            losses,
            win_rate,
            realized_pnl:   self.closed_trades.iter().map(|t| t.pnl).sum(),
            unrealized_pnl: self.open_positions.iter().map(|t| t.pnl).sum(),
            total_value,
            return_percent,
        }
    }

    // Snapshot plumbing lives in engine::snapshot; these expose the raw
    // state it persists.
    pub(crate) fn raw_parts(&self) -> (f64, f64, &[Trade], &[Trade], u64, TradeSettings) {
        (
            self.initial_capital,
            self.capital,
            &self.open_positions,
            &self.closed_trades,
            self.trade_counter,
            self.settings,
        )
    }

    pub(crate) fn from_raw_parts(
        initial_capital: f64,
        capital: f64,
        open_positions: Vec<Trade>,
        closed_trades: Vec<Trade>,
        trade_counter: u64,
        settings: TradeSettings,
    ) -> Self {
        Self { initial_capital, capital, open_positions, closed_trades, trade_counter, settings }
    }
}

/// First three alphanumeric characters of the strategy tag, uppercased.
/// `"Bollinger+MACD"` → `"BOL"`; empty or symbol-only tags get `"SIG"`.
fn strategy_prefix(strategy: &str) -> String {
    let prefix: String = strategy
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    if prefix.is_empty() {
        "SIG".to_string()
    } else {
        prefix
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
