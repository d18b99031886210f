//! # models::trade
//!
//! The paper trade and its lifecycle state machine:
//!
//! ```text
//! OPEN ──▶ TARGET       (premium rose to target)
//!      ──▶ STOP_LOSS    (premium fell to stop)
//!      ──▶ MANUAL_EXIT  (operator close)
//! ```
//!
//! All three right-hand states are terminal. Once a trade leaves OPEN its
//! entry/exit fields are frozen — further ticks are no-ops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::instrument::OptionType;

// ─── SignalType ───────────────────────────────────────────────────────────────

/// Directional signal from an external strategy producer.
///
/// Both map to *buying* an option (CALL → CE, PUT → PE), so P&L is always
/// `(current − entry) × quantity`; the underlying's direction is already
/// encoded in which option type was bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Call,
    Put,
}

impl SignalType {
    pub fn option_type(&self) -> OptionType {
        match self {
            SignalType::Call => OptionType::CE,
            SignalType::Put => OptionType::PE,
        }
    }
}

// ─── TradeStatus ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    Target,
    StopLoss,
    ManualExit,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Open)
    }
}

// ─── Trade ────────────────────────────────────────────────────────────────────

/// A single simulated option position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Counter-based id, e.g. `"BOL-0007"`.
    pub trade_id:    String,
    pub signal_type: SignalType,
    pub option_type: OptionType,
    pub strike:      i64,
    /// Bound contract id. `None` in estimation-only mode (no master cache),
    /// in which case every mark comes from the analytic estimator.
    pub instrument_id: Option<i64>,
    pub expiry:        Option<String>,
    /// Underlying reference price at entry.
    pub spot_at_entry: f64,

    pub entry_premium: f64,
    pub entry_time:    DateTime<Utc>,
    pub quantity:      u32,
    /// Premium level that triggers STOP_LOSS.
    pub stop_loss:     f64,
    /// Premium level that triggers TARGET.
    pub target:        f64,
    /// Capital reserved when the position was opened.
    pub margin_reserved: f64,
    /// Originating strategy tag (free-form, supplied by the producer).
    pub strategy:      String,

    pub status:          TradeStatus,
    pub current_premium: f64,
    /// Running P&L while OPEN; realized P&L once terminal.
    pub pnl:             f64,
    pub exit_premium:    Option<f64>,
    pub exit_time:       Option<DateTime<Utc>>,
}

impl Trade {
    /// Record the latest premium and refresh running P&L.
    /// No-op once the trade has reached a terminal status.
    pub fn update_current_premium(&mut self, premium: f64) {
        if self.status != TradeStatus::Open {
            return;
        }
        self.current_premium = premium;
        self.pnl = (premium - self.entry_premium) * self.quantity as f64;
    }

    /// Evaluate exit levels against `premium` and close the trade when one is
    /// hit. Returns `true` when the trade transitioned.
    ///
    /// Target is checked before stop-loss: if a single tick brackets both
    /// levels (stop ≥ target would be a degenerate setup), the trade closes
    /// at TARGET.
    pub fn check_exit_conditions(&mut self, premium: f64) -> bool {
        if self.status != TradeStatus::Open {
            return false;
        }
        if premium >= self.target {
            self.close(premium, TradeStatus::Target);
            true
        } else if premium <= self.stop_loss {
            self.close(premium, TradeStatus::StopLoss);
            true
        } else {
            false
        }
    }

    /// Transition to a terminal status and freeze exit fields.
    pub fn close(&mut self, exit_premium: f64, status: TradeStatus) {
        debug_assert!(status.is_terminal());
        if self.status != TradeStatus::Open {
            return;
        }
        self.exit_premium = Some(exit_premium);
        self.exit_time = Some(Utc::now());
        self.current_premium = exit_premium;
        self.pnl = (exit_premium - self.entry_premium) * self.quantity as f64;
        self.status = status;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn open_trade(entry: f64, qty: u32, stop: f64, target: f64) -> Trade {
        Trade {
            trade_id: "TST-0001".to_string(),
            signal_type: SignalType::Call,
            option_type: OptionType::CE,
            strike: 25250,
            instrument_id: Some(49081),
            expiry: Some("2026-02-13T14:30:00".to_string()),
            spot_at_entry: 25254.3,
            entry_premium: entry,
            entry_time: Utc::now(),
            quantity: qty,
            stop_loss: stop,
            target,
            margin_reserved: entry * qty as f64,
            strategy: "test".to_string(),
            status: TradeStatus::Open,
            current_premium: entry,
            pnl: 0.0,
            exit_premium: None,
            exit_time: None,
        }
    }

    #[test]
    fn pnl_is_long_premium_for_both_signal_types() {
        let mut call = open_trade(100.0, 65, 70.0, 150.0);
        call.update_current_premium(110.0);
        assert_eq!(call.pnl, (110.0 - 100.0) * 65.0);

        let mut put = open_trade(100.0, 65, 70.0, 150.0);
        put.signal_type = SignalType::Put;
        put.option_type = OptionType::PE;
        put.update_current_premium(90.0);
        assert_eq!(put.pnl, (90.0 - 100.0) * 65.0);
    }

    #[test]
    fn target_closes_trade_and_freezes_it() {
        let mut trade = open_trade(100.0, 65, 70.0, 150.0);
        assert!(trade.check_exit_conditions(150.0));
        assert_eq!(trade.status, TradeStatus::Target);
        assert_eq!(trade.exit_premium, Some(150.0));
        assert_eq!(trade.pnl, 3250.0);

        // Further ticks on a closed trade are no-ops.
        trade.update_current_premium(10.0);
        assert!(!trade.check_exit_conditions(10.0));
        assert_eq!(trade.exit_premium, Some(150.0));
        assert_eq!(trade.pnl, 3250.0);
    }

    #[test]
    fn stop_loss_closes_trade() {
        let mut trade = open_trade(100.0, 65, 70.0, 150.0);
        assert!(trade.check_exit_conditions(69.5));
        assert_eq!(trade.status, TradeStatus::StopLoss);
        assert_eq!(trade.pnl, (69.5 - 100.0) * 65.0);
    }

    #[test]
    fn target_wins_when_one_tick_brackets_both_levels() {
        // Degenerate setup where stop sits above target: the documented
        // ordering closes at TARGET.
        let mut trade = open_trade(100.0, 65, 120.0, 110.0);
        assert!(trade.check_exit_conditions(115.0));
        assert_eq!(trade.status, TradeStatus::Target);
    }

    #[test]
    fn between_levels_stays_open() {
        let mut trade = open_trade(100.0, 65, 70.0, 150.0);
        assert!(!trade.check_exit_conditions(120.0));
        assert_eq!(trade.status, TradeStatus::Open);
        assert!(trade.exit_time.is_none());
    }
}
