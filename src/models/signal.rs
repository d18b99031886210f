//! # models::signal
//!
//! The inbound event shape for external strategy producers. Signal
//! generation itself (indicator thresholds, candle patterns) lives outside
//! this core — producers hand us `(signal type, risk parameters)` and the
//! engine does the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::trade::SignalType;

// ─── RiskParams ───────────────────────────────────────────────────────────────

/// Per-signal risk overrides. When a producer omits them the engine falls
/// back to its ledger-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Stop-loss distance below entry premium, in percent (e.g. `10.0`).
    pub stop_loss_percent: f64,
    /// Target distance as a multiple of the stop distance (1:N risk:reward).
    pub risk_reward_ratio: f64,
    /// Fraction of current capital risked per trade, in percent.
    pub risk_percent:      f64,
}

// ─── SignalEvent ──────────────────────────────────────────────────────────────

/// One trade suggestion from a producer.
///
/// `signal_id` lets a consumer reject a duplicate event that arrives twice
/// (producer retry scenario).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub signal_id:   Uuid,
    pub signal_type: SignalType,
    /// Originating strategy tag, e.g. `"Bollinger+MACD"`.
    pub strategy:    String,
    pub risk:        Option<RiskParams>,
    pub created_at:  DateTime<Utc>,
}

impl SignalEvent {
    pub fn new(signal_type: SignalType, strategy: impl Into<String>) -> Self {
        Self {
            signal_id: Uuid::new_v4(),
            signal_type,
            strategy: strategy.into(),
            risk: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_risk(mut self, risk: RiskParams) -> Self {
        self.risk = Some(risk);
        self
    }
}
