//! # engine::snapshot
//!
//! JSON-file persistence for the ledger. A snapshot is written atomically
//! (temp file, then rename) so a crash mid-write never leaves a truncated
//! ledger behind, and load/save round-trips are identical.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::paper::{PaperTradingEngine, TradeSettings};
use crate::error::AppError;
use crate::models::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub initial_capital: f64,
    pub current_capital: f64,
    pub open_positions:  Vec<Trade>,
    pub closed_trades:   Vec<Trade>,
    pub trade_counter:   u64,
    pub settings:        TradeSettings,
}

impl LedgerSnapshot {
    pub fn capture(engine: &PaperTradingEngine) -> Self {
        let (initial_capital, current_capital, open, closed, trade_counter, settings) =
            engine.raw_parts();
        Self {
            initial_capital,
            current_capital,
            open_positions: open.to_vec(),
            closed_trades: closed.to_vec(),
            trade_counter,
            settings,
        }
    }

    pub fn restore(self) -> PaperTradingEngine {
        PaperTradingEngine::from_raw_parts(
            self.initial_capital,
            self.current_capital,
            self.open_positions,
            self.closed_trades,
            self.trade_counter,
            self.settings,
        )
    }
}

/// Serialize and atomically replace the snapshot file.
pub fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| AppError::Persistence(format!("serialize: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| AppError::Persistence(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| AppError::Persistence(format!("rename to {}: {e}", path.display())))?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<LedgerSnapshot, AppError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| AppError::Persistence(format!("read {}: {e}", path.display())))?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&json)
        .map_err(|e| AppError::Persistence(format!("parse {}: {e}", path.display())))?;
    info!(
        "📂 Restored ledger: {} open, {} closed, capital {:.2}",
        snapshot.open_positions.len(),
        snapshot.closed_trades.len(),
        snapshot.current_capital
    );
    Ok(snapshot)
}
