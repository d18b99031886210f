//! Ledger engine: simulated positions, persistence, and the poll loop.

pub mod paper;
pub mod runner;
pub mod snapshot;

pub use paper::{PaperTradingEngine, TradeSettings, TradingStats};
pub use snapshot::{load_snapshot, save_snapshot, LedgerSnapshot};
