//! Domain models shared across the trading core.

pub mod instrument;
pub mod signal;
pub mod trade;

pub use instrument::{FutureRecord, InstrumentRecord, OptionType, Quote, StrikeKey};
pub use signal::{RiskParams, SignalEvent};
pub use trade::{SignalType, Trade, TradeStatus};
