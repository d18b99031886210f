//! # models::instrument
//!
//! Contract metadata produced by parsing the broker's bulk instrument master,
//! plus the touchline quote snapshot. These are intentionally flat and
//! `Clone`-able — the resolver cache is rebuilt wholesale on refresh and
//! records are handed out by value.

use serde::{Deserialize, Serialize};

// ─── OptionType ───────────────────────────────────────────────────────────────

/// CE = call, PE = put. The master feed encodes these as `3` / `4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    CE,
    PE,
}

impl OptionType {
    /// Decode the option-type column of a master record. Anything other than
    /// the two known codes is a malformed record and gets skipped upstream.
    pub fn from_master_code(code: &str) -> Option<Self> {
        match code {
            "3" => Some(OptionType::CE),
            "4" => Some(OptionType::PE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::CE => "CE",
            OptionType::PE => "PE",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── StrikeKey ────────────────────────────────────────────────────────────────

/// Typed cache key: one strike of one option type within the selected expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrikeKey {
    pub strike:      i64,
    pub option_type: OptionType,
}

impl StrikeKey {
    pub fn new(strike: i64, option_type: OptionType) -> Self {
        Self { strike, option_type }
    }
}

// ─── InstrumentRecord ─────────────────────────────────────────────────────────

/// One tradable option contract as parsed from the bulk feed.
///
/// Source-agnostic: the primary producer is the pipe-delimited master
/// download, but a string-keyed lookup endpoint could populate the same
/// record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    /// Numeric ExchangeInstrumentID used for quote requests.
    pub instrument_id: i64,
    pub strike:        i64,
    pub option_type:   OptionType,
    /// Expiry timestamp exactly as the feed delivers it (ISO, e.g.
    /// `2026-02-26T23:59:59`).
    pub expiry:        String,
    pub lot_size:      u32,
    /// Human-readable name, e.g. `"GOLDM 26FEB2026 CE 155000"`.
    pub display_name:  String,
    pub symbol:        String,
}

// ─── FutureRecord ─────────────────────────────────────────────────────────────

/// A futures contract used as a spot-price proxy for underlyings with no
/// directly quotable index (commodities).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureRecord {
    pub instrument_id: i64,
    pub name:          String,
    pub expiry:        String,
    pub symbol:        String,
}

// ─── Quote ────────────────────────────────────────────────────────────────────

/// Normalised touchline snapshot. Ephemeral — never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quote {
    pub ltp:    f64,
    pub close:  f64,
    pub open:   f64,
    pub high:   f64,
    pub low:    f64,
    pub bid:    f64,
    pub ask:    f64,
    pub volume: f64,
}

impl Quote {
    /// Best usable price: LTP when the instrument traded, else the previous
    /// close. `None` when the broker served an empty subscription.
    pub fn usable_price(&self) -> Option<f64> {
        if self.ltp > 0.0 {
            Some(self.ltp)
        } else if self.close > 0.0 {
            Some(self.close)
        } else {
            None
        }
    }
}
