//! # broker::quotes
//!
//! Touchline quote retrieval with a bounded retry. Quote entries come back in
//! two shapes depending on gateway version: a JSON-encoded *string* or a
//! native object. Both normalise to the same `Quote`.
//!
//! Retry policy: one original attempt plus exactly one retry, and the retry
//! always forces a fresh session first. A second failure yields `None`; the
//! premium layer degrades to its estimator instead of blocking the poll loop.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::session::SessionManager;
use crate::broker::transport::{BrokerTransport, QuoteResponse};
use crate::models::Quote;

/// Original attempt + one forced-refresh retry.
const MAX_QUOTE_ATTEMPTS: u32 = 2;

// ─── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PriceLevel {
    #[serde(default)]
    price: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Touchline {
    #[serde(default)]
    last_traded_price:     f64,
    #[serde(default)]
    close:                 f64,
    #[serde(default)]
    open:                  f64,
    #[serde(default)]
    high:                  f64,
    #[serde(default)]
    low:                   f64,
    #[serde(default)]
    total_traded_quantity: f64,
    #[serde(default)]
    bid_info:              PriceLevel,
    #[serde(default)]
    ask_info:              PriceLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawQuote {
    touchline: Touchline,
}

/// Decode one `listQuotes` entry, tolerating both wire shapes.
fn normalize_entry(entry: &Value) -> Option<Quote> {
    let raw: RawQuote = match entry {
        Value::String(encoded) => serde_json::from_str(encoded).ok()?,
        Value::Object(_) => serde_json::from_value(entry.clone()).ok()?,
        _ => return None,
    };
    let t = raw.touchline;
    Some(Quote {
        ltp:    t.last_traded_price,
        close:  t.close,
        open:   t.open,
        high:   t.high,
        low:    t.low,
        bid:    t.bid_info.price,
        ask:    t.ask_info.price,
        volume: t.total_traded_quantity,
    })
}

// ─── QuoteClient ──────────────────────────────────────────────────────────────

pub struct QuoteClient<T: BrokerTransport> {
    transport: Arc<T>,
    session:   Arc<SessionManager<T>>,
}

impl<T: BrokerTransport> QuoteClient<T> {
    pub fn new(transport: Arc<T>, session: Arc<SessionManager<T>>) -> Self {
        Self { transport, session }
    }

    /// Fetch the touchline for one instrument. `None` means "no usable quote
    /// after the retry budget" and is never an error.
    pub async fn get_quote(&self, segment: u32, instrument_id: i64) -> Option<Quote> {
        for attempt in 0..MAX_QUOTE_ATTEMPTS {
            let token = if attempt == 0 {
                self.session.ensure_fresh().await
            } else {
                self.session.force_refresh().await
            };
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    warn!("⛔ Cannot obtain session for quote {instrument_id}: {e}");
                    continue;
                }
            };

            match self.transport.fetch_quotes(&token, segment, instrument_id).await {
                Ok(QuoteResponse::Quotes(entries)) => {
                    let quote = entries.first().and_then(normalize_entry);
                    match quote {
                        // A flat-zero touchline shows up when the gateway
                        // serves an unsubscribed instrument. Retry once with
                        // a fresh session like any other failure.
                        Some(q) if q.ltp == 0.0 && q.close == 0.0 => {
                            debug!("📍 Zero touchline for {instrument_id}, attempt {attempt}");
                        }
                        Some(q) => return Some(q),
                        None => {
                            debug!("📍 Empty quote list for {instrument_id}, attempt {attempt}");
                        }
                    }
                }
                Ok(QuoteResponse::Unauthorized) => {
                    warn!("⚠️ Quote {instrument_id} rejected 401/403, attempt {attempt}");
                }
                Ok(QuoteResponse::ApiError(desc)) => {
                    warn!("⚠️ Quote {instrument_id} API error: {desc}, attempt {attempt}");
                }
                Err(e) => {
                    warn!("⚠️ Quote {instrument_id} transport failure: {e}, attempt {attempt}");
                }
            }
        }
        debug!("📍 No usable quote for {instrument_id} after {MAX_QUOTE_ATTEMPTS} attempts");
        None
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
