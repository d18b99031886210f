//! # broker::master
//!
//! Bulk instrument-master handling: download the pipe-delimited segment blob
//! once, parse out the configured underlying's option chain and futures, pick
//! the active expiry, and serve strike lookups from memory afterwards.
//!
//! Parsing is lossy by design. The feed ships hundreds of thousands of rows
//! and a handful are always malformed; a bad row is skipped, never fatal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::broker::session::SessionManager;
use crate::broker::transport::BrokerTransport;
use crate::config::UnderlyingDescriptor;
use crate::error::AppError;
use crate::models::{FutureRecord, InstrumentRecord, OptionType, StrikeKey};

// Fixed column offsets of one master row. Rows shorter than the highest
// offset we touch are skipped.
const COL_INSTRUMENT_ID: usize = 1;
const COL_SYMBOL: usize = 3;
const COL_NAME: usize = 4;
const COL_SERIES: usize = 5;
const COL_LOT_SIZE: usize = 13;
const COL_EXPIRY: usize = 16;
const COL_STRIKE: usize = 17;
const COL_OPTION_TYPE: usize = 18;
const COL_DISPLAY_NAME: usize = 19;
const MIN_COLS: usize = 20;

// ─── Row parsing ──────────────────────────────────────────────────────────────

fn parse_option_row(fields: &[&str], descriptor: &UnderlyingDescriptor) -> Option<InstrumentRecord> {
    if fields.len() < MIN_COLS {
        return None;
    }
    if fields[COL_SYMBOL] != descriptor.symbol || fields[COL_SERIES] != descriptor.option_series {
        return None;
    }
    let option_type = OptionType::from_master_code(fields[COL_OPTION_TYPE])?;
    // Strikes arrive as float strings ("25000.000000") on some segments.
    let strike = fields[COL_STRIKE].parse::<f64>().ok()?;
    if strike <= 0.0 {
        return None;
    }
    Some(InstrumentRecord {
        instrument_id: fields[COL_INSTRUMENT_ID].parse().ok()?,
        strike: strike.round() as i64,
        option_type,
        expiry: fields[COL_EXPIRY].to_string(),
        lot_size: fields[COL_LOT_SIZE].parse().unwrap_or(descriptor.default_lot_size),
        display_name: fields[COL_DISPLAY_NAME].to_string(),
        symbol: fields[COL_SYMBOL].to_string(),
    })
}

fn parse_future_row(fields: &[&str], descriptor: &UnderlyingDescriptor) -> Option<FutureRecord> {
    if fields.len() < MIN_COLS {
        return None;
    }
    if fields[COL_SYMBOL] != descriptor.symbol || fields[COL_SERIES] != descriptor.futures_series {
        return None;
    }
    Some(FutureRecord {
        instrument_id: fields[COL_INSTRUMENT_ID].parse().ok()?,
        name: fields[COL_NAME].to_string(),
        expiry: fields[COL_EXPIRY].to_string(),
        symbol: fields[COL_SYMBOL].to_string(),
    })
}

/// Pick the active expiry from the distinct expiries found in the chain:
/// the earliest that is today or later. When every expiry already passed
/// (stale feed, holiday gap) the latest one is used and the cache is marked
/// degraded. Returns `(expiry, degraded)`.
fn select_expiry(mut expiries: Vec<String>, today: &str) -> Option<(String, bool)> {
    expiries.sort();
    expiries.dedup();
    // ISO timestamps compare correctly as strings on the date part.
    let live = expiries
        .iter()
        .find(|e| e.split('T').next().unwrap_or("") >= today)
        .cloned();
    match live {
        Some(expiry) => Some((expiry, false)),
        None => expiries.last().cloned().map(|e| (e, true)),
    }
}

// ─── Cache ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MasterCache {
    options:         HashMap<StrikeKey, InstrumentRecord>,
    futures:         Vec<FutureRecord>,
    selected_expiry: Option<String>,
}

/// In-memory option-chain cache for one underlying.
pub struct InstrumentMaster<T: BrokerTransport> {
    transport:  Arc<T>,
    session:    Arc<SessionManager<T>>,
    descriptor: UnderlyingDescriptor,
    cache:      RwLock<MasterCache>,
}

impl<T: BrokerTransport> InstrumentMaster<T> {
    pub fn new(
        transport: Arc<T>,
        session: Arc<SessionManager<T>>,
        descriptor: UnderlyingDescriptor,
    ) -> Self {
        Self { transport, session, descriptor, cache: RwLock::new(MasterCache::default()) }
    }

    /// Download and parse the segment master. Idempotent — a later call
    /// rebuilds the cache wholesale.
    pub async fn initialize(&self) -> Result<(), AppError> {
        let token = self.session.ensure_fresh().await?;
        let blob = self
            .transport
            .download_master(&token, &self.descriptor.master_segment)
            .await?;
        self.rebuild_from_blob(&blob).await
    }

    /// Parse `blob` and replace the cache. Fails with `EmptyMaster` when no
    /// contract for the configured underlying survives parsing.
    pub async fn rebuild_from_blob(&self, blob: &str) -> Result<(), AppError> {
        let mut parsed = Vec::new();
        let mut futures = Vec::new();
        for line in blob.lines() {
            let fields: Vec<&str> = line.split('|').collect();
            if let Some(record) = parse_option_row(&fields, &self.descriptor) {
                parsed.push(record);
            } else if let Some(future) = parse_future_row(&fields, &self.descriptor) {
                futures.push(future);
            }
        }
        if parsed.is_empty() {
            return Err(AppError::EmptyMaster);
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let expiries: Vec<String> = parsed.iter().map(|r| r.expiry.clone()).collect();
        let Some((expiry, degraded)) = select_expiry(expiries, &today) else {
            return Err(AppError::EmptyMaster);
        };
        if degraded {
            warn!(
                "⚠️ Every {} expiry is in the past, using latest: {}",
                self.descriptor.symbol, expiry
            );
        }

        let mut options = HashMap::new();
        for record in parsed.into_iter().filter(|r| r.expiry == expiry) {
            options.insert(StrikeKey::new(record.strike, record.option_type), record);
        }
        futures.sort_by(|a, b| a.expiry.cmp(&b.expiry));

        info!(
            "✅ Instrument master ready: {} {} strikes, {} futures, expiry {}",
            options.len(),
            self.descriptor.symbol,
            futures.len(),
            expiry
        );

        let mut cache = self.cache.write().await;
        cache.options = options;
        cache.futures = futures;
        cache.selected_expiry = Some(expiry);
        Ok(())
    }

    pub async fn is_ready(&self) -> bool {
        self.cache.read().await.selected_expiry.is_some()
    }

    pub async fn selected_expiry(&self) -> Option<String> {
        self.cache.read().await.selected_expiry.clone()
    }

    /// Exact strike lookup within the selected expiry.
    pub async fn lookup(&self, strike: i64, option_type: OptionType) -> Option<InstrumentRecord> {
        self.cache
            .read()
            .await
            .options
            .get(&StrikeKey::new(strike, option_type))
            .cloned()
    }

    /// Closest available strike of the same option type. Equidistant
    /// neighbours resolve to the lower strike.
    pub async fn nearest_same_type(
        &self,
        strike: i64,
        option_type: OptionType,
    ) -> Option<InstrumentRecord> {
        let cache = self.cache.read().await;
        cache
            .options
            .values()
            .filter(|r| r.option_type == option_type)
            .min_by_key(|r| ((r.strike - strike).abs(), r.strike))
            .cloned()
    }

    /// Up to `limit` futures by ascending expiry, for spot-proxy probing.
    pub async fn nearest_futures(&self, limit: usize) -> Vec<FutureRecord> {
        self.cache.read().await.futures.iter().take(limit).cloned().collect()
    }

    /// Lot size of any cached contract, or the descriptor default.
    pub async fn lot_size(&self) -> u32 {
        self.cache
            .read()
            .await
            .options
            .values()
            .next()
            .map(|r| r.lot_size)
            .unwrap_or(self.descriptor.default_lot_size)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::broker::transport::stub::{test_creds, StubTransport};

    fn iso(days_from_now: i64) -> String {
        (Utc::now() + Duration::days(days_from_now))
            .format("%Y-%m-%dT23:59:59")
            .to_string()
    }

    fn row(id: i64, symbol: &str, series: &str, lot: u32, expiry: &str, strike: &str, ot: &str) -> String {
        // 20 columns, only the offsets the parser reads are meaningful.
        let mut cols = vec![String::from("-"); MIN_COLS];
        cols[0] = "NSEFO".into();
        cols[COL_INSTRUMENT_ID] = id.to_string();
        cols[COL_SYMBOL] = symbol.into();
        cols[COL_NAME] = format!("{symbol} {series}");
        cols[COL_SERIES] = series.into();
        cols[COL_LOT_SIZE] = lot.to_string();
        cols[COL_EXPIRY] = expiry.into();
        cols[COL_STRIKE] = strike.into();
        cols[COL_OPTION_TYPE] = ot.into();
        cols[COL_DISPLAY_NAME] = format!("{symbol} {strike} {ot}");
        cols.join("|")
    }

    async fn master_with(blob: &str) -> InstrumentMaster<StubTransport> {
        let transport = Arc::new(StubTransport::new(vec![]));
        let session = Arc::new(SessionManager::new(transport.clone(), test_creds(), 180));
        let master = InstrumentMaster::new(
            transport,
            session,
            crate::config::UnderlyingDescriptor::nifty(),
        );
        master.rebuild_from_blob(blob).await.unwrap();
        master
    }

    #[tokio::test]
    async fn parses_chain_and_selects_nearest_live_expiry() {
        let near = iso(2);
        let far = iso(9);
        let blob = [
            row(49081, "NIFTY", "OPTIDX", 65, &near, "25000.000000", "3"),
            row(49082, "NIFTY", "OPTIDX", 65, &near, "25000.000000", "4"),
            row(49083, "NIFTY", "OPTIDX", 65, &far, "25000.000000", "3"),
            row(49090, "BANKNIFTY", "OPTIDX", 30, &near, "52000", "3"),
            "short|row".to_string(),
        ]
        .join("\n");

        let master = master_with(&blob).await;
        assert_eq!(master.selected_expiry().await, Some(near));
        assert_eq!(master.lot_size().await, 65);

        let ce = master.lookup(25000, OptionType::CE).await.unwrap();
        assert_eq!(ce.instrument_id, 49081);
        // The far-expiry contract is excluded from the active chain.
        assert!(master.lookup(52000, OptionType::CE).await.is_none());
    }

    #[tokio::test]
    async fn nearest_strike_prefers_lower_on_tie() {
        let near = iso(2);
        let blob = [
            row(1, "NIFTY", "OPTIDX", 65, &near, "25000", "3"),
            row(2, "NIFTY", "OPTIDX", 65, &near, "25100", "3"),
            row(3, "NIFTY", "OPTIDX", 65, &near, "25200", "4"),
        ]
        .join("\n");

        let master = master_with(&blob).await;
        // 25050 is equidistant from 25000 and 25100.
        let pick = master.nearest_same_type(25050, OptionType::CE).await.unwrap();
        assert_eq!(pick.strike, 25000);
        // Type filter holds: nearest CE to 25200 is still a CE.
        let pick = master.nearest_same_type(25200, OptionType::CE).await.unwrap();
        assert_eq!(pick.strike, 25100);
    }

    #[tokio::test]
    async fn stale_feed_falls_back_to_latest_expiry() {
        let old_a = iso(-10);
        let old_b = iso(-3);
        let blob = [
            row(1, "NIFTY", "OPTIDX", 65, &old_a, "25000", "3"),
            row(2, "NIFTY", "OPTIDX", 65, &old_b, "25000", "3"),
        ]
        .join("\n");

        let master = master_with(&blob).await;
        assert_eq!(master.selected_expiry().await, Some(old_b));
    }

    #[tokio::test]
    async fn futures_sorted_by_expiry() {
        let near = iso(2);
        let blob = [
            row(10, "NIFTY", "FUTIDX", 65, &iso(40), "0.01", "-"),
            row(11, "NIFTY", "FUTIDX", 65, &iso(12), "0.01", "-"),
            row(1, "NIFTY", "OPTIDX", 65, &near, "25000", "3"),
        ]
        .join("\n");

        let master = master_with(&blob).await;
        let futs = master.nearest_futures(3).await;
        assert_eq!(futs.len(), 2);
        assert_eq!(futs[0].instrument_id, 11);
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let session = Arc::new(SessionManager::new(transport.clone(), test_creds(), 180));
        let master = InstrumentMaster::new(
            transport,
            session,
            crate::config::UnderlyingDescriptor::nifty(),
        );
        let blob = row(9, "BANKNIFTY", "OPTIDX", 30, &iso(2), "52000", "3");
        assert!(matches!(
            master.rebuild_from_blob(&blob).await,
            Err(AppError::EmptyMaster)
        ));
    }
}
