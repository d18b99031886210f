//! # premium
//!
//! Premium acquisition for one option contract. The resolver never fails:
//! exact strike lookup, then the nearest same-type strike, then a live quote,
//! and finally a deterministic analytic estimate. Whatever happens upstream,
//! a signal always gets a tradable entry premium.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::master::InstrumentMaster;
use crate::broker::quotes::QuoteClient;
use crate::broker::transport::BrokerTransport;
use crate::config::{SpotSource, UnderlyingDescriptor};
use crate::models::{OptionType, Quote};

// ─── Resolved premium ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumSource {
    /// Last traded price from a live quote.
    Live,
    /// Instrument had no trade today; previous close used.
    LastClose,
    /// Analytic estimate (no contract, no quote, or broker down).
    Estimated,
}

#[derive(Debug, Clone)]
pub struct ResolvedPremium {
    pub premium:       f64,
    /// Strike actually used (may differ from the requested one when the
    /// chain had no exact match).
    pub strike:        i64,
    pub option_type:   OptionType,
    pub instrument_id: Option<i64>,
    pub expiry:        Option<String>,
    pub source:        PremiumSource,
    pub lot_size:      u32,
}

// ─── Analytic estimator ───────────────────────────────────────────────────────

/// Deterministic premium model: intrinsic value plus a time value that decays
/// with distance from the money, measured in strike steps.
///
/// Decay is piecewise linear: 1.0 → 0.7 over the first step, 0.7 → 0.3 out to
/// three steps, 0.3 → 0.1 out to six, then a flat 0.1 tail for deep
/// out-of-the-money strikes.
pub fn estimate_premium(
    descriptor: &UnderlyingDescriptor,
    spot: f64,
    strike: i64,
    option_type: OptionType,
) -> f64 {
    let strike_f = strike as f64;
    let intrinsic = match option_type {
        OptionType::CE => (spot - strike_f).max(0.0),
        OptionType::PE => (strike_f - spot).max(0.0),
    };

    let step = descriptor.strike_step as f64;
    let steps_away = (strike_f - descriptor.atm_strike(spot) as f64).abs() / step;
    let decay = if steps_away <= 1.0 {
        1.0 - 0.3 * steps_away
    } else if steps_away <= 3.0 {
        0.7 - 0.2 * (steps_away - 1.0)
    } else if steps_away <= 6.0 {
        0.3 - (0.2 / 3.0) * (steps_away - 3.0)
    } else {
        0.1
    };
    let time_value = spot * descriptor.estimator.atm_premium_pct * decay;

    let tick = descriptor.estimator.tick_size;
    let rounded = ((intrinsic + time_value) / tick).round() * tick;
    rounded.max(descriptor.estimator.min_premium).max(intrinsic)
}

// ─── PremiumResolver ──────────────────────────────────────────────────────────

pub struct PremiumResolver<T: BrokerTransport> {
    master:     Arc<InstrumentMaster<T>>,
    quotes:     QuoteClient<T>,
    descriptor: UnderlyingDescriptor,
}

impl<T: BrokerTransport> PremiumResolver<T> {
    pub fn new(
        master: Arc<InstrumentMaster<T>>,
        quotes: QuoteClient<T>,
        descriptor: UnderlyingDescriptor,
    ) -> Self {
        Self { master, quotes, descriptor }
    }

    pub fn descriptor(&self) -> &UnderlyingDescriptor {
        &self.descriptor
    }

    /// Underlying reference price: the configured index quote, or the nearest
    /// futures contracts probed in expiry order. `None` when the broker is
    /// unreachable; callers fall back to their last known spot.
    pub async fn spot_price(&self) -> Option<f64> {
        match self.descriptor.spot_source {
            SpotSource::Index { segment, instrument_id } => self
                .quotes
                .get_quote(segment, instrument_id)
                .await
                .as_ref()
                .and_then(Quote::usable_price),
            SpotSource::NearestFuture => {
                for future in self.master.nearest_futures(3).await {
                    let quote = self
                        .quotes
                        .get_quote(self.descriptor.quote_segment, future.instrument_id)
                        .await;
                    if let Some(price) = quote.as_ref().and_then(Quote::usable_price) {
                        return Some(price);
                    }
                    debug!("📍 Future {} gave no price, probing next", future.name);
                }
                None
            }
        }
    }

    /// Resolve a premium for `strike`/`option_type` given the current spot.
    pub async fn resolve_premium(
        &self,
        strike: i64,
        option_type: OptionType,
        spot: f64,
    ) -> ResolvedPremium {
        let record = match self.master.lookup(strike, option_type).await {
            Some(record) => Some(record),
            None => {
                let nearest = self.master.nearest_same_type(strike, option_type).await;
                if let Some(ref r) = nearest {
                    debug!(
                        "📍 No {} {} contract at {}, using nearest strike {}",
                        self.descriptor.symbol, option_type, strike, r.strike
                    );
                }
                nearest
            }
        };

        if let Some(record) = record {
            let quote = self
                .quotes
                .get_quote(self.descriptor.quote_segment, record.instrument_id)
                .await;
            if let Some(quote) = quote {
                if let Some(price) = quote.usable_price() {
                    let source = if quote.ltp > 0.0 {
                        PremiumSource::Live
                    } else {
                        PremiumSource::LastClose
                    };
                    return ResolvedPremium {
                        premium: price,
                        strike: record.strike,
                        option_type,
                        instrument_id: Some(record.instrument_id),
                        expiry: Some(record.expiry.clone()),
                        source,
                        lot_size: record.lot_size,
                    };
                }
            }
            warn!(
                "⚠️ No quote for {} ({}), estimating premium",
                record.display_name, record.instrument_id
            );
            return ResolvedPremium {
                premium: estimate_premium(&self.descriptor, spot, record.strike, option_type),
                strike: record.strike,
                option_type,
                instrument_id: Some(record.instrument_id),
                expiry: Some(record.expiry.clone()),
                source: PremiumSource::Estimated,
                lot_size: record.lot_size,
            };
        }

        // Estimation-only mode: no master cache at all.
        ResolvedPremium {
            premium: estimate_premium(&self.descriptor, spot, strike, option_type),
            strike,
            option_type,
            instrument_id: None,
            expiry: None,
            source: PremiumSource::Estimated,
            lot_size: self.master.lot_size().await,
        }
    }

    /// Resolve the at-the-money contract for a directional signal.
    pub async fn resolve_atm(&self, option_type: OptionType, spot: f64) -> ResolvedPremium {
        let strike = self.descriptor.atm_strike(spot);
        self.resolve_premium(strike, option_type, spot).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::broker::session::SessionManager;
    use crate::broker::transport::stub::{test_creds, StubTransport};
    use crate::broker::transport::QuoteResponse;
    use crate::error::AppError;

    fn nifty() -> UnderlyingDescriptor {
        UnderlyingDescriptor::nifty()
    }

    #[test]
    fn estimate_never_below_intrinsic_or_floor() {
        let d = nifty();
        // Deep in the money: dominated by intrinsic.
        let itm = estimate_premium(&d, 25254.3, 24500, OptionType::CE);
        assert!(itm >= 25254.3 - 24500.0);
        // Deep out of the money: floored at min_premium.
        let otm = estimate_premium(&d, 25254.3, 27500, OptionType::CE);
        assert!(otm >= d.estimator.min_premium);
        assert!(otm.is_finite());
    }

    #[test]
    fn estimate_decays_with_distance() {
        let d = nifty();
        let spot = 25250.0;
        let atm = estimate_premium(&d, spot, 25250, OptionType::PE);
        let one_out = estimate_premium(&d, spot, 25200, OptionType::PE);
        let three_out = estimate_premium(&d, spot, 25100, OptionType::PE);
        assert!(atm > one_out);
        assert!(one_out > three_out);
    }

    #[test]
    fn estimate_rounds_to_tick() {
        let d = nifty();
        let premium = estimate_premium(&d, 25254.3, 25250, OptionType::CE);
        let ticks = premium / d.estimator.tick_size;
        assert!((ticks - ticks.round()).abs() < 1e-6);
    }

    // ── Resolver chain ──

    fn touchline(ltp: f64, close: f64) -> serde_json::Value {
        json!({ "Touchline": { "LastTradedPrice": ltp, "Close": close } })
    }

    fn master_blob() -> String {
        let expiry = (chrono::Utc::now() + chrono::Duration::days(3))
            .format("%Y-%m-%dT23:59:59")
            .to_string();
        let mut row = vec![String::from("-"); 20];
        row[0] = "NSEFO".into();
        row[1] = "49081".into();
        row[3] = "NIFTY".into();
        row[5] = "OPTIDX".into();
        row[13] = "65".into();
        row[16] = expiry;
        row[17] = "25000.000000".into();
        row[18] = "3".into();
        row[19] = "NIFTY 25000 CE".into();
        row.join("|")
    }

    async fn resolver_with(
        responses: Vec<Result<QuoteResponse, AppError>>,
        with_master: bool,
    ) -> PremiumResolver<StubTransport> {
        let transport = Arc::new(StubTransport::new(responses));
        let session = Arc::new(SessionManager::new(transport.clone(), test_creds(), 180));
        let master = Arc::new(InstrumentMaster::new(transport.clone(), session.clone(), nifty()));
        if with_master {
            master.rebuild_from_blob(&master_blob()).await.unwrap();
        }
        PremiumResolver::new(master, QuoteClient::new(transport, session), nifty())
    }

    #[tokio::test]
    async fn live_quote_wins() {
        let resolver = resolver_with(
            vec![Ok(QuoteResponse::Quotes(vec![touchline(112.4, 108.0)]))],
            true,
        )
        .await;
        let resolved = resolver.resolve_premium(25000, OptionType::CE, 25254.3).await;
        assert_eq!(resolved.source, PremiumSource::Live);
        assert_eq!(resolved.premium, 112.4);
        assert_eq!(resolved.instrument_id, Some(49081));
        assert_eq!(resolved.lot_size, 65);
    }

    #[tokio::test]
    async fn untraded_contract_uses_close() {
        let resolver = resolver_with(
            vec![Ok(QuoteResponse::Quotes(vec![touchline(0.0, 96.5)]))],
            true,
        )
        .await;
        let resolved = resolver.resolve_premium(25000, OptionType::CE, 25254.3).await;
        assert_eq!(resolved.source, PremiumSource::LastClose);
        assert_eq!(resolved.premium, 96.5);
    }

    #[tokio::test]
    async fn missing_strike_resolves_to_nearest_contract() {
        let resolver = resolver_with(
            vec![Ok(QuoteResponse::Quotes(vec![touchline(88.0, 85.0)]))],
            true,
        )
        .await;
        // Only 25000 CE exists in the cache.
        let resolved = resolver.resolve_premium(25250, OptionType::CE, 25254.3).await;
        assert_eq!(resolved.strike, 25000);
        assert_eq!(resolved.premium, 88.0);
    }

    #[tokio::test]
    async fn broker_dark_still_yields_positive_estimate() {
        let resolver = resolver_with(
            vec![
                Err(AppError::Transient("down".into())),
                Err(AppError::Transient("down".into())),
            ],
            false,
        )
        .await;
        let resolved = resolver.resolve_premium(25250, OptionType::PE, 25254.3).await;
        assert_eq!(resolved.source, PremiumSource::Estimated);
        assert!(resolved.premium > 0.0 && resolved.premium.is_finite());
        assert_eq!(resolved.instrument_id, None);
        // Descriptor default lot size in estimation-only mode.
        assert_eq!(resolved.lot_size, 65);
    }
}
