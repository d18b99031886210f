//! # config
//!
//! Everything configurable lives here and is injected at construction — no
//! module-level credential globals. One `AppConfig` is read from the
//! environment at startup; one `UnderlyingDescriptor` parametrizes the whole
//! resolution pipeline for a single underlying (index, metal, energy), which
//! is what lets one generic resolver/engine replace a per-underlying class
//! zoo.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

// ─── Broker credentials ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct XtsCredentials {
    pub base_url:   String,
    pub app_key:    String,
    pub secret_key: String,
    /// Client source tag the broker expects on login, e.g. `"WEBAPI"`.
    pub source:     String,
}

// ─── Spot source ──────────────────────────────────────────────────────────────

/// Where the underlying's reference price comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotSource {
    /// The underlying has a directly quotable index (e.g. NIFTY 50 on the
    /// cash segment).
    Index { segment: u32, instrument_id: i64 },
    /// No index quote — use the nearest future as a proxy (commodities).
    NearestFuture,
}

// ─── Estimator calibration ────────────────────────────────────────────────────

/// Per-underlying constants for the analytic premium estimator.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorCalibration {
    /// Base at-the-money premium as a fraction of spot (NIFTY weeklies trade
    /// around 0.4 % of spot intraday; MCX metals nearer 2.5 %).
    pub atm_premium_pct: f64,
    /// Hard floor for any estimated premium.
    pub min_premium:     f64,
    /// Exchange tick size the estimate is rounded to.
    pub tick_size:       f64,
}

// ─── UnderlyingDescriptor ─────────────────────────────────────────────────────

/// Static description of one tradable underlying and its derivatives segment.
#[derive(Debug, Clone)]
pub struct UnderlyingDescriptor {
    /// Master-feed symbol filter, e.g. `"NIFTY"`, `"GOLDM"`.
    pub symbol:           String,
    /// Segment name for the bulk master download (`"NSEFO"`, `"MCXFO"`).
    pub master_segment:   String,
    /// Numeric segment for quote requests (2 = NSEFO, 51 = MCXFO).
    pub quote_segment:    u32,
    /// Option series code in the master (`"OPTIDX"`, `"OPTFUT"`).
    pub option_series:    String,
    /// Futures series code used for the spot proxy (`"FUTIDX"`, `"FUTCOM"`).
    pub futures_series:   String,
    pub spot_source:      SpotSource,
    /// Strike grid spacing.
    pub strike_step:      i64,
    /// Contract lot size when the master gives none.
    pub default_lot_size: u32,
    pub estimator:        EstimatorCalibration,
}

impl UnderlyingDescriptor {
    /// NIFTY 50 weekly index options on NSE F&O.
    pub fn nifty() -> Self {
        Self {
            symbol: "NIFTY".to_string(),
            master_segment: "NSEFO".to_string(),
            quote_segment: 2,
            option_series: "OPTIDX".to_string(),
            futures_series: "FUTIDX".to_string(),
            // NIFTY 50 index: NSE cash segment 1, instrument 26000.
            spot_source: SpotSource::Index { segment: 1, instrument_id: 26000 },
            strike_step: 50,
            default_lot_size: 65,
            estimator: EstimatorCalibration {
                atm_premium_pct: 0.004,
                min_premium: 5.0,
                tick_size: 0.05,
            },
        }
    }

    /// Gold Mini options on MCX (lot 10, 100-point strikes).
    pub fn goldm() -> Self {
        Self {
            symbol: "GOLDM".to_string(),
            master_segment: "MCXFO".to_string(),
            quote_segment: 51,
            option_series: "OPTFUT".to_string(),
            futures_series: "FUTCOM".to_string(),
            spot_source: SpotSource::NearestFuture,
            strike_step: 100,
            default_lot_size: 10,
            estimator: EstimatorCalibration {
                atm_premium_pct: 0.025,
                min_premium: 5.0,
                tick_size: 0.1,
            },
        }
    }

    /// Big Gold options on MCX (lot 100, 1000-point strikes).
    pub fn gold() -> Self {
        Self {
            symbol: "GOLD".to_string(),
            strike_step: 1000,
            default_lot_size: 100,
            ..Self::goldm()
        }
    }

    /// Crude Oil options on MCX.
    pub fn crudeoil() -> Self {
        Self {
            symbol: "CRUDEOIL".to_string(),
            strike_step: 50,
            default_lot_size: 100,
            estimator: EstimatorCalibration {
                atm_premium_pct: 0.03,
                min_premium: 5.0,
                tick_size: 0.1,
            },
            ..Self::goldm()
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "NIFTY" => Some(Self::nifty()),
            "GOLDM" => Some(Self::goldm()),
            "GOLD" => Some(Self::gold()),
            "CRUDEOIL" => Some(Self::crudeoil()),
            _ => None,
        }
    }

    /// Round spot to the nearest strike on this underlying's grid.
    pub fn atm_strike(&self, spot: f64) -> i64 {
        let step = self.strike_step as f64;
        ((spot / step).round() * step) as i64
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials:        XtsCredentials,
    pub underlying:         UnderlyingDescriptor,
    pub initial_capital:    f64,
    /// Cadence of the update loop that marks open positions.
    pub poll_interval:      Duration,
    /// Token age after which `ensure_fresh` re-logs in (advisory — actual
    /// invalidation is detected reactively from responses).
    pub token_refresh_secs: u64,
    pub snapshot_path:      PathBuf,
    /// Fraction of `premium × quantity` reserved as margin. 1.0 = full
    /// premium debit (buying the option outright).
    pub margin_fraction:    f64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("XTS_BASE_URL")
            .context("XTS_BASE_URL environment variable is required")?;
        let app_key = std::env::var("XTS_APP_KEY")
            .context("XTS_APP_KEY environment variable is required")?;
        let secret_key = std::env::var("XTS_SECRET_KEY")
            .context("XTS_SECRET_KEY environment variable is required")?;

        let underlying_name =
            std::env::var("UNDERLYING").unwrap_or_else(|_| "NIFTY".to_string());
        let Some(underlying) = UnderlyingDescriptor::from_name(&underlying_name) else {
            bail!("Unknown UNDERLYING: '{underlying_name}'. Use NIFTY, GOLDM, GOLD or CRUDEOIL");
        };

        Ok(Self {
            credentials: XtsCredentials {
                base_url,
                app_key,
                secret_key,
                source: std::env::var("XTS_SOURCE").unwrap_or_else(|_| "WEBAPI".to_string()),
            },
            underlying,
            initial_capital: env_f64("INITIAL_CAPITAL", 100_000.0),
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 60)),
            token_refresh_secs: env_u64("TOKEN_REFRESH_SECS", 180),
            snapshot_path: PathBuf::from(
                std::env::var("LEDGER_PATH").unwrap_or_else(|_| "paper_trades.json".to_string()),
            ),
            margin_fraction: env_f64("MARGIN_FRACTION", 1.0),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
