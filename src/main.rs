//! # Atmos — ATM Option Paper Trading
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐   SignalEvent (mpsc)    ┌─────────────────────────┐
//!  │  Strategy    │ ────────────────────────▶│  Runner (poll loop)     │
//!  │  producers   │                          │                         │
//!  └──────────────┘                          │  PremiumResolver        │──▶ XTS gateway
//!                                            │   master · quotes ·     │    (login, master,
//!                                            │   estimator fallback    │     quotes)
//!                                            │                         │
//!                                            │  PaperTradingEngine     │──▶ paper_trades.json
//!                                            └─────────────────────────┘    (atomic snapshot)
//! ```
//!
//! ## Environment Variables
//!
//! | Variable             | Default              | Description                     |
//! |----------------------|----------------------|---------------------------------|
//! | `XTS_BASE_URL`       | (required)           | Broker gateway base URL         |
//! | `XTS_APP_KEY`        | (required)           | API key                         |
//! | `XTS_SECRET_KEY`     | (required)           | API secret                      |
//! | `UNDERLYING`         | `NIFTY`              | NIFTY / GOLDM / GOLD / CRUDEOIL |
//! | `INITIAL_CAPITAL`    | `100000`             | Starting paper capital          |
//! | `POLL_INTERVAL_SECS` | `60`                 | Mark/update cadence             |
//! | `LEDGER_PATH`        | `paper_trades.json`  | Snapshot file                   |
//! | `RUST_LOG`           | `atmos=info`         | Tracing filter                  |

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use atmos::broker::{HttpTransport, InstrumentMaster, QuoteClient, SessionManager};
use atmos::config::AppConfig;
use atmos::engine::paper::{PaperTradingEngine, TradeSettings};
use atmos::engine::{load_snapshot, runner};
use atmos::models::SignalEvent;
use atmos::premium::PremiumResolver;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional — CI/prod can use real env vars) ──────────────
    dotenvy::dotenv().ok();

    // ── 2. Initialise structured logging ─────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("atmos=debug".parse()?)
            .add_directive("reqwest=warn".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        ATMOS — ATM Option Paper Trader        ║
  ║        XTS gateway  ·  Simulated ledger       ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Configuration ──────────────────────────────────────────────────────
    let config = AppConfig::from_env().context("loading configuration")?;
    info!(
        "📍 Underlying {} | capital {:.2} | poll {}s | ledger {}",
        config.underlying.symbol,
        config.initial_capital,
        config.poll_interval.as_secs(),
        config.snapshot_path.display()
    );

    // ── 4. Broker plumbing ────────────────────────────────────────────────────
    let transport = Arc::new(
        HttpTransport::new(config.credentials.base_url.clone())
            .context("building HTTP transport")?,
    );
    let session = Arc::new(SessionManager::new(
        transport.clone(),
        config.credentials.clone(),
        config.token_refresh_secs,
    ));
    let master = Arc::new(InstrumentMaster::new(
        transport.clone(),
        session.clone(),
        config.underlying.clone(),
    ));

    // Broker failures at startup are survivable: the premium layer degrades
    // to its analytic estimator until connectivity returns.
    match session.ensure_fresh().await {
        Ok(_) => match master.initialize().await {
            Ok(()) => {}
            Err(e) => warn!("⚠️ Instrument master unavailable, estimation-only mode: {e}"),
        },
        Err(e) => warn!("⚠️ Broker login failed, estimation-only mode: {e}"),
    }

    let resolver = PremiumResolver::new(
        master,
        QuoteClient::new(transport, session),
        config.underlying.clone(),
    );

    // ── 5. Ledger: resume from snapshot when one exists ──────────────────────
    let engine = if config.snapshot_path.exists() {
        load_snapshot(&config.snapshot_path)
            .context("restoring ledger snapshot")?
            .restore()
    } else {
        let settings = TradeSettings {
            margin_fraction: config.margin_fraction,
            ..TradeSettings::default()
        };
        PaperTradingEngine::new(config.initial_capital, settings)
    };

    // ── 6. Signal intake ──────────────────────────────────────────────────────
    // Producers (strategy processes, an ops CLI, a future HTTP surface) push
    // SignalEvents through this channel.
    let (_signal_tx, signal_rx) = mpsc::channel::<SignalEvent>(64);

    // ── 7. Run until Ctrl-C ───────────────────────────────────────────────────
    runner::run(
        resolver,
        engine,
        signal_rx,
        config.poll_interval,
        config.snapshot_path,
    )
    .await
    .context("poll loop failed")?;

    Ok(())
}
