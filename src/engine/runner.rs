//! # engine::runner
//!
//! The polling loop that ties broker and ledger together: drain inbound
//! signals, resolve one spot per cycle, mark every open position against the
//! same cycle's prices, then flush the ledger to disk. Ctrl-C flushes once
//! more and exits cleanly.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::broker::transport::BrokerTransport;
use crate::engine::paper::PaperTradingEngine;
use crate::engine::snapshot::{save_snapshot, LedgerSnapshot};
use crate::error::AppError;
use crate::models::SignalEvent;
use crate::premium::PremiumResolver;

pub async fn run<T: BrokerTransport>(
    resolver: PremiumResolver<T>,
    mut engine: PaperTradingEngine,
    mut signals: mpsc::Receiver<SignalEvent>,
    poll_interval: Duration,
    snapshot_path: PathBuf,
) -> Result<(), AppError> {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Marks fall back to this when the broker goes dark mid-session.
    let mut last_spot: Option<f64> = None;

    info!("🚀 Poll loop started, interval {}s", poll_interval.as_secs());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(spot) = resolver.spot_price().await {
                    last_spot = Some(spot);
                } else {
                    warn!("⚠️ No spot price this cycle, using last known {:?}", last_spot);
                }

                // Intake. Signals queued since the last tick are processed
                // against this cycle's spot.
                while let Ok(signal) = signals.try_recv() {
                    let Some(spot) = last_spot else {
                        warn!("⛔ Dropping signal {}: no spot price seen yet", signal.signal_id);
                        continue;
                    };
                    let resolved = resolver
                        .resolve_atm(signal.signal_type.option_type(), spot)
                        .await;
                    info!(
                        "📍 Signal {:?} from {} → {} {} @ {:.2} ({:?})",
                        signal.signal_type, signal.strategy, resolved.strike,
                        resolved.option_type, resolved.premium, resolved.source
                    );
                    engine.open_from_signal(&signal, &resolved, spot);
                }

                // Resolve every mark before touching the ledger so one cycle
                // judges all positions against the same prices.
                let mut marks = Vec::with_capacity(engine.open_positions().len());
                for trade in engine.open_positions() {
                    let spot = last_spot.unwrap_or(trade.spot_at_entry);
                    let resolved = resolver
                        .resolve_premium(trade.strike, trade.option_type, spot)
                        .await;
                    marks.push((trade.trade_id.clone(), resolved.premium));
                }
                let closed = engine.update_positions(&marks);
                if !closed.is_empty() {
                    let stats = engine.statistics();
                    info!(
                        "📊 {} closed this cycle | capital {:.2}, win rate {:.1}%",
                        closed.len(), stats.current_capital, stats.win_rate
                    );
                }

                if let Err(e) = save_snapshot(&snapshot_path, &LedgerSnapshot::capture(&engine)) {
                    error!("⛔ Snapshot write failed: {e}");
                }
            }
            _ = &mut ctrl_c => {
                info!("🛑 Shutdown requested, flushing ledger");
                save_snapshot(&snapshot_path, &LedgerSnapshot::capture(&engine))?;
                let stats = engine.statistics();
                info!(
                    "📊 Final: capital {:.2} ({} open, {} closed, realized {:.2})",
                    stats.current_capital, stats.open_trades,
                    stats.closed_trades, stats.realized_pnl
                );
                return Ok(());
            }
        }
    }
}
