//! Ledger persistence round-trips through the public API: a populated engine
//! snapshotted to disk and restored must be indistinguishable from the
//! original, and resumed trading must continue the id counter.

use atmos::engine::paper::{PaperTradingEngine, TradeSettings};
use atmos::engine::{load_snapshot, save_snapshot, LedgerSnapshot};
use atmos::models::{OptionType, SignalEvent, SignalType};
use atmos::premium::{PremiumSource, ResolvedPremium};

fn resolved(premium: f64, strike: i64, option_type: OptionType) -> ResolvedPremium {
    ResolvedPremium {
        premium,
        strike,
        option_type,
        instrument_id: Some(49081),
        expiry: Some("2026-09-24T23:59:59".to_string()),
        source: PremiumSource::Live,
        lot_size: 65,
    }
}

fn populated_engine() -> PaperTradingEngine {
    let mut engine = PaperTradingEngine::new(100_000.0, TradeSettings::default());
    let call = SignalEvent::new(SignalType::Call, "Bollinger+MACD");
    let put = SignalEvent::new(SignalType::Put, "RSI");

    // One trade that will close at target, one that stays open.
    let closing = engine
        .open_position(&call, &resolved(100.0, 25250, OptionType::CE), 25254.3, 100.0, 65, 70.0, 150.0)
        .unwrap()
        .trade_id
        .clone();
    engine
        .open_position(&put, &resolved(80.0, 25250, OptionType::PE), 25254.3, 80.0, 65, 56.0, 128.0)
        .unwrap();
    engine.update_positions(&[(closing, 150.0)]);

    assert_eq!(engine.open_positions().len(), 1);
    assert_eq!(engine.closed_trades().len(), 1);
    engine
}

#[test]
fn snapshot_round_trip_is_identity() {
    let engine = populated_engine();
    let path = std::env::temp_dir().join(format!("ledger-{}.json", uuid::Uuid::new_v4()));

    let before = LedgerSnapshot::capture(&engine);
    save_snapshot(&path, &before).unwrap();
    let after = load_snapshot(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(before, after);
}

#[test]
fn restored_engine_resumes_counter_and_capital() {
    let engine = populated_engine();
    let capital_before = engine.capital();

    let mut restored = LedgerSnapshot::capture(&engine).restore();
    assert_eq!(restored.capital(), capital_before);
    assert_eq!(restored.open_positions().len(), 1);

    // The id counter continues across the restart instead of reusing ids.
    let signal = SignalEvent::new(SignalType::Call, "Bollinger+MACD");
    let trade = restored
        .open_position(&signal, &resolved(50.0, 25300, OptionType::CE), 25302.0, 50.0, 65, 35.0, 80.0)
        .unwrap();
    assert_eq!(trade.trade_id, "BOL-0003");
}

#[test]
fn overwrite_replaces_previous_snapshot() {
    let path = std::env::temp_dir().join(format!("ledger-{}.json", uuid::Uuid::new_v4()));

    let empty = PaperTradingEngine::new(50_000.0, TradeSettings::default());
    save_snapshot(&path, &LedgerSnapshot::capture(&empty)).unwrap();

    let populated = populated_engine();
    save_snapshot(&path, &LedgerSnapshot::capture(&populated)).unwrap();

    let loaded = load_snapshot(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.initial_capital, 100_000.0);
    assert_eq!(loaded.closed_trades.len(), 1);
}
