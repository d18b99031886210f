//! # atmos
//!
//! Automated at-the-money option paper trading against an XTS-style broker
//! gateway: session lifecycle, bulk instrument-master resolution, quote
//! retrieval with bounded retry, a deterministic premium estimator fallback,
//! and a persistent simulated ledger.

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod premium;
