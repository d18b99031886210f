//! # error
//!
//! Centralised application error type.
//!
//! Only genuine failures live here. Two outcomes the broker pipeline produces
//! routinely are deliberately *not* errors: "no live price available" is
//! absorbed by the premium estimator, and "insufficient capital" is a normal
//! `None` rejection from the paper engine with the ledger untouched.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Login was rejected by the broker, or the login call itself failed.
    /// Fails fast — never retried internally.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network / timeout / transport-level failure on a broker call.
    /// Callers get exactly one bounded retry before degrading.
    #[error("Transient broker failure: {0}")]
    Transient(String),

    /// The instrument master download failed or produced zero contracts.
    /// The system stays usable in estimation-only mode.
    #[error("Instrument master unavailable or empty")]
    EmptyMaster,

    /// Ledger snapshot could not be written or read.
    #[error("Ledger persistence error: {0}")]
    Persistence(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
