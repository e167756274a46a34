//! Error taxonomy for the statistics backend.
//!
//! Load-time failures ([`ConfigError`]) disable one statfile's backend and
//! nothing else. Everything that can go wrong per request resolves locally to
//! a `Result` returned to the caller; no error crosses the backend boundary
//! uncaught.

use thiserror::Error;

use super::runtime::ClassId;
use super::store::StoreError;

/// Load-time configuration failure. Fatal to this statfile only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
    #[error("store initialization failed for {symbol}: {source}")]
    StoreInit {
        symbol: String,
        source: StoreError,
    },
}

/// The object-name pattern produced an empty name for this message.
///
/// Typically a per-user statfile checked with no recipient and no user
/// string. Aborts the check on this backend for this message only.
#[derive(Debug, Error)]
#[error("object name expansion failed for {symbol} (per-user statfile with no user or recipient?)")]
pub struct ExpansionError {
    pub symbol: String,
}

/// Per-request backend failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
    /// The opposite-class runtime was missing when a classify reply arrived.
    /// An internal defect: the pairing step guarantees the sibling exists for
    /// the lifetime of the request.
    #[error("no {class} runtime registered for {object} at completion")]
    ProtocolInvariant { object: String, class: ClassId },
}
