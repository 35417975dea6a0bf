//! Error types for the SCEAU ledger.
//!
//! Only infrastructure failures are errors.  A broken chain or a compromised
//! record is an operational fact and travels as data (`VerificationResult`,
//! `ChainVerificationReport`), never through this type.

use thiserror::Error;

/// The unified error type for the SCEAU crates.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The durable store is unreachable, timed out, or rejected the write.
    ///
    /// An append that fails with this error left nothing behind: the record
    /// is either fully committed or fully absent.
    #[error("storage error: {reason}")]
    Storage { reason: String, retryable: bool },

    /// Another appender extended the same chain scope mid-transaction.
    ///
    /// Retry the whole append; the previous hash is re-read on every attempt.
    #[error("concurrent append detected on chain scope '{scope}'")]
    ChainRace { scope: String },

    /// No record with the given id exists in the scope.
    #[error("record {id} not found in scope '{scope}'")]
    RecordNotFound { scope: String, id: u64 },

    /// The record already carries a different external anchor.
    #[error("record {id} is already anchored to a different external reference")]
    AnchorConflict { id: u64 },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A caller passed a value the ledger cannot record.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl LedgerError {
    /// Build a storage error that the caller may retry.
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Return true when retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { retryable, .. } => *retryable,
            Self::ChainRace { .. } => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the SCEAU crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
