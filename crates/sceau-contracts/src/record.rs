//! Chain-level identifiers shared by both ledgers.
//!
//! A chain scope is the set of records over which hash linkage is enforced:
//! the audit ledger uses one global scope, the document integrity ledger uses
//! one scope per document type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Surrogate key assigned by the store at insert time.  Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of records linked into one hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainScope {
    /// The single chain holding every audit record.
    Global,
    /// One independent chain per business document category (e.g. `devis`).
    DocumentType(String),
}

impl ChainScope {
    /// Reserved name of the global audit scope.
    pub const GLOBAL: &'static str = "global";

    /// Scope for one document type.
    pub fn document(document_type: impl Into<String>) -> Self {
        Self::DocumentType(document_type.into())
    }

    /// The key the store indexes this scope under.
    pub fn key(&self) -> &str {
        match self {
            Self::Global => Self::GLOBAL,
            Self::DocumentType(t) => t,
        }
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ChainScope {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LedgerError::InvalidInput {
                reason: "chain scope must not be empty".to_string(),
            });
        }
        if s == Self::GLOBAL {
            Ok(Self::Global)
        } else {
            Ok(Self::DocumentType(s.to_string()))
        }
    }
}

/// Digest algorithm a record was hashed with.
///
/// Stored with every record so verification keeps working after the default
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Identifier persisted alongside the record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of a hex-encoded digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            other => Err(LedgerError::InvalidInput {
                reason: format!("unsupported hash algorithm '{other}'"),
            }),
        }
    }
}

/// Position a store hands to a record builder inside an append transaction.
///
/// The id, timestamp and previous hash are fixed before the record is hashed,
/// and the record is inserted in the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSlot {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    /// `None` when the record becomes the head of an empty scope.
    pub previous_record_hash: Option<String>,
}

/// Resume point for an ordered `(timestamp, id)` scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    pub timestamp: DateTime<Utc>,
    pub id: RecordId,
}

/// Closed time interval used by history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }
}

/// Truncate a timestamp to the microsecond precision used for storage and
/// hashing, so a record read back from any store rehashes identically.
pub fn storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}
