//! Chain verification report types.
//!
//! Reports list every anomaly found rather than stopping at the first one,
//! so operators can assess how much of a chain is affected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// A record whose `previous_record_hash` does not point at its predecessor.
///
/// For the first record of a scope the expected value is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMismatch {
    pub record_id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub expected_previous_hash: Option<String>,
    pub actual_previous_hash: Option<String>,
}

/// A record whose stored digest differs from the one recomputed from its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    pub record_id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub stored_hash: String,
    pub recomputed_hash: String,
}

/// The result of walking one chain scope in `(timestamp, id)` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationReport {
    pub scope: String,
    pub records_checked: usize,
    pub first_record_id: Option<RecordId>,
    pub last_record_id: Option<RecordId>,
    /// Linkage breaks, in chain order.
    pub mismatches: Vec<LinkMismatch>,
    /// Records whose content no longer matches their digest, in chain order.
    pub hash_mismatches: Vec<HashMismatch>,
    /// True when a `limit` stopped the walk before the end of the scope.
    pub truncated: bool,
    pub verified_at: DateTime<Utc>,
}

impl ChainVerificationReport {
    /// True when no linkage break and no content mismatch was found.
    pub fn is_intact(&self) -> bool {
        self.mismatches.is_empty() && self.hash_mismatches.is_empty()
    }
}

/// Summary of re-verifying every current record of one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeVerificationSummary {
    pub document_type: String,
    pub checked: usize,
    pub valid: usize,
    pub compromised: Vec<RecordId>,
}
