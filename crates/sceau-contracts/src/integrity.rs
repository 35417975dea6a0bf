//! Document integrity types.
//!
//! Every legally significant document (quote, invoice, ...) has one current
//! integrity record in the chain of its document type.  Verification state,
//! external anchors and the `current` pointer are metadata: they change after
//! the digest is computed and are never part of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{HashAlgorithm, RecordId};

/// Outcome of the most recent integrity check on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Valid,
    Compromised,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Valid => "valid",
            Self::Compromised => "compromised",
        }
    }
}

/// Reference to an independently verifiable external ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRef {
    /// Which external ledger holds the anchor (e.g. "bitcoin", "polygon").
    pub network: String,
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub anchored_at: DateTime<Utc>,
}

/// A document signature to record, built by the document lifecycle service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSignature {
    /// Business document category, e.g. `devis` or `facture`.  Selects the chain.
    pub document_type: String,
    pub document_id: String,
    /// Human-facing document number, e.g. `DEV-2024-0007`.
    pub document_number: String,
    pub signature_payload: String,
    pub compliance_metadata: Value,
}

impl DocumentSignature {
    pub fn new(
        document_type: impl Into<String>,
        document_id: impl ToString,
        document_number: impl Into<String>,
        signature_payload: impl Into<String>,
    ) -> Self {
        Self {
            document_type: document_type.into(),
            document_id: document_id.to_string(),
            document_number: document_number.into(),
            signature_payload: signature_payload.into(),
            compliance_metadata: Value::Null,
        }
    }

    pub fn compliance_metadata(mut self, metadata: Value) -> Self {
        self.compliance_metadata = metadata;
        self
    }
}

/// One persisted row of a document type's integrity chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIntegrityRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub document_type: String,
    pub document_id: String,
    pub document_number: String,
    pub hash_algorithm: HashAlgorithm,
    pub signature_payload: String,
    /// Actor of the first record for this document.
    pub created_by: String,
    /// Actor of this record when it supersedes an earlier one.
    pub modified_by: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub compliance_metadata: Value,
    pub record_hash: String,
    pub previous_record_hash: Option<String>,

    // ── Not hashed ──
    pub verification_status: VerificationStatus,
    pub last_verification: Option<DateTime<Utc>>,
    pub anchor: Option<AnchorRef>,
    /// True for the newest record of its document.
    pub current: bool,
    pub archived: bool,
    /// Hashed columns the store could not decode as written.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreadable_fields: Vec<String>,
}

impl DocumentIntegrityRecord {
    pub fn integrity_valid(&self) -> bool {
        self.verification_status == VerificationStatus::Valid
    }
}

/// Result of re-hashing one stored integrity record.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    /// The recomputed digest matches `record_hash`.
    Valid(DocumentIntegrityRecord),
    /// The stored fields no longer produce `record_hash`.  Investigate; the
    /// record is left as is.
    Compromised(DocumentIntegrityRecord),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn record(&self) -> &DocumentIntegrityRecord {
        match self {
            Self::Valid(r) | Self::Compromised(r) => r,
        }
    }

    pub fn into_record(self) -> DocumentIntegrityRecord {
        match self {
            Self::Valid(r) | Self::Compromised(r) => r,
        }
    }
}
