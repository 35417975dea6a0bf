//! The document integrity ledger.
//!
//! One hash chain per document type.  Each signed document has exactly one
//! current record; a modification appends a new record and retires the old
//! one through the non-hashed `current` flag.  Verification outcomes and
//! external anchors are metadata updates that never touch the digest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use sceau_config::LedgerConfig;
use sceau_contracts::{
    audit::{actor_or_system, RequestContext},
    error::{LedgerError, LedgerResult},
    integrity::{
        AnchorRef, DocumentIntegrityRecord, DocumentSignature, VerificationResult, VerificationStatus,
    },
    record::{storage_precision, ChainScope, ChainSlot, HashAlgorithm},
    verify::ScopeVerificationSummary,
};
use sceau_core::{
    link::append_with_retry, ChainLink, ChainRecord, ChainStore, Clock, IntegrityStore, SystemClock,
};

use crate::merkle::{merkle_proof, merkle_root, MerkleProof};

/// A batch member with its proof of inclusion under the anchored root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMember {
    pub record: DocumentIntegrityRecord,
    pub proof: MerkleProof,
}

/// Result of anchoring several records with one external transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoredBatch {
    pub merkle_root: String,
    pub anchor: AnchorRef,
    pub members: Vec<BatchMember>,
}

/// Hash-chained integrity records over an `IntegrityStore`.
pub struct DocumentIntegrityLedger<S: IntegrityStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    algorithm: HashAlgorithm,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl<S: IntegrityStore + ?Sized> DocumentIntegrityLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            algorithm: HashAlgorithm::default(),
            timeout: None,
            max_retries: 3,
        }
    }

    pub fn from_config(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self::new(store)
            .with_algorithm(config.hashing.algorithm)
            .with_timeout(Some(config.storage.timeout()))
            .with_max_retries(config.append.max_retries)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a document signature at the head of its document type's chain.
    ///
    /// The first record of a document is created by `actor`; later records
    /// keep the original `created_by` and set `modified_by` to `actor`.
    pub fn append(
        &self,
        signature: DocumentSignature,
        actor: &str,
        ctx: &RequestContext,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        validate(&signature)?;
        let actor = actor_or_system(actor);

        let previous = self
            .store
            .find_current(&signature.document_type, &signature.document_id)?;
        let (created_by, modified_by) = match previous {
            Some(p) => (p.created_by, Some(actor.to_string())),
            None => (actor.to_string(), None),
        };

        let scope = ChainScope::document(signature.document_type.clone());
        let algorithm = self.algorithm;
        let build = |slot: ChainSlot| {
            seal(&signature, &created_by, modified_by.as_deref(), ctx, algorithm, slot)
        };
        let result = append_with_retry(
            &*self.store,
            &scope,
            &*self.clock,
            self.timeout,
            self.max_retries,
            &build,
        );

        match &result {
            Ok(record) => debug!(
                scope = %scope,
                record_id = %record.id,
                document_id = %record.document_id,
                hash = %record.record_hash,
                "integrity record appended"
            ),
            Err(e) => error!(
                scope = %scope,
                document_id = %signature.document_id,
                error = %e,
                "integrity append failed"
            ),
        }
        result
    }

    /// The current record of a document.
    pub fn find_by_document(
        &self,
        document_type: &str,
        document_id: &str,
    ) -> LedgerResult<Option<DocumentIntegrityRecord>> {
        self.store.find_current(document_type, document_id)
    }

    /// Every record of a document, oldest first.
    pub fn history(&self, document_type: &str, document_id: &str) -> LedgerResult<Vec<DocumentIntegrityRecord>> {
        self.store.history(document_type, document_id)
    }

    /// Hash of the newest record of `document_type`, if any.
    pub fn last_hash(&self, document_type: &str) -> LedgerResult<Option<String>> {
        ChainLink::<DocumentIntegrityRecord, S>::new(&*self.store, ChainScope::document(document_type))
            .find_last_hash(None)
    }

    /// Attach an external-ledger reference to `record`.  The digest is unchanged.
    pub fn anchor_externally(
        &self,
        record: &DocumentIntegrityRecord,
        anchor: &AnchorRef,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        let anchored = self
            .store
            .attach_anchor(&record.document_type, record.id, anchor)?;
        info!(
            record_id = %anchored.id,
            network = %anchor.network,
            transaction = %anchor.transaction_hash,
            "integrity record anchored"
        );
        Ok(anchored)
    }

    /// Merkle root to publish for `records`, in the order given.
    pub fn batch_root(&self, records: &[DocumentIntegrityRecord]) -> LedgerResult<String> {
        let hashes: Vec<&str> = records.iter().map(|r| r.record_hash.as_str()).collect();
        merkle_root(&hashes)
    }

    /// Attach `anchor`, which published `batch_root(records)`, to every record
    /// of the batch and return each member's inclusion proof.
    pub fn anchor_batch(
        &self,
        records: &[DocumentIntegrityRecord],
        anchor: &AnchorRef,
    ) -> LedgerResult<AnchoredBatch> {
        let hashes: Vec<&str> = records.iter().map(|r| r.record_hash.as_str()).collect();
        let root = merkle_root(&hashes)?;
        let anchor = AnchorRef {
            anchored_at: storage_precision(anchor.anchored_at),
            ..anchor.clone()
        };
        self.ensure_anchorable(records, &anchor)?;

        let mut members = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let proof = merkle_proof(&hashes, index)?;
            let record = self.anchor_externally(record, &anchor)?;
            members.push(BatchMember { record, proof });
        }

        info!(
            root = %root,
            members = members.len(),
            transaction = %anchor.transaction_hash,
            "anchoring batch attached"
        );
        Ok(AnchoredBatch {
            merkle_root: root,
            anchor,
            members,
        })
    }

    /// Fail before anything is written if any member is missing or already
    /// carries a different anchor, so a batch is never left half-anchored.
    /// `anchor` must already be at storage precision.
    fn ensure_anchorable(&self, records: &[DocumentIntegrityRecord], anchor: &AnchorRef) -> LedgerResult<()> {
        for record in records {
            let scope = ChainScope::document(record.document_type.clone());
            let stored = self
                .store
                .get(&scope, record.id)?
                .ok_or_else(|| LedgerError::RecordNotFound {
                    scope: scope.to_string(),
                    id: record.id.0,
                })?;
            if matches!(&stored.anchor, Some(existing) if existing != anchor) {
                warn!(record_id = %record.id, "batch member already anchored elsewhere");
                return Err(LedgerError::AnchorConflict { id: record.id.0 });
            }
        }
        Ok(())
    }

    /// Recompute the digest of `record` from the stored row and persist the
    /// outcome.  A `Compromised` result is never repaired automatically.
    pub fn verify(&self, record: &DocumentIntegrityRecord) -> LedgerResult<VerificationResult> {
        let scope = ChainScope::document(record.document_type.clone());
        let stored = self
            .store
            .get(&scope, record.id)?
            .ok_or_else(|| LedgerError::RecordNotFound {
                scope: scope.to_string(),
                id: record.id.0,
            })?;

        let recomputed = stored.recompute_hash();
        let status = if recomputed == stored.record_hash {
            VerificationStatus::Valid
        } else {
            VerificationStatus::Compromised
        };
        let updated = self
            .store
            .record_verification(&stored.document_type, stored.id, status, self.clock.now())?;

        match status {
            VerificationStatus::Compromised => {
                warn!(
                    scope = %scope,
                    record_id = %stored.id,
                    document_id = %stored.document_id,
                    stored_hash = %stored.record_hash,
                    recomputed_hash = %recomputed,
                    "integrity record compromised"
                );
                Ok(VerificationResult::Compromised(updated))
            }
            _ => {
                debug!(scope = %scope, record_id = %stored.id, "integrity record verified");
                Ok(VerificationResult::Valid(updated))
            }
        }
    }

    /// Verify the current record of one document.  `None` when the document
    /// has no integrity record.
    pub fn verify_document(
        &self,
        document_type: &str,
        document_id: &str,
    ) -> LedgerResult<Option<VerificationResult>> {
        match self.store.find_current(document_type, document_id)? {
            Some(record) => self.verify(&record).map(Some),
            None => Ok(None),
        }
    }

    /// Re-verify every current record of `document_type`.
    pub fn verify_scope(&self, document_type: &str) -> LedgerResult<ScopeVerificationSummary> {
        let records = self.store.find_current_by_type(document_type)?;
        let mut summary = ScopeVerificationSummary {
            document_type: document_type.to_string(),
            checked: 0,
            valid: 0,
            compromised: Vec::new(),
        };

        for record in &records {
            summary.checked += 1;
            match self.verify(record)? {
                VerificationResult::Valid(_) => summary.valid += 1,
                VerificationResult::Compromised(r) => summary.compromised.push(r.id),
            }
        }

        info!(
            document_type,
            checked = summary.checked,
            compromised = summary.compromised.len(),
            "document type verified"
        );
        Ok(summary)
    }

    /// Flag records of `document_type` older than `cutoff` as archived.
    pub fn archive_before(&self, document_type: &str, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        self.store
            .archive_before(&ChainScope::document(document_type), cutoff)
    }
}

/// Only the chain key is checked: a document type selects the chain, and the
/// audit chain's key is reserved.
fn validate(signature: &DocumentSignature) -> LedgerResult<()> {
    let reason = if signature.document_type.trim().is_empty() {
        "document_type must not be empty"
    } else if signature.document_type == ChainScope::GLOBAL {
        "document_type 'global' is reserved for the audit chain"
    } else {
        return Ok(());
    };
    Err(LedgerError::InvalidInput {
        reason: reason.to_string(),
    })
}

fn seal(
    signature: &DocumentSignature,
    created_by: &str,
    modified_by: Option<&str>,
    ctx: &RequestContext,
    algorithm: HashAlgorithm,
    slot: ChainSlot,
) -> DocumentIntegrityRecord {
    let mut record = DocumentIntegrityRecord {
        id: slot.id,
        timestamp: slot.timestamp,
        document_type: signature.document_type.clone(),
        document_id: signature.document_id.clone(),
        document_number: signature.document_number.clone(),
        hash_algorithm: algorithm,
        signature_payload: signature.signature_payload.clone(),
        created_by: created_by.to_string(),
        modified_by: modified_by.map(str::to_string),
        client_ip: ctx.client_ip.clone(),
        user_agent: ctx.user_agent.clone(),
        session_id: ctx.session_id.clone(),
        compliance_metadata: signature.compliance_metadata.clone(),
        record_hash: String::new(),
        previous_record_hash: slot.previous_record_hash,
        verification_status: VerificationStatus::Unverified,
        last_verification: None,
        anchor: None,
        current: true,
        archived: false,
        unreadable_fields: Vec::new(),
    };
    record.record_hash = record.recompute_hash();
    record
}
