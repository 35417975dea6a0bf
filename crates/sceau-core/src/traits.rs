//! Storage seams for the SCEAU ledger.
//!
//! The ledgers never talk to a database directly.  They depend on these
//! traits, which any durable, queryable, append-only store can implement:
//!
//! - `ChainStore<R>`   — ordered, scope-aware append and scan
//! - `AuditStore`      — audit trail projections
//! - `IntegrityStore`  — per-document lookup plus non-hashed metadata updates
//! - `Clock`           — source of append timestamps

use std::time::Duration;

use chrono::{DateTime, Utc};

use sceau_contracts::{
    audit::{ActionKind, AuditRecord},
    error::LedgerResult,
    integrity::{AnchorRef, DocumentIntegrityRecord, VerificationStatus},
    record::{ChainScope, ChainSlot, RecordId, ScanCursor, TimeWindow},
};

use crate::chain::ChainRecord;

/// Builds a fully hashed record for the slot the store allocated.
pub type RecordBuilder<'a, R> = &'a dyn Fn(ChainSlot) -> R;

/// An append-only store of chained records, partitioned by scope.
pub trait ChainStore<R: ChainRecord>: Send + Sync {
    /// Append one record to `scope` as a single atomic unit.
    ///
    /// Implementations must, under a lock or transaction that excludes every
    /// other appender to the same scope:
    ///
    /// 1. read the scope head,
    /// 2. allocate the id and a timestamp no earlier than the head's
    ///    (see `link::next_slot`),
    /// 3. call `build` to produce the hashed record,
    /// 4. insert it, superseding older records of the same lineage.
    ///
    /// On any failure nothing is written.  `timeout` bounds the wait for the
    /// scope lock or store; exceeding it is a retryable `Storage` error.
    fn append(
        &self,
        scope: &ChainScope,
        now: DateTime<Utc>,
        timeout: Option<Duration>,
        build: RecordBuilder<'_, R>,
    ) -> LedgerResult<R>;

    /// `record_hash` of the newest record in `scope` by `(timestamp, id)`,
    /// skipping `excluding`.  `None` when the scope is empty.
    fn last_hash(&self, scope: &ChainScope, excluding: Option<RecordId>)
        -> LedgerResult<Option<String>>;

    /// Records of `scope` in `(timestamp, id)` ascending order, strictly after
    /// `after` when given, at most `limit` of them.
    fn scan(
        &self,
        scope: &ChainScope,
        after: Option<&ScanCursor>,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<R>>;

    fn get(&self, scope: &ChainScope, id: RecordId) -> LedgerResult<Option<R>>;

    /// Flag every record older than `cutoff` as archived.  Hashed fields are
    /// untouched.  Returns the number of newly archived records.
    fn archive_before(&self, scope: &ChainScope, cutoff: DateTime<Utc>) -> LedgerResult<usize>;
}

/// Read projections over the audit trail.  Results are most recent first.
pub trait AuditStore: ChainStore<AuditRecord> {
    fn find_by_entity(&self, target_type: &str, target_id: &str) -> LedgerResult<Vec<AuditRecord>>;

    fn find_by_user(&self, actor: &str, window: Option<TimeWindow>)
        -> LedgerResult<Vec<AuditRecord>>;

    fn find_by_action(&self, action: ActionKind, window: Option<TimeWindow>)
        -> LedgerResult<Vec<AuditRecord>>;

    fn find_between(&self, window: TimeWindow) -> LedgerResult<Vec<AuditRecord>>;
}

/// Per-document access to the integrity chains.
pub trait IntegrityStore: ChainStore<DocumentIntegrityRecord> {
    /// The newest record for a document.
    fn find_current(&self, document_type: &str, document_id: &str)
        -> LedgerResult<Option<DocumentIntegrityRecord>>;

    /// Every record for a document, oldest first.
    fn history(&self, document_type: &str, document_id: &str)
        -> LedgerResult<Vec<DocumentIntegrityRecord>>;

    /// Current records of one document type, oldest first.
    fn find_current_by_type(&self, document_type: &str)
        -> LedgerResult<Vec<DocumentIntegrityRecord>>;

    /// Persist the outcome of a verification.  Not a hashed field.
    fn record_verification(
        &self,
        document_type: &str,
        id: RecordId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<DocumentIntegrityRecord>;

    /// Attach an external anchor.  Not a hashed field.
    ///
    /// Idempotent for an identical anchor; a different anchor on an already
    /// anchored record is an `AnchorConflict`.
    fn attach_anchor(
        &self,
        document_type: &str,
        id: RecordId,
        anchor: &AnchorRef,
    ) -> LedgerResult<DocumentIntegrityRecord>;
}

/// Source of wall-clock time for appends.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
