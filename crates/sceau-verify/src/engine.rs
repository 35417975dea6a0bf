//! Chain verifier for the SCEAU ledger.
//!
//! `ChainVerifier` walks one scope in `(timestamp, id)` order and runs two
//! independent checks on every record:
//!
//! 1. **Linkage** — `previous_record_hash` must equal the stored
//!    `record_hash` of the record before it, and be `None` for the first
//!    record of the scope.
//! 2. **Content** — the digest recomputed from the stored fields must equal
//!    the stored `record_hash`.
//!
//! Every anomaly is collected before returning.  Nothing is repaired: the
//! verifier only reads.

use std::sync::Arc;

use tracing::{debug, info, warn};

use sceau_config::LedgerConfig;
use sceau_contracts::{
    error::LedgerResult,
    record::{ChainScope, ScanCursor},
    verify::{ChainVerificationReport, HashMismatch},
};
use sceau_core::{link::check_link, ChainRecord, ChainStore, Clock, SystemClock};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Running state of one walk.  Holds only the previous record, so a paged
/// walk needs constant memory regardless of scope size.
struct ChainWalk<R> {
    previous: Option<R>,
    report: ChainVerificationReport,
}

impl<R: ChainRecord> ChainWalk<R> {
    fn new(scope: &ChainScope, clock: &dyn Clock) -> Self {
        Self {
            previous: None,
            report: ChainVerificationReport {
                scope: scope.to_string(),
                records_checked: 0,
                first_record_id: None,
                last_record_id: None,
                mismatches: Vec::new(),
                hash_mismatches: Vec::new(),
                truncated: false,
                verified_at: clock.now(),
            },
        }
    }

    fn observe(&mut self, record: R) {
        let report = &mut self.report;

        if let Some(mismatch) = check_link(self.previous.as_ref(), &record) {
            warn!(
                scope = %report.scope,
                record_id = %mismatch.record_id,
                expected = ?mismatch.expected_previous_hash,
                actual = ?mismatch.actual_previous_hash,
                "chain linkage broken"
            );
            report.mismatches.push(mismatch);
        }

        let recomputed = record.recompute_hash();
        if recomputed != record.record_hash() {
            warn!(
                scope = %report.scope,
                record_id = %record.id(),
                "record content does not match its digest"
            );
            report.hash_mismatches.push(HashMismatch {
                record_id: record.id(),
                timestamp: record.timestamp(),
                stored_hash: record.record_hash().to_string(),
                recomputed_hash: recomputed,
            });
        }

        report.records_checked += 1;
        report.first_record_id.get_or_insert(record.id());
        report.last_record_id = Some(record.id());
        self.previous = Some(record);
    }

    fn finish(self) -> ChainVerificationReport {
        let report = self.report;
        info!(
            scope = %report.scope,
            records_checked = report.records_checked,
            link_mismatches = report.mismatches.len(),
            hash_mismatches = report.hash_mismatches.len(),
            truncated = report.truncated,
            "chain verification complete"
        );
        report
    }
}

/// Read-only verifier over any `ChainStore`.
pub struct ChainVerifier {
    page_size: usize,
    clock: Arc<dyn Clock>,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new().with_page_size(config.verification.page_size)
    }

    /// Records fetched per page by `verify_chain_full`.  Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Verify the oldest `limit` records of `scope`, or all of them when
    /// `limit` is `None`.
    ///
    /// With a limit the report covers a prefix of the chain and `truncated`
    /// says whether records were left unchecked.  Use `verify_chain_full`
    /// for a complete audit of a large scope.
    pub fn verify_chain<R, S>(
        &self,
        store: &S,
        scope: &ChainScope,
        limit: Option<usize>,
    ) -> LedgerResult<ChainVerificationReport>
    where
        R: ChainRecord,
        S: ChainStore<R> + ?Sized,
    {
        // One extra record tells whether the limit cut the walk short.
        let mut records = store.scan(scope, None, limit.map(|l| l.saturating_add(1)))?;
        let truncated = match limit {
            Some(l) if records.len() > l => {
                records.truncate(l);
                true
            }
            _ => false,
        };

        debug!(scope = %scope, records = records.len(), truncated, "verifying chain");
        let mut walk = ChainWalk::new(scope, &*self.clock);
        for record in records {
            walk.observe(record);
        }
        walk.report.truncated = truncated;
        Ok(walk.finish())
    }

    /// Verify every record of `scope`, `page_size` records at a time.
    ///
    /// Pages are fetched strictly after the `(timestamp, id)` cursor of the
    /// last record seen, and the link check carries across page boundaries.
    pub fn verify_chain_full<R, S>(&self, store: &S, scope: &ChainScope) -> LedgerResult<ChainVerificationReport>
    where
        R: ChainRecord,
        S: ChainStore<R> + ?Sized,
    {
        let mut walk = ChainWalk::new(scope, &*self.clock);
        let mut cursor: Option<ScanCursor> = None;
        let mut pages = 0usize;

        loop {
            let page = store.scan(scope, cursor.as_ref(), Some(self.page_size))?;
            let fetched = page.len();
            pages += 1;
            cursor = page.last().map(|r| r.cursor()).or(cursor);
            for record in page {
                walk.observe(record);
            }
            if fetched < self.page_size {
                break;
            }
        }

        debug!(scope = %scope, pages, "paged verification finished");
        Ok(walk.finish())
    }
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
