//! Chain linkage: locating the head of a scope and checking links.
//!
//! The "last hash" of a scope is never stored as a separate counter.  It is
//! always derived from the ordered record set, so there is no second source
//! of truth to drift.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use sceau_contracts::{
    error::{LedgerError, LedgerResult},
    record::{storage_precision, ChainScope, ChainSlot, RecordId},
    verify::LinkMismatch,
};

use crate::{
    chain::ChainRecord,
    traits::{ChainStore, Clock, RecordBuilder},
};

/// Read-only view of one scope's chain head.
pub struct ChainLink<'s, R: ChainRecord, S: ChainStore<R> + ?Sized> {
    store: &'s S,
    scope: ChainScope,
    _record: std::marker::PhantomData<fn() -> R>,
}

impl<'s, R: ChainRecord, S: ChainStore<R> + ?Sized> ChainLink<'s, R, S> {
    pub fn new(store: &'s S, scope: ChainScope) -> Self {
        Self {
            store,
            scope,
            _record: std::marker::PhantomData,
        }
    }

    pub fn scope(&self) -> &ChainScope {
        &self.scope
    }

    /// `record_hash` of the most recent record in the scope, optionally
    /// excluding one id.  `None` means the next append becomes the chain head.
    ///
    /// Outside an append transaction this is only a snapshot: another
    /// appender may extend the scope right after it returns.
    pub fn find_last_hash(&self, excluding: Option<RecordId>) -> LedgerResult<Option<String>> {
        let hash = self.store.last_hash(&self.scope, excluding)?;
        debug!(scope = %self.scope, head = ?hash, "resolved chain head");
        Ok(hash)
    }
}

/// Append through `store`, retrying the whole unit after a `ChainRace`.
///
/// Each attempt takes a fresh timestamp and re-reads the scope head inside
/// the store's append.  Any other error, or a race past `max_retries`, is
/// returned to the caller: an append that cannot be recorded must fail the
/// enclosing operation.
pub fn append_with_retry<R, S>(
    store: &S,
    scope: &ChainScope,
    clock: &dyn Clock,
    timeout: Option<Duration>,
    max_retries: u32,
    build: RecordBuilder<'_, R>,
) -> LedgerResult<R>
where
    R: ChainRecord,
    S: ChainStore<R> + ?Sized,
{
    let mut attempt = 0;
    loop {
        match store.append(scope, clock.now(), timeout, build) {
            Err(LedgerError::ChainRace { .. }) if attempt < max_retries => {
                attempt += 1;
                warn!(scope = %scope, attempt, "chain race on append, retrying");
            }
            result => return result,
        }
    }
}

/// Allocate the slot for a record appended after `head`.
///
/// The timestamp is truncated to storage precision and clamped so it never
/// precedes the head's; ties are then ordered by the larger id.
pub fn next_slot<R: ChainRecord>(id: RecordId, now: DateTime<Utc>, head: Option<&R>) -> ChainSlot {
    let now = storage_precision(now);
    match head {
        Some(h) => ChainSlot {
            id,
            timestamp: now.max(h.timestamp()),
            previous_record_hash: Some(h.record_hash().to_string()),
        },
        None => ChainSlot {
            id,
            timestamp: now,
            previous_record_hash: None,
        },
    }
}

/// Reject a built record that does not extend `head`.
///
/// A mismatch means the builder raced another appender or ignored its slot.
pub fn ensure_extends<R: ChainRecord>(scope: &ChainScope, head: Option<&R>, record: &R) -> LedgerResult<()> {
    let expected = head.map(|h| h.record_hash());
    if record.previous_record_hash() != expected {
        return Err(LedgerError::ChainRace {
            scope: scope.to_string(),
        });
    }
    if let Some(h) = head {
        if (record.timestamp(), record.id()) <= (h.timestamp(), h.id()) {
            return Err(LedgerError::ChainRace {
                scope: scope.to_string(),
            });
        }
    }
    Ok(())
}

/// Check that `record` links to `previous` (or is a proper chain head).
pub fn check_link<R: ChainRecord>(previous: Option<&R>, record: &R) -> Option<LinkMismatch> {
    let expected = previous.map(|p| p.record_hash());
    let actual = record.previous_record_hash();
    if expected == actual {
        return None;
    }
    Some(LinkMismatch {
        record_id: record.id(),
        timestamp: record.timestamp(),
        expected_previous_hash: expected.map(str::to_string),
        actual_previous_hash: actual.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;

    use sceau_contracts::{
        audit::{ActionKind, AuditRecord},
        error::LedgerError,
        record::{ChainScope, HashAlgorithm, RecordId},
    };

    use super::*;

    fn record(id: u64, slot: &ChainSlot) -> AuditRecord {
        let mut r = AuditRecord {
            id: RecordId(id),
            timestamp: slot.timestamp,
            actor: "u".into(),
            target_type: "Client".into(),
            target_id: "42".into(),
            action: ActionKind::Create,
            before: None,
            after: None,
            changed_fields: vec![],
            client_ip: None,
            user_agent: None,
            session_id: None,
            justification: None,
            approved_by: None,
            metadata: Value::Null,
            hash_algorithm: HashAlgorithm::Sha256,
            record_hash: String::new(),
            previous_record_hash: slot.previous_record_hash.clone(),
            archived: false,
            unreadable_fields: Vec::new(),
        };
        r.record_hash = r.recompute_hash();
        r
    }

    #[test]
    fn first_slot_has_no_previous_hash() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let slot = next_slot::<AuditRecord>(RecordId(1), now, None);
        assert_eq!(slot.previous_record_hash, None);
        assert_eq!(slot.timestamp, now);
    }

    #[test]
    fn slot_timestamp_never_precedes_head() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let head = record(1, &next_slot::<AuditRecord>(RecordId(1), t0, None));

        // Clock stepped backwards.
        let slot = next_slot(RecordId(2), t0 - Duration::seconds(5), Some(&head));
        assert_eq!(slot.timestamp, t0);
        assert_eq!(slot.previous_record_hash.as_deref(), Some(head.record_hash.as_str()));
    }

    #[test]
    fn ensure_extends_rejects_stale_previous_hash() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let head = record(1, &next_slot::<AuditRecord>(RecordId(1), t0, None));
        let stale = record(2, &next_slot::<AuditRecord>(RecordId(2), t0, None));

        let err = ensure_extends(&ChainScope::Global, Some(&head), &stale).unwrap_err();
        assert!(matches!(err, LedgerError::ChainRace { .. }));

        let good = record(2, &next_slot(RecordId(2), t0, Some(&head)));
        assert!(ensure_extends(&ChainScope::Global, Some(&head), &good).is_ok());
    }

    #[test]
    fn check_link_reports_expected_and_actual() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let first = record(1, &next_slot::<AuditRecord>(RecordId(1), t0, None));
        let second = record(2, &next_slot(RecordId(2), t0, Some(&first)));

        assert!(check_link(None, &first).is_none());
        assert!(check_link(Some(&first), &second).is_none());

        let mismatch = check_link(None, &second).expect("a non-null head must be flagged");
        assert_eq!(mismatch.record_id, RecordId(2));
        assert_eq!(mismatch.expected_previous_hash, None);
        assert_eq!(mismatch.actual_previous_hash, Some(first.record_hash.clone()));
    }

    // ── retries ──

    struct RacyStore {
        races: std::sync::atomic::AtomicU32,
    }

    impl ChainStore<AuditRecord> for RacyStore {
        fn append(
            &self,
            scope: &ChainScope,
            now: DateTime<Utc>,
            _timeout: Option<std::time::Duration>,
            build: RecordBuilder<'_, AuditRecord>,
        ) -> LedgerResult<AuditRecord> {
            use std::sync::atomic::Ordering;
            if self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                return Err(LedgerError::ChainRace {
                    scope: scope.to_string(),
                });
            }
            Ok(build(next_slot::<AuditRecord>(RecordId(1), now, None)))
        }

        fn last_hash(&self, _: &ChainScope, _: Option<RecordId>) -> LedgerResult<Option<String>> {
            Ok(None)
        }

        fn scan(
            &self,
            _: &ChainScope,
            _: Option<&sceau_contracts::record::ScanCursor>,
            _: Option<usize>,
        ) -> LedgerResult<Vec<AuditRecord>> {
            Ok(Vec::new())
        }

        fn get(&self, _: &ChainScope, _: RecordId) -> LedgerResult<Option<AuditRecord>> {
            Ok(None)
        }

        fn archive_before(&self, _: &ChainScope, _: DateTime<Utc>) -> LedgerResult<usize> {
            Ok(0)
        }
    }

    fn racy(races: u32) -> RacyStore {
        RacyStore {
            races: std::sync::atomic::AtomicU32::new(races),
        }
    }

    #[test]
    fn append_retries_chain_races() {
        let store = racy(2);
        let clock = crate::traits::SystemClock;
        let outcome = append_with_retry(&store, &ChainScope::Global, &clock, None, 3, &|slot| record(1, &slot));
        assert!(outcome.is_ok(), "two races fit in a budget of three retries");
    }

    #[test]
    fn append_gives_up_after_budget() {
        let store = racy(5);
        let clock = crate::traits::SystemClock;
        let result = append_with_retry(&store, &ChainScope::Global, &clock, None, 2, &|slot| record(1, &slot));
        assert!(matches!(result, Err(LedgerError::ChainRace { .. })));
    }
}
