//! In-memory implementation of the chain store traits.
//!
//! `InMemoryChainStore` keeps every scope in its own `Vec` behind its own
//! `Mutex`, so appends to different scopes never wait on each other while
//! appends to the same scope are strictly linearized.  Ids come from one
//! atomic sequence shared by all scopes.
//!
//! Use it for tests, the reference scenarios, and hosts that persist the
//! ledger some other way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use sceau_contracts::{
    audit::{ActionKind, AuditRecord},
    error::{LedgerError, LedgerResult},
    integrity::{AnchorRef, DocumentIntegrityRecord, VerificationStatus},
    record::{storage_precision, ChainScope, RecordId, ScanCursor, TimeWindow},
};
use sceau_core::{
    chain::{chain_order, ChainRecord},
    link::{ensure_extends, next_slot},
    traits::{AuditStore, ChainStore, IntegrityStore, RecordBuilder},
};

use crate::lock::{lock_within, poisoned};

type ScopeChain<R> = Arc<Mutex<Vec<R>>>;

/// An in-memory, append-only store for one record type.
pub struct InMemoryChainStore<R> {
    scopes: RwLock<HashMap<ChainScope, ScopeChain<R>>>,
    next_id: AtomicU64,
}

impl<R: ChainRecord> InMemoryChainStore<R> {
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of records across all scopes.
    pub fn len(&self) -> usize {
        self.scopes
            .read()
            .map(|s| {
                s.values()
                    .map(|c| c.lock().map(|v| v.len()).unwrap_or(0))
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutate a stored record in place, bypassing every chain rule.
    ///
    /// Simulates direct tampering with the backing store for fault-injection
    /// tests and forensic drills.  Returns false when no such record exists.
    pub fn tamper_with(
        &self,
        scope: &ChainScope,
        id: RecordId,
        mutate: impl FnOnce(&mut R),
    ) -> LedgerResult<bool> {
        let Some(chain) = self.existing_chain(scope)? else {
            return Ok(false);
        };
        let mut records = lock_within(&*chain, None, "scope chain")?;
        match records.iter_mut().find(|r| r.id() == id) {
            Some(record) => {
                mutate(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn existing_chain(&self, scope: &ChainScope) -> LedgerResult<Option<ScopeChain<R>>> {
        let scopes = self.scopes.read().map_err(|e| poisoned("scope table", e))?;
        Ok(scopes.get(scope).cloned())
    }

    fn chain(&self, scope: &ChainScope) -> LedgerResult<ScopeChain<R>> {
        if let Some(chain) = self.existing_chain(scope)? {
            return Ok(chain);
        }
        let mut scopes = self.scopes.write().map_err(|e| poisoned("scope table", e))?;
        Ok(scopes.entry(scope.clone()).or_default().clone())
    }

    /// Clone of every record in `scope`, in chain order.
    fn ordered(&self, scope: &ChainScope) -> LedgerResult<Vec<R>> {
        let Some(chain) = self.existing_chain(scope)? else {
            return Ok(Vec::new());
        };
        let records = lock_within(&*chain, None, "scope chain")?;
        let mut out = records.clone();
        out.sort_by(chain_order);
        Ok(out)
    }

    fn update_record(
        &self,
        scope: &ChainScope,
        id: RecordId,
        update: impl FnOnce(&mut R) -> LedgerResult<()>,
    ) -> LedgerResult<R> {
        let not_found = || LedgerError::RecordNotFound {
            scope: scope.to_string(),
            id: id.0,
        };
        let chain = self.existing_chain(scope)?.ok_or_else(not_found)?;
        let mut records = lock_within(&*chain, None, "scope chain")?;
        let record = records.iter_mut().find(|r| r.id() == id).ok_or_else(not_found)?;
        update(record)?;
        Ok(record.clone())
    }
}

impl<R: ChainRecord> Default for InMemoryChainStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

// ── ChainStore impl ───────────────────────────────────────────────────────────

impl<R: ChainRecord> ChainStore<R> for InMemoryChainStore<R> {
    /// Append under the scope's mutex: the head read, id allocation, hashing
    /// and insert all happen while holding it.
    fn append(
        &self,
        scope: &ChainScope,
        now: DateTime<Utc>,
        timeout: Option<Duration>,
        build: RecordBuilder<'_, R>,
    ) -> LedgerResult<R> {
        let chain = self.chain(scope)?;
        let mut records = lock_within(&*chain, timeout, &format!("scope '{}'", scope))?;

        let head = records.iter().max_by(|a, b| chain_order(*a, *b));
        let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = build(next_slot(id, now, head));

        if record.scope() != *scope {
            return Err(LedgerError::InvalidInput {
                reason: format!("record for scope '{}' appended to '{}'", record.scope(), scope),
            });
        }
        ensure_extends(scope, head, &record)?;

        if let Some(lineage) = record.lineage() {
            for older in records.iter_mut().filter(|r| r.lineage() == Some(lineage)) {
                older.set_current(false);
            }
        }
        records.push(record.clone());

        debug!(scope = %scope, record_id = %id, hash = %record.record_hash(), "record appended");
        Ok(record)
    }

    fn last_hash(&self, scope: &ChainScope, excluding: Option<RecordId>) -> LedgerResult<Option<String>> {
        let Some(chain) = self.existing_chain(scope)? else {
            return Ok(None);
        };
        let records = lock_within(&*chain, None, "scope chain")?;
        Ok(records
            .iter()
            .filter(|r| Some(r.id()) != excluding)
            .max_by(|a, b| chain_order(*a, *b))
            .map(|r| r.record_hash().to_string()))
    }

    fn scan(
        &self,
        scope: &ChainScope,
        after: Option<&ScanCursor>,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<R>> {
        let records = self.ordered(scope)?;
        let start = match after {
            Some(c) => records.partition_point(|r| (r.timestamp(), r.id()) <= (c.timestamp, c.id)),
            None => 0,
        };
        let take = limit.unwrap_or(usize::MAX);
        Ok(records.into_iter().skip(start).take(take).collect())
    }

    fn get(&self, scope: &ChainScope, id: RecordId) -> LedgerResult<Option<R>> {
        let Some(chain) = self.existing_chain(scope)? else {
            return Ok(None);
        };
        let records = lock_within(&*chain, None, "scope chain")?;
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    fn archive_before(&self, scope: &ChainScope, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        let Some(chain) = self.existing_chain(scope)? else {
            return Ok(0);
        };
        let mut records = lock_within(&*chain, None, "scope chain")?;
        let mut archived = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.timestamp() < cutoff && !r.is_archived())
        {
            record.set_archived(true);
            archived += 1;
        }
        Ok(archived)
    }
}

// ── AuditStore impl ───────────────────────────────────────────────────────────

impl InMemoryChainStore<AuditRecord> {
    fn audit_matching(&self, keep: impl Fn(&AuditRecord) -> bool) -> LedgerResult<Vec<AuditRecord>> {
        let mut out: Vec<AuditRecord> = self
            .ordered(&ChainScope::Global)?
            .into_iter()
            .filter(|r| keep(r))
            .collect();
        out.reverse();
        Ok(out)
    }
}

impl AuditStore for InMemoryChainStore<AuditRecord> {
    fn find_by_entity(&self, target_type: &str, target_id: &str) -> LedgerResult<Vec<AuditRecord>> {
        self.audit_matching(|r| r.target_type == target_type && r.target_id == target_id)
    }

    fn find_by_user(&self, actor: &str, window: Option<TimeWindow>) -> LedgerResult<Vec<AuditRecord>> {
        self.audit_matching(|r| r.actor == actor && window.map_or(true, |w| w.contains(r.timestamp)))
    }

    fn find_by_action(
        &self,
        action: ActionKind,
        window: Option<TimeWindow>,
    ) -> LedgerResult<Vec<AuditRecord>> {
        self.audit_matching(|r| r.action == action && window.map_or(true, |w| w.contains(r.timestamp)))
    }

    fn find_between(&self, window: TimeWindow) -> LedgerResult<Vec<AuditRecord>> {
        self.audit_matching(|r| window.contains(r.timestamp))
    }
}

// ── IntegrityStore impl ───────────────────────────────────────────────────────

impl IntegrityStore for InMemoryChainStore<DocumentIntegrityRecord> {
    fn find_current(
        &self,
        document_type: &str,
        document_id: &str,
    ) -> LedgerResult<Option<DocumentIntegrityRecord>> {
        Ok(self
            .ordered(&ChainScope::document(document_type))?
            .into_iter()
            .filter(|r| r.document_id == document_id && r.current)
            .last())
    }

    fn history(
        &self,
        document_type: &str,
        document_id: &str,
    ) -> LedgerResult<Vec<DocumentIntegrityRecord>> {
        Ok(self
            .ordered(&ChainScope::document(document_type))?
            .into_iter()
            .filter(|r| r.document_id == document_id)
            .collect())
    }

    fn find_current_by_type(&self, document_type: &str) -> LedgerResult<Vec<DocumentIntegrityRecord>> {
        Ok(self
            .ordered(&ChainScope::document(document_type))?
            .into_iter()
            .filter(|r| r.current)
            .collect())
    }

    fn record_verification(
        &self,
        document_type: &str,
        id: RecordId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        self.update_record(&ChainScope::document(document_type), id, |r| {
            r.verification_status = status;
            r.last_verification = Some(at);
            Ok(())
        })
    }

    fn attach_anchor(
        &self,
        document_type: &str,
        id: RecordId,
        anchor: &AnchorRef,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        let anchor = AnchorRef {
            anchored_at: storage_precision(anchor.anchored_at),
            ..anchor.clone()
        };
        self.update_record(&ChainScope::document(document_type), id, |r| {
            match &r.anchor {
                Some(existing) if *existing != anchor => Err(LedgerError::AnchorConflict { id: id.0 }),
                _ => {
                    r.anchor = Some(anchor.clone());
                    Ok(())
                }
            }
        })
    }
}
