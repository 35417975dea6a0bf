//! The audit ledger: one global hash chain of entity mutations.
//!
//! `AuditLedger` is the only writer of `AuditRecord`s.  Business services call
//! `append` after a successful mutation; if it returns an error the mutation
//! must be rolled back, because an unaudited change defeats the trail.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use sceau_config::LedgerConfig;
use sceau_contracts::{
    audit::{ActionKind, AuditEntry, AuditRecord, RequestContext, SYSTEM_ACTOR},
    error::LedgerResult,
    record::{ChainScope, ChainSlot, HashAlgorithm, TimeWindow},
};
use sceau_core::{
    link::append_with_retry, AuditStore, ChainLink, ChainRecord, ChainStore, Clock, SystemClock,
};

use crate::activity::{ActivityMonitor, SuspiciousActivityReport};

/// Hash-chained audit trail over an `AuditStore`.
pub struct AuditLedger<S: AuditStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    algorithm: HashAlgorithm,
    timeout: Option<Duration>,
    max_retries: u32,
    monitor: ActivityMonitor,
}

impl<S: AuditStore + ?Sized> AuditLedger<S> {
    /// A ledger with the default algorithm, no timeout, three race retries
    /// and default activity thresholds.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            algorithm: HashAlgorithm::default(),
            timeout: None,
            max_retries: 3,
            monitor: ActivityMonitor::default(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &LedgerConfig) -> LedgerResult<Self> {
        Ok(Self::new(store)
            .with_algorithm(config.hashing.algorithm)
            .with_timeout(Some(config.storage.timeout()))
            .with_max_retries(config.append.max_retries)
            .with_activity(ActivityMonitor::from_config(&config.activity)?))
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

    pub fn with_activity(mut self, monitor: ActivityMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record one mutation at the head of the global chain.
    ///
    /// Entries are recorded as given, with a blank actor written as
    /// `SYSTEM_ACTOR`.  Only infrastructure failures are returned: `Storage`
    /// (possibly retryable) or `ChainRace` once the retry budget is spent.
    pub fn append(&self, mut entry: AuditEntry, ctx: &RequestContext) -> LedgerResult<AuditRecord> {
        if entry.actor.trim().is_empty() {
            entry.actor = SYSTEM_ACTOR.to_string();
        }

        let algorithm = self.algorithm;
        let build = |slot: ChainSlot| seal(&entry, ctx, algorithm, slot);
        let result = append_with_retry(
            &*self.store,
            &ChainScope::Global,
            &*self.clock,
            self.timeout,
            self.max_retries,
            &build,
        );

        match &result {
            Ok(record) => debug!(
                record_id = %record.id,
                action = %record.action,
                target = %format!("{}#{}", record.target_type, record.target_id),
                hash = %record.record_hash,
                "audit record appended"
            ),
            Err(e) => error!(
                action = %entry.action,
                target = %format!("{}#{}", entry.target_type, entry.target_id),
                error = %e,
                "audit append failed"
            ),
        }
        result
    }

    /// Hash of the current chain head, if any.
    pub fn last_hash(&self) -> LedgerResult<Option<String>> {
        ChainLink::<AuditRecord, S>::new(&*self.store, ChainScope::Global).find_last_hash(None)
    }

    /// Every record about one entity, most recent first.
    pub fn find_by_entity(&self, target_type: &str, target_id: &str) -> LedgerResult<Vec<AuditRecord>> {
        self.store.find_by_entity(target_type, target_id)
    }

    pub fn find_by_user(&self, actor: &str, window: Option<TimeWindow>) -> LedgerResult<Vec<AuditRecord>> {
        self.store.find_by_user(actor, window)
    }

    pub fn find_by_action(
        &self,
        action: ActionKind,
        window: Option<TimeWindow>,
    ) -> LedgerResult<Vec<AuditRecord>> {
        self.store.find_by_action(action, window)
    }

    /// Mark every record older than `cutoff` as archived.  The chain and its
    /// digests are unchanged.
    pub fn archive_before(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        let archived = self.store.archive_before(&ChainScope::Global, cutoff)?;
        info!(cutoff = %cutoff, archived, "audit records archived");
        Ok(archived)
    }

    /// Advisory scan of `window` for out-of-hours activity and bulk deletes.
    pub fn detect_suspicious_activity(&self, window: TimeWindow) -> LedgerResult<SuspiciousActivityReport> {
        let records = self.store.find_between(window)?;
        Ok(self.monitor.scan(window, &records))
    }
}

/// Build and hash the record for `slot`.
fn seal(entry: &AuditEntry, ctx: &RequestContext, algorithm: HashAlgorithm, slot: ChainSlot) -> AuditRecord {
    let mut record = AuditRecord {
        id: slot.id,
        timestamp: slot.timestamp,
        actor: entry.actor.clone(),
        target_type: entry.target_type.clone(),
        target_id: entry.target_id.clone(),
        action: entry.action,
        before: entry.before.clone(),
        after: entry.after.clone(),
        changed_fields: entry.changed_fields.clone(),
        client_ip: ctx.client_ip.clone(),
        user_agent: ctx.user_agent.clone(),
        session_id: ctx.session_id.clone(),
        justification: entry.justification.clone(),
        approved_by: entry.approved_by.clone(),
        metadata: entry.metadata.clone(),
        hash_algorithm: algorithm,
        record_hash: String::new(),
        previous_record_hash: slot.previous_record_hash,
        archived: false,
        unreadable_fields: Vec::new(),
    };
    record.record_hash = record.recompute_hash();
    record
}
