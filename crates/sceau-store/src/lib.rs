//! # sceau-store
//!
//! Append-only stores behind the SCEAU ledgers.
//!
//! - `InMemoryChainStore<R>` — per-scope mutexes, for tests and embedding
//! - `SqliteLedgerStore`     — both ledgers in one SQLite file, WAL mode,
//!   `BEGIN IMMEDIATE` appends and append-only triggers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sceau_store::SqliteLedgerStore;
//!
//! let store = SqliteLedgerStore::open("var/ledger.db")?;
//! let ledger = AuditLedger::new(store);
//! ```

mod lock;
pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod fixtures;

pub use memory::InMemoryChainStore;
pub use sqlite::SqliteLedgerStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;

    use sceau_contracts::{
        audit::{ActionKind, AuditRecord},
        error::LedgerError,
        integrity::{AnchorRef, DocumentIntegrityRecord},
        record::ChainScope,
    };
    use sceau_core::{link::check_link, AuditStore, ChainRecord, ChainStore, IntegrityStore};

    use crate::fixtures::{append_audit, append_integrity, audit};
    use crate::InMemoryChainStore;

    // ── 1. linkage ────────────────────────────────────────────────────────────

    #[test]
    fn test_sequential_appends_link() {
        let store = InMemoryChainStore::<AuditRecord>::new();
        let first = append_audit(&store, Utc::now(), "42", ActionKind::Create);
        let second = append_audit(&store, Utc::now(), "42", ActionKind::Update);

        assert_eq!(first.previous_record_hash, None, "chain head has no predecessor");
        assert_eq!(second.previous_record_hash, Some(first.record_hash.clone()));
        assert_eq!(
            store.last_hash(&ChainScope::Global, None).unwrap(),
            Some(second.record_hash.clone())
        );
        assert_eq!(
            store.last_hash(&ChainScope::Global, Some(second.id)).unwrap(),
            Some(first.record_hash)
        );
        assert_eq!(store.len(), 2);
    }

    // ── 2. concurrency ────────────────────────────────────────────────────────

    /// Parallel appenders to one scope still produce a single linear chain.
    #[test]
    fn test_concurrent_appends_stay_linear() {
        let store = Arc::new(InMemoryChainStore::<AuditRecord>::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        append_audit(&*store, Utc::now(), &format!("{t}-{i}"), ActionKind::Create);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let chain = store.scan(&ChainScope::Global, None, None).unwrap();
        assert_eq!(chain.len(), 200);
        assert_eq!(chain[0].previous_record_hash, None);
        for pair in chain.windows(2) {
            assert_eq!(check_link(Some(&pair[0]), &pair[1]), None, "fork at {}", pair[1].id);
        }
        assert!(chain.iter().all(|r| r.verify_hash()));
    }

    #[test]
    fn test_held_scope_times_out() {
        let store = Arc::new(InMemoryChainStore::<AuditRecord>::new());
        append_audit(&*store, Utc::now(), "1", ActionKind::Create);

        // Hold the scope lock from inside a builder while a second append waits.
        let inner = Arc::clone(&store);
        let result = store.append(&ChainScope::Global, Utc::now(), None, &|slot| {
            let blocked = inner.append(
                &ChainScope::Global,
                Utc::now(),
                Some(Duration::from_millis(10)),
                &|s| audit(s, "2", ActionKind::Create),
            );
            assert!(matches!(blocked, Err(LedgerError::Storage { retryable: true, .. })));
            audit(slot, "3", ActionKind::Create)
        });

        assert!(result.is_ok());
        assert_eq!(store.len(), 2, "the timed-out append must leave nothing behind");
    }

    // ── 3. scopes ─────────────────────────────────────────────────────────────

    #[test]
    fn test_scopes_are_isolated() {
        let store = InMemoryChainStore::<DocumentIntegrityRecord>::new();
        let devis = append_integrity(&store, "devis", "7");
        let facture = append_integrity(&store, "facture", "7");

        assert_eq!(devis.previous_record_hash, None);
        assert_eq!(facture.previous_record_hash, None);
        assert_eq!(store.last_hash(&ChainScope::document("avoir"), None).unwrap(), None);
        assert_ne!(devis.id, facture.id, "ids are unique across scopes");
    }

    #[test]
    fn test_scan_pages() {
        let store = InMemoryChainStore::<AuditRecord>::new();
        let all: Vec<_> = (0..6)
            .map(|i| append_audit(&store, Utc::now(), &i.to_string(), ActionKind::View))
            .collect();

        let first = store.scan(&ChainScope::Global, None, Some(4)).unwrap();
        assert_eq!(first, all[..4].to_vec());
        let rest = store
            .scan(&ChainScope::Global, first.last().map(|r| r.cursor()).as_ref(), Some(4))
            .unwrap();
        assert_eq!(rest, all[4..].to_vec());
    }

    // ── 4. projections ────────────────────────────────────────────────────────

    #[test]
    fn test_entity_history_newest_first() {
        let store = InMemoryChainStore::<AuditRecord>::new();
        let create = append_audit(&store, Utc::now(), "42", ActionKind::Create);
        append_audit(&store, Utc::now(), "43", ActionKind::Create);
        let delete = append_audit(&store, Utc::now(), "42", ActionKind::Delete);

        let trail = store.find_by_entity("Client", "42").unwrap();
        assert_eq!(trail.iter().map(|r| r.id).collect::<Vec<_>>(), vec![delete.id, create.id]);
        assert_eq!(store.find_by_action(ActionKind::Create, None).unwrap().len(), 2);
    }

    #[test]
    fn test_current_pointer_moves() {
        let store = InMemoryChainStore::<DocumentIntegrityRecord>::new();
        let v1 = append_integrity(&store, "devis", "7");
        let v2 = append_integrity(&store, "devis", "7");

        assert_eq!(store.find_current("devis", "7").unwrap().map(|r| r.id), Some(v2.id));
        let history = store.history("devis", "7").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, v1.id);
        assert!(!history[0].current && history[1].current);
    }

    #[test]
    fn test_anchor_conflict() {
        let store = InMemoryChainStore::<DocumentIntegrityRecord>::new();
        let record = append_integrity(&store, "devis", "7");
        let anchor = AnchorRef {
            network: "bitcoin".to_string(),
            transaction_hash: "ab".repeat(32),
            block_number: None,
            anchored_at: Utc::now(),
        };

        let anchored = store.attach_anchor("devis", record.id, &anchor).unwrap();
        assert_eq!(anchored.record_hash, record.record_hash);
        assert!(store.attach_anchor("devis", record.id, &anchor).is_ok());

        let other = AnchorRef {
            network: "polygon".to_string(),
            ..anchor
        };
        assert!(matches!(
            store.attach_anchor("devis", record.id, &other),
            Err(LedgerError::AnchorConflict { .. })
        ));
    }

    // ── 5. tampering ──────────────────────────────────────────────────────────

    #[test]
    fn test_tamper_with_bypasses_chain_rules() {
        let store = InMemoryChainStore::<AuditRecord>::new();
        let record = append_audit(&store, Utc::now(), "42", ActionKind::Update);

        let hit = store
            .tamper_with(&ChainScope::Global, record.id, |r| r.actor = "mallory".to_string())
            .unwrap();
        assert!(hit);

        let stored = store.get(&ChainScope::Global, record.id).unwrap().unwrap();
        assert!(!stored.verify_hash(), "tampered record must fail its own digest");
        assert!(!store
            .tamper_with(&ChainScope::document("devis"), record.id, |_| {})
            .unwrap());
    }
}
