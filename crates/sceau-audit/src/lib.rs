//! # sceau-audit
//!
//! Append-only, hash-chained audit trail for the SCEAU ledger.
//!
//! ## Overview
//!
//! Every entity mutation the host application performs is recorded as an
//! `AuditRecord` at the head of one global chain.  Each record commits to the
//! digest of the record before it, so editing or deleting any stored record
//! breaks the chain and is caught by `sceau-verify`.
//!
//! `activity` layers an advisory scan on top of the trail: records written
//! outside business hours and bursts of deletes by a single actor.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sceau_audit::AuditLedger;
//! use sceau_contracts::audit::{ActionKind, AuditEntry, RequestContext};
//!
//! let ledger = AuditLedger::new(store);
//! let entry = AuditEntry::new("user:12", "Client", 42, ActionKind::Update)
//!     .before(old)
//!     .after(new)
//!     .with_computed_changes();
//! ledger.append(entry, &RequestContext::new("10.0.0.8", "Mozilla/5.0", session))?;
//! ```

pub mod activity;
pub mod ledger;

pub use activity::{ActivityMonitor, BulkDeleteFinding, OutOfHoursFinding, SuspiciousActivityReport};
pub use ledger::AuditLedger;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use sceau_config::{ActivityConfig, LedgerConfig};
    use sceau_contracts::{
        audit::{ActionKind, AuditEntry, AuditRecord, RequestContext, SYSTEM_ACTOR},
        record::{HashAlgorithm, TimeWindow},
    };
    use sceau_core::{ChainRecord, Clock};
    use sceau_store::InMemoryChainStore;

    use super::{ActivityMonitor, AuditLedger};

    // ── Helpers ───────────────────────────────────────────────────────────────

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(ts: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(ts)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    type MemLedger = AuditLedger<InMemoryChainStore<AuditRecord>>;

    fn ledger_at(ts: DateTime<Utc>) -> (MemLedger, Arc<ManualClock>) {
        let clock = ManualClock::at(ts);
        let ledger = AuditLedger::new(Arc::new(InMemoryChainStore::new())).with_clock(clock.clone());
        (ledger, clock)
    }

    fn ctx() -> RequestContext {
        RequestContext::new("10.0.0.8", "Mozilla/5.0", "sess-1")
    }

    fn office_hours() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    // ── Appends ───────────────────────────────────────────────────────────────

    /// CREATE, UPDATE, DELETE on Client#42 form one linked chain.
    #[test]
    fn test_client_lifecycle_is_chained() {
        let (ledger, clock) = ledger_at(office_hours());
        assert_eq!(ledger.last_hash().unwrap(), None, "fresh ledger has no head");

        let create = ledger
            .append(
                AuditEntry::new("user:1", "Client", 42, ActionKind::Create)
                    .after(json!({ "name": "ACME" }))
                    .with_computed_changes(),
                &ctx(),
            )
            .unwrap();
        clock.advance(Duration::seconds(1));
        let update = ledger
            .append(
                AuditEntry::new("user:1", "Client", 42, ActionKind::Update)
                    .before(json!({ "name": "ACME" }))
                    .after(json!({ "name": "ACME SA" }))
                    .with_computed_changes(),
                &ctx(),
            )
            .unwrap();
        clock.advance(Duration::seconds(1));
        let delete = ledger
            .append(AuditEntry::new("user:1", "Client", 42, ActionKind::Delete), &ctx())
            .unwrap();

        assert_eq!(create.previous_record_hash, None);
        assert_eq!(update.previous_record_hash.as_deref(), Some(create.record_hash.as_str()));
        assert_eq!(delete.previous_record_hash.as_deref(), Some(update.record_hash.as_str()));
        assert_eq!(ledger.last_hash().unwrap(), Some(delete.record_hash.clone()));

        let trail = ledger.find_by_entity("Client", "42").unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(trail[0].action, ActionKind::Delete, "most recent first");
        assert!(trail.iter().all(|r| r.verify_hash()));
    }

    /// The record carries the entry, the request context and the computed diff.
    #[test]
    fn test_record_captures_entry_and_context() {
        let (ledger, _) = ledger_at(office_hours());
        let record = ledger
            .append(
                AuditEntry::new("user:7", "Quote", "DEV-1", ActionKind::AdminUpdate)
                    .before(json!({ "total": 100, "status": "draft" }))
                    .after(json!({ "total": 120, "status": "draft" }))
                    .with_computed_changes()
                    .justification("pricing error")
                    .approved_by("user:1"),
                &ctx(),
            )
            .unwrap();

        assert_eq!(record.changed_fields, vec!["total".to_string()]);
        assert_eq!(record.client_ip.as_deref(), Some("10.0.0.8"));
        assert_eq!(record.session_id.as_deref(), Some("sess-1"));
        assert_eq!(record.justification.as_deref(), Some("pricing error"));
        assert_eq!(record.approved_by.as_deref(), Some("user:1"));
        assert_eq!(record.timestamp, office_hours());
    }

    /// Mutations without a user are still audited, under the system actor.
    #[test]
    fn test_blank_actor_recorded_as_system() {
        let (ledger, _) = ledger_at(office_hours());
        let record = ledger
            .append(AuditEntry::new("  ", "Client", 1, ActionKind::Create), &ctx())
            .unwrap();
        assert_eq!(record.actor, SYSTEM_ACTOR);
        assert!(record.verify_hash());
        assert_eq!(ledger.last_hash().unwrap(), Some(record.record_hash));
    }

    /// Incomplete entries are recorded as given rather than refused.
    #[test]
    fn test_incomplete_entry_is_still_appended() {
        let (ledger, _) = ledger_at(office_hours());
        let record = ledger
            .append(AuditEntry::new("user:1", "", "", ActionKind::Export), &ctx())
            .unwrap();
        assert_eq!(record.target_type, "");
        assert_eq!(record.target_id, "");
        assert_eq!(ledger.find_by_entity("", "").unwrap(), vec![record]);
    }

    #[test]
    fn test_config_selects_algorithm() {
        let config = LedgerConfig::from_toml_str("[hashing]\nalgorithm = \"sha512\"\n").unwrap();
        let ledger: MemLedger = AuditLedger::from_config(Arc::new(InMemoryChainStore::new()), &config).unwrap();

        let record = ledger
            .append(AuditEntry::new("user:1", "Client", 1, ActionKind::Create), &ctx())
            .unwrap();
        assert_eq!(record.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(record.record_hash.len(), 128);
        assert!(record.verify_hash());
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    #[test]
    fn test_find_by_user_respects_window() {
        let (ledger, clock) = ledger_at(office_hours());
        ledger
            .append(AuditEntry::new("user:1", "Client", 1, ActionKind::Create), &ctx())
            .unwrap();
        clock.advance(Duration::days(2));
        ledger
            .append(AuditEntry::new("user:1", "Client", 2, ActionKind::Create), &ctx())
            .unwrap();
        ledger
            .append(AuditEntry::new("user:2", "Client", 3, ActionKind::Export), &ctx())
            .unwrap();

        let recent = TimeWindow::new(office_hours() + Duration::days(1), office_hours() + Duration::days(3));
        let found = ledger.find_by_user("user:1", Some(recent)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target_id, "2");

        assert_eq!(ledger.find_by_user("user:1", None).unwrap().len(), 2);
        assert_eq!(ledger.find_by_action(ActionKind::Export, None).unwrap().len(), 1);
    }

    #[test]
    fn test_archive_before_keeps_chain() {
        let (ledger, clock) = ledger_at(office_hours());
        let old = ledger
            .append(AuditEntry::new("user:1", "Client", 1, ActionKind::Create), &ctx())
            .unwrap();
        clock.advance(Duration::days(400));
        ledger
            .append(AuditEntry::new("user:1", "Client", 1, ActionKind::Update), &ctx())
            .unwrap();

        let archived = ledger.archive_before(office_hours() + Duration::days(365)).unwrap();
        assert_eq!(archived, 1);

        let trail = ledger.find_by_entity("Client", "1").unwrap();
        assert!(trail[1].archived && !trail[0].archived);
        assert_eq!(trail[1].record_hash, old.record_hash, "archival must not rehash");
        assert!(trail[1].verify_hash());
    }

    // ── Suspicious activity ───────────────────────────────────────────────────

    #[test]
    fn test_out_of_hours_detected() {
        let night = Utc.with_ymd_and_hms(2024, 3, 4, 23, 15, 0).unwrap();
        let (ledger, clock) = ledger_at(office_hours());
        ledger
            .append(AuditEntry::new("user:1", "Client", 1, ActionKind::Update), &ctx())
            .unwrap();
        clock.advance(night - office_hours());
        let late = ledger
            .append(AuditEntry::new("user:9", "Client", 1, ActionKind::Export), &ctx())
            .unwrap();

        let window = TimeWindow::new(office_hours() - Duration::hours(1), night + Duration::hours(1));
        let report = ledger.detect_suspicious_activity(window).unwrap();

        assert_eq!(report.records_scanned, 2);
        assert_eq!(report.out_of_hours.len(), 1);
        assert_eq!(report.out_of_hours[0].record_id, late.id);
        assert_eq!(report.out_of_hours[0].local_hour, 23);
        assert!(report.bulk_deletes.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_local_offset_shifts_business_hours() {
        let config = ActivityConfig {
            utc_offset_minutes: 120,
            ..ActivityConfig::default()
        };
        let monitor = ActivityMonitor::from_config(&config).unwrap();

        // 06:30 UTC is 08:30 local: inside business hours.
        let morning = Utc.with_ymd_and_hms(2024, 3, 4, 6, 30, 0).unwrap();
        assert!(monitor.is_business_hour(morning));
        assert_eq!(monitor.local_hour(morning), 8);

        // 19:00 UTC is 21:00 local: outside.
        let evening = Utc.with_ymd_and_hms(2024, 3, 4, 19, 0, 0).unwrap();
        assert!(!monitor.is_business_hour(evening));
    }

    #[test]
    fn test_bulk_deletes_flagged_per_actor() {
        let (ledger, clock) = ledger_at(office_hours());
        let ledger = ledger.with_activity(
            ActivityMonitor::from_config(&ActivityConfig {
                bulk_delete_threshold: 3,
                bulk_delete_window_minutes: 10,
                ..ActivityConfig::default()
            })
            .unwrap(),
        );

        let mut burst = Vec::new();
        for i in 0..4 {
            burst.push(
                ledger
                    .append(AuditEntry::new("user:5", "Invoice", i, ActionKind::Delete), &ctx())
                    .unwrap()
                    .id,
            );
            if i < 3 {
                ledger
                    .append(AuditEntry::new("user:6", "Invoice", 100 + i, ActionKind::Delete), &ctx())
                    .unwrap();
            }
            clock.advance(Duration::minutes(1));
        }
        clock.advance(Duration::hours(2));
        ledger
            .append(AuditEntry::new("user:5", "Invoice", 99, ActionKind::Delete), &ctx())
            .unwrap();

        let window = TimeWindow::new(office_hours(), office_hours() + Duration::hours(3));
        let report = ledger.detect_suspicious_activity(window).unwrap();

        let user5: Vec<_> = report.bulk_deletes.iter().filter(|f| f.actor == "user:5").collect();
        assert_eq!(user5.len(), 1, "one burst for user:5");
        assert_eq!(user5[0].count, 4);
        assert_eq!(user5[0].record_ids, burst);
        assert!(user5[0].last_delete - user5[0].first_delete <= Duration::minutes(10));
        assert!(
            report.bulk_deletes.iter().all(|f| f.actor != "user:6"),
            "three deletes do not exceed a threshold of three"
        );
    }

    #[test]
    fn test_quiet_window_is_clean() {
        let (ledger, _) = ledger_at(office_hours());
        ledger
            .append(AuditEntry::new("user:1", "Client", 1, ActionKind::Delete), &ctx())
            .unwrap();

        let window = TimeWindow::new(office_hours() - Duration::hours(1), office_hours() + Duration::hours(1));
        let report = ledger.detect_suspicious_activity(window).unwrap();
        assert!(report.is_clean(), "a single daytime delete is not suspicious: {report:?}");
    }
}
