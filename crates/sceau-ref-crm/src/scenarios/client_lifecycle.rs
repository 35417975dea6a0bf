//! Scenario 1: Client lifecycle audit trail
//!
//! A client record is created, updated and finally deleted.  Each mutation is
//! written to the global audit chain right after the business operation, and
//! the chain is verified at the end.
//!
//! Walk-through for the demo run:
//!   1. CREATE Client#42 (after-snapshot only)
//!   2. UPDATE Client#42 (email and status change, computed changed fields)
//!   3. DELETE Client#42 by an administrator, with a justification
//!   4. Verify the global chain: zero mismatches expected

use std::sync::Arc;

use sceau_audit::AuditLedger;
use sceau_contracts::{
    audit::{ActionKind, AuditEntry, AuditRecord, RequestContext},
    error::LedgerResult,
    record::ChainScope,
    verify::ChainVerificationReport,
};
use sceau_core::AuditStore;
use sceau_store::InMemoryChainStore;
use sceau_verify::ChainVerifier;

use super::short_hash;
use crate::mock_data::{client_snapshot, request_context, ADMIN, SALES_REP};

/// Audit the full lifecycle of one client.  Returns the three records in
/// append order.
pub fn record_lifecycle<S: AuditStore + ?Sized>(
    ledger: &AuditLedger<S>,
    client_id: u32,
    ctx: &RequestContext,
) -> LedgerResult<Vec<AuditRecord>> {
    let created = client_snapshot(client_id, "prospect", "contact@boulangerie-martin.fr");
    let updated = client_snapshot(client_id, "active", "compta@boulangerie-martin.fr");

    let create = AuditEntry::new(SALES_REP, "Client", client_id, ActionKind::Create)
        .after(created.clone())
        .with_computed_changes();
    let update = AuditEntry::new(SALES_REP, "Client", client_id, ActionKind::Update)
        .before(created)
        .after(updated.clone())
        .with_computed_changes();
    let delete = AuditEntry::new(ADMIN, "Client", client_id, ActionKind::Delete)
        .before(updated)
        .with_computed_changes()
        .justification("duplicate of Client#17 after merge")
        .approved_by("user:2");

    [create, update, delete]
        .into_iter()
        .map(|entry| ledger.append(entry, ctx))
        .collect()
}

/// Records and verification report of one scenario run.
pub struct LifecycleOutcome {
    pub records: Vec<AuditRecord>,
    pub report: ChainVerificationReport,
}

/// Run the lifecycle against a fresh in-memory ledger.
pub fn run_lifecycle() -> LedgerResult<LifecycleOutcome> {
    let store = Arc::new(InMemoryChainStore::<AuditRecord>::new());
    let ledger = AuditLedger::new(Arc::clone(&store));

    let records = record_lifecycle(&ledger, 42, &request_context())?;
    let report = ChainVerifier::new().verify_chain(&*store, &ChainScope::Global, None)?;

    Ok(LifecycleOutcome { records, report })
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 1: Client lifecycle audit trail.
pub fn run_scenario() -> LedgerResult<()> {
    println!("=== Scenario 1: Client lifecycle audit trail ===");
    println!();

    let outcome = run_lifecycle()?;

    for record in &outcome.records {
        println!(
            "  #{:<3} {:<7} {}#{}  by {:<8} changed: [{}]",
            record.id.0,
            record.action.as_str(),
            record.target_type,
            record.target_id,
            record.actor,
            record.changed_fields.join(", ")
        );
        println!(
            "       hash {}  prev {}",
            short_hash(&record.record_hash),
            record
                .previous_record_hash
                .as_deref()
                .map(short_hash)
                .unwrap_or("(chain head)")
        );
    }
    println!();

    let report = &outcome.report;
    println!(
        "  Global chain:           {} ({} record(s), {} link mismatch(es))",
        if report.is_intact() { "VERIFIED" } else { "BROKEN" },
        report.records_checked,
        report.mismatches.len()
    );
    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// CREATE, UPDATE, DELETE on Client#42 verify with zero mismatches.
    #[test]
    fn test_lifecycle_chain_verifies() {
        let outcome = run_lifecycle().unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.report.is_intact(), "report: {:?}", outcome.report);
        assert_eq!(outcome.report.mismatches.len(), 0);
        assert_eq!(outcome.report.records_checked, 3);
    }

    #[test]
    fn test_lifecycle_records_are_linked_in_order() {
        let outcome = run_lifecycle().unwrap();
        let actions: Vec<ActionKind> = outcome.records.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![ActionKind::Create, ActionKind::Update, ActionKind::Delete]);

        assert_eq!(outcome.records[0].previous_record_hash, None);
        for pair in outcome.records.windows(2) {
            assert_eq!(
                pair[1].previous_record_hash.as_deref(),
                Some(pair[0].record_hash.as_str()),
                "each record must point at its predecessor"
            );
        }
    }

    #[test]
    fn test_update_lists_only_changed_fields() {
        let outcome = run_lifecycle().unwrap();
        assert_eq!(outcome.records[1].changed_fields, vec!["email", "status"]);
        assert_eq!(outcome.records[2].actor, ADMIN);
        assert!(outcome.records[2].justification.is_some());
    }
}
