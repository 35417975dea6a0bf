//! Scenario 3: Tamper detection drill
//!
//! Simulates someone with direct database access rewriting ledger rows, and
//! shows what verification reports afterwards.  Nothing is repaired; the
//! findings are data for an investigator.
//!
//! Walk-through for the demo run:
//!   1. Three chained audit records for Client#42
//!   2. Overwrite the stored digest of the second record
//!   3. Verify the global chain: one linkage break, at the third record
//!   4. Seal quote 8, then rewrite its signature payload
//!   5. Verify the quote: Compromised, status persisted

use std::sync::Arc;

use sceau_audit::AuditLedger;
use sceau_contracts::{
    audit::AuditRecord,
    error::LedgerResult,
    integrity::{DocumentIntegrityRecord, VerificationResult},
    record::ChainScope,
    verify::ChainVerificationReport,
};
use sceau_integrity::DocumentIntegrityLedger;
use sceau_store::InMemoryChainStore;
use sceau_verify::ChainVerifier;

use super::{client_lifecycle::record_lifecycle, quote_integrity::finalize_quote, short_hash};
use crate::mock_data::{quote, request_context};

/// Digest written over the second audit record by the drill.
pub const FORGED_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub struct TamperOutcome {
    pub audit_records: Vec<AuditRecord>,
    pub chain_report: ChainVerificationReport,
    pub quote_result: VerificationResult,
}

/// Run the drill against fresh in-memory stores.
pub fn run_tamper_drill() -> LedgerResult<TamperOutcome> {
    let ctx = request_context();

    // ── Audit chain ───────────────────────────────────────────────────────────
    let audit_store = Arc::new(InMemoryChainStore::<AuditRecord>::new());
    let audit = AuditLedger::new(Arc::clone(&audit_store));
    let audit_records = record_lifecycle(&audit, 42, &ctx)?;

    audit_store.tamper_with(&ChainScope::Global, audit_records[1].id, |r| {
        r.record_hash = FORGED_HASH.to_string()
    })?;
    let chain_report = ChainVerifier::new().verify_chain(&*audit_store, &ChainScope::Global, None)?;

    // ── Integrity chain ───────────────────────────────────────────────────────
    let integrity_store = Arc::new(InMemoryChainStore::<DocumentIntegrityRecord>::new());
    let integrity = DocumentIntegrityLedger::new(Arc::clone(&integrity_store));
    let sealed = finalize_quote(&integrity, &quote(8), &ctx)?;

    integrity_store.tamper_with(&ChainScope::document("devis"), sealed.id, |r| {
        r.signature_payload = r.signature_payload.replace("1250000", "125000")
    })?;
    let quote_result = integrity.verify(&sealed)?;

    Ok(TamperOutcome {
        audit_records,
        chain_report,
        quote_result,
    })
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 3: Tamper detection drill.
pub fn run_scenario() -> LedgerResult<()> {
    println!("=== Scenario 3: Tamper detection drill ===");
    println!();

    let outcome = run_tamper_drill()?;
    let report = &outcome.chain_report;

    println!(
        "  Forged digest of record #{} -> {}",
        outcome.audit_records[1].id.0,
        short_hash(FORGED_HASH)
    );
    println!(
        "  Global chain:            {} ({} link mismatch(es), {} content mismatch(es))",
        if report.is_intact() { "VERIFIED" } else { "BROKEN" },
        report.mismatches.len(),
        report.hash_mismatches.len()
    );
    for m in &report.mismatches {
        println!(
            "    record #{} at {}: expected prev {}, found {}",
            m.record_id.0,
            m.timestamp.to_rfc3339(),
            m.expected_previous_hash.as_deref().map(short_hash).unwrap_or("(none)"),
            m.actual_previous_hash.as_deref().map(short_hash).unwrap_or("(none)")
        );
    }

    let flagged = outcome.quote_result.record();
    println!(
        "  Quote {}:       {} (status stored as '{}')",
        flagged.document_number,
        if outcome.quote_result.is_valid() { "VALID" } else { "COMPROMISED" },
        flagged.verification_status.as_str()
    );
    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use sceau_contracts::integrity::VerificationStatus;

    use super::*;

    /// Rewriting the digest of record 2 of 3 yields exactly one mismatch,
    /// pointing at record 3's previous hash.
    #[test]
    fn test_forged_digest_reports_one_mismatch() {
        let outcome = run_tamper_drill().unwrap();
        let report = &outcome.chain_report;

        assert_eq!(report.mismatches.len(), 1, "exactly one linkage break expected");
        let m = &report.mismatches[0];
        assert_eq!(m.record_id, outcome.audit_records[2].id);
        assert_eq!(m.expected_previous_hash.as_deref(), Some(FORGED_HASH));
        assert_eq!(
            m.actual_previous_hash.as_deref(),
            Some(outcome.audit_records[1].record_hash.as_str()),
            "record 3 still carries the genuine digest of record 2"
        );
    }

    #[test]
    fn test_forged_record_fails_content_check() {
        let outcome = run_tamper_drill().unwrap();
        let hashes = &outcome.chain_report.hash_mismatches;
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes[0].record_id, outcome.audit_records[1].id);
        assert_eq!(hashes[0].recomputed_hash, outcome.audit_records[1].record_hash);
    }

    #[test]
    fn test_rewritten_quote_is_compromised() {
        let outcome = run_tamper_drill().unwrap();
        assert!(!outcome.quote_result.is_valid());
        assert_eq!(
            outcome.quote_result.record().verification_status,
            VerificationStatus::Compromised
        );
    }
}
