//! CRM reference scenarios.
//!
//! Each scenario wires real SCEAU components (ledgers, in-memory store,
//! verifier) to mock CRM data and demonstrates one ledger guarantee.

pub mod client_lifecycle;
pub mod quote_integrity;
pub mod tamper_detection;

/// First 16 hex digits of a digest, for display.
fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
