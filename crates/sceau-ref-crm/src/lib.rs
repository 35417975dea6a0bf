//! # sceau-ref-crm
//!
//! CRM reference runtime for the SCEAU tamper-evident ledger.
//!
//! Demonstrates three scenarios using mock data:
//!
//! 1. **Client lifecycle** — CREATE, UPDATE and DELETE of a client recorded in
//!    the global audit chain, then verified end to end.
//! 2. **Quote integrity** — a quote sealed in the `devis` chain, verified,
//!    anchored externally and revised.
//! 3. **Tamper detection** — rows rewritten behind the ledger's back and the
//!    resulting linkage break and compromised document.
//!
//! All data is hardcoded and fictional.  No external ledger is contacted.

pub mod mock_data;
pub mod scenarios;

use sceau_contracts::error::LedgerResult;

/// Run every scenario in order.
pub fn run_all() -> LedgerResult<()> {
    scenarios::client_lifecycle::run_scenario()?;
    scenarios::quote_integrity::run_scenario()?;
    scenarios::tamper_detection::run_scenario()?;
    Ok(())
}
