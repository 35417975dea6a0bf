//! # sceau-verify
//!
//! Chain verification for the SCEAU ledger.
//!
//! This crate provides [`engine::ChainVerifier`], which walks a scope of any
//! [`sceau_core::ChainStore`] in `(timestamp, id)` order and reports:
//!
//! 1. **Linkage breaks** — a record whose `previous_record_hash` is not the
//!    stored hash of its predecessor.
//! 2. **Content mismatches** — a record whose stored fields no longer hash to
//!    its `record_hash`.
//!
//! Results are data (`ChainVerificationReport`), never errors; only storage
//! failures propagate.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sceau_contracts::record::ChainScope;
//! use sceau_verify::ChainVerifier;
//!
//! let report = ChainVerifier::new().verify_chain(&*store, &ChainScope::Global, Some(10_000))?;
//! if !report.is_intact() {
//!     for m in &report.mismatches {
//!         eprintln!("broken link at record {}", m.record_id);
//!     }
//! }
//! ```

pub mod engine;

pub use engine::ChainVerifier;
