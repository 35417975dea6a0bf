//! # sceau-integrity
//!
//! Tamper-evident integrity records for legally significant documents.
//!
//! ## Overview
//!
//! Each document type (`devis`, `facture`, ...) has its own hash chain.  A
//! finalized document gets one integrity record committing to its signature
//! payload and compliance metadata; a later modification appends a new record
//! and the old one stops being `current`.
//!
//! - `ledger` — append, lookup, verification and anchoring
//! - `merkle` — Merkle roots and inclusion proofs for batch anchoring
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sceau_integrity::DocumentIntegrityLedger;
//!
//! let ledger = DocumentIntegrityLedger::new(store);
//! let record = ledger.append(signature, "user:3", &ctx)?;
//! assert!(ledger.verify(&record)?.is_valid());
//! ```

pub mod ledger;
pub mod merkle;

pub use ledger::{AnchoredBatch, BatchMember, DocumentIntegrityLedger};
pub use merkle::{merkle_proof, merkle_root, verify_proof, MerkleProof};

// ── Tests ─────────────────────────────────────────────────────────────────────
