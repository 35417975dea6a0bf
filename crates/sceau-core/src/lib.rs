//! # sceau-core
//!
//! The hashing and linkage core of the SCEAU chained ledger.
//!
//! This crate provides:
//! - `codec` — canonical encoding and digests (the hash codec)
//! - `chain` — the `ChainRecord` trait and the hashed field set of each record type
//! - `link`  — chain-head lookup, slot allocation and link checks
//! - `traits` — the storage seams (`ChainStore`, `AuditStore`, `IntegrityStore`, `Clock`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sceau_core::{ChainLink, ChainRecord};
//!
//! let head = ChainLink::new(&store, ChainScope::document("devis")).find_last_hash(None)?;
//! assert!(record.verify_hash());
//! ```

pub mod chain;
pub mod codec;
pub mod link;
pub mod traits;

pub use chain::ChainRecord;
pub use link::ChainLink;
pub use traits::{AuditStore, ChainStore, Clock, IntegrityStore, SystemClock};
