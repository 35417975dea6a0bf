//! # sceau-contracts
//!
//! Shared record types, reports, and errors for the SCEAU chained ledger.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod audit;
pub mod error;
pub mod integrity;
pub mod record;
pub mod verify;
