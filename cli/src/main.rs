//! SCEAU — operator CLI
//!
//! Compliance tooling over the ledger: verify a chain scope, re-verify one
//! document, review suspicious audit activity, or run the CRM reference
//! scenarios.
//!
//! Usage:
//!   sceau --config sceau.toml verify-chain --scope global --full
//!   sceau --config sceau.toml verify-chain --scope devis --limit 5000
//!   sceau --config sceau.toml verify-document --type devis --id 7
//!   sceau --config sceau.toml suspicious --since-hours 48
//!   sceau scenarios
//!
//! Exit status is 1 on any error, a broken chain or a compromised document.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sceau_audit::AuditLedger;
use sceau_config::{LedgerConfig, StorageBackend};
use sceau_contracts::{
    audit::AuditRecord,
    error::{LedgerError, LedgerResult},
    integrity::DocumentIntegrityRecord,
    record::{ChainScope, TimeWindow},
    verify::ChainVerificationReport,
};
use sceau_core::{AuditStore, IntegrityStore};
use sceau_integrity::DocumentIntegrityLedger;
use sceau_store::{InMemoryChainStore, SqliteLedgerStore};
use sceau_verify::ChainVerifier;

// ── CLI definition ────────────────────────────────────────────────────────────

/// SCEAU — tamper-evident audit and document integrity ledger.
#[derive(Parser)]
#[command(
    name = "sceau",
    about = "SCEAU ledger verification and compliance tooling",
    long_about = "Verifies hash-chained audit and document integrity records,\n\
                  reviews suspicious audit activity, and runs the CRM reference scenarios."
)]
struct Cli {
    /// Ledger configuration file (TOML).  Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk one chain scope and report linkage and content mismatches.
    VerifyChain {
        /// `global` for the audit trail, or a document type such as `devis`.
        #[arg(long)]
        scope: String,
        /// Check at most this many records, oldest first.
        #[arg(long, conflicts_with = "full")]
        limit: Option<usize>,
        /// Page through the whole scope.
        #[arg(long)]
        full: bool,
    },
    /// Re-verify the current integrity record of one document.
    VerifyDocument {
        #[arg(long = "type")]
        document_type: String,
        #[arg(long)]
        id: String,
    },
    /// Scan recent audit records for out-of-hours activity and bulk deletes.
    Suspicious {
        #[arg(long, default_value_t = 24)]
        since_hours: i64,
    },
    /// Run the CRM reference scenarios against in-memory stores.
    Scenarios,
}

// ── Stores ────────────────────────────────────────────────────────────────────

/// The configured backend, viewed through the two store seams.
struct Stores {
    audit: Arc<dyn AuditStore>,
    integrity: Arc<dyn IntegrityStore>,
}

impl Stores {
    fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        match config.storage.backend {
            StorageBackend::Memory => {
                info!("using in-memory stores; nothing is persisted");
                Ok(Self {
                    audit: Arc::new(InMemoryChainStore::<AuditRecord>::new()),
                    integrity: Arc::new(InMemoryChainStore::<DocumentIntegrityRecord>::new()),
                })
            }
            StorageBackend::Sqlite => {
                let store = Arc::new(SqliteLedgerStore::open(&config.storage.path)?);
                Ok(Self {
                    audit: store.clone(),
                    integrity: store,
                })
            }
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("sceau error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Dispatch one command.  `Ok(false)` means the command ran but found the
/// ledger unhealthy.
fn run(cli: &Cli) -> LedgerResult<bool> {
    if let Command::Scenarios = cli.command {
        sceau_ref_crm::run_all()?;
        println!("All scenarios completed successfully.");
        return Ok(true);
    }

    let config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    let stores = Stores::open(&config)?;

    match &cli.command {
        Command::VerifyChain { scope, limit, full } => {
            let scope: ChainScope = scope.parse()?;
            verify_chain(cli, &config, &stores, &scope, *limit, *full)
        }
        Command::VerifyDocument { document_type, id } => {
            verify_document(cli, &config, &stores, document_type, id)
        }
        Command::Suspicious { since_hours } => suspicious(cli, &config, &stores, *since_hours),
        Command::Scenarios => Ok(true),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn verify_chain(
    cli: &Cli,
    config: &LedgerConfig,
    stores: &Stores,
    scope: &ChainScope,
    limit: Option<usize>,
    full: bool,
) -> LedgerResult<bool> {
    let verifier = ChainVerifier::from_config(config);
    let report = match (scope, full) {
        (ChainScope::Global, true) => verifier.verify_chain_full::<AuditRecord, _>(&*stores.audit, scope)?,
        (ChainScope::Global, false) => verifier.verify_chain::<AuditRecord, _>(&*stores.audit, scope, limit)?,
        (ChainScope::DocumentType(_), true) => {
            verifier.verify_chain_full::<DocumentIntegrityRecord, _>(&*stores.integrity, scope)?
        }
        (ChainScope::DocumentType(_), false) => {
            verifier.verify_chain::<DocumentIntegrityRecord, _>(&*stores.integrity, scope, limit)?
        }
    };

    if cli.json {
        print_json(&report)?;
    } else {
        print_chain_report(&report);
    }
    Ok(report.is_intact())
}

fn verify_document(
    cli: &Cli,
    config: &LedgerConfig,
    stores: &Stores,
    document_type: &str,
    document_id: &str,
) -> LedgerResult<bool> {
    let ledger = DocumentIntegrityLedger::from_config(Arc::clone(&stores.integrity), config);
    let Some(result) = ledger.verify_document(document_type, document_id)? else {
        eprintln!("no integrity record for {} {}", document_type, document_id);
        return Ok(false);
    };

    let record = result.record();
    if cli.json {
        print_json(record)?;
    } else {
        println!(
            "{} {} ({}) record #{}: {}",
            record.document_type,
            record.document_id,
            record.document_number,
            record.id,
            if result.is_valid() { "VALID" } else { "COMPROMISED" }
        );
        if let Some(anchor) = &record.anchor {
            println!("  anchored on {} tx {}", anchor.network, anchor.transaction_hash);
        }
    }
    Ok(result.is_valid())
}

fn suspicious(cli: &Cli, config: &LedgerConfig, stores: &Stores, since_hours: i64) -> LedgerResult<bool> {
    let to = Utc::now();
    let from = Duration::try_hours(since_hours)
        .filter(|d| *d > Duration::zero())
        .and_then(|d| to.checked_sub_signed(d))
        .ok_or_else(|| LedgerError::InvalidInput {
            reason: format!("--since-hours {} is out of range", since_hours),
        })?;
    let ledger = AuditLedger::from_config(Arc::clone(&stores.audit), config)?;
    let report = ledger.detect_suspicious_activity(TimeWindow::new(from, to))?;

    if cli.json {
        print_json(&report)?;
    } else {
        println!(
            "Scanned {} audit record(s) from the last {} hour(s)",
            report.records_scanned, since_hours
        );
        for f in &report.out_of_hours {
            println!(
                "  out of hours: record #{} {} by {} at {} (local hour {})",
                f.record_id,
                f.action,
                f.actor,
                f.timestamp.to_rfc3339(),
                f.local_hour
            );
        }
        for f in &report.bulk_deletes {
            println!(
                "  bulk delete:  {} deleted {} record(s) between {} and {}",
                f.actor,
                f.count,
                f.first_delete.to_rfc3339(),
                f.last_delete.to_rfc3339()
            );
        }
        if report.is_clean() {
            println!("  nothing to review");
        }
    }
    // Findings are advisory and do not fail the command.
    Ok(true)
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> LedgerResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| LedgerError::InvalidInput {
        reason: format!("failed to render report: {}", e),
    })?;
    println!("{}", text);
    Ok(())
}

fn print_chain_report(report: &ChainVerificationReport) {
    println!(
        "Scope '{}': {} ({} record(s) checked{})",
        report.scope,
        if report.is_intact() { "INTACT" } else { "BROKEN" },
        report.records_checked,
        if report.truncated { ", truncated by limit" } else { "" }
    );
    for m in &report.mismatches {
        println!(
            "  link break at record #{} ({}): expected previous {}, found {}",
            m.record_id,
            m.timestamp.to_rfc3339(),
            m.expected_previous_hash.as_deref().unwrap_or("(none)"),
            m.actual_previous_hash.as_deref().unwrap_or("(none)")
        );
    }
    for m in &report.hash_mismatches {
        println!(
            "  content mismatch at record #{}: stored {}, recomputed {}",
            m.record_id, m.stored_hash, m.recomputed_hash
        );
    }
}
