//! # sceau-config
//!
//! TOML configuration for the SCEAU ledger: storage backend and timeouts,
//! default hash algorithm, append retry budget, suspicious-activity
//! thresholds and verification paging.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use sceau_config::LedgerConfig;
//!
//! let config = LedgerConfig::from_file(Path::new("sceau.toml"))?;
//! ```

pub mod loader;
pub mod schema;

pub use schema::{
    ActivityConfig, AppendConfig, HashingConfig, LedgerConfig, StorageBackend, StorageConfig,
    VerificationConfig,
};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sceau_contracts::{error::LedgerError, record::HashAlgorithm};

    use crate::{LedgerConfig, StorageBackend};

    // ── 1. defaults ───────────────────────────────────────────────────────────

    /// An empty document yields the documented defaults.
    #[test]
    fn test_empty_document_uses_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();

        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.timeout(), Duration::from_secs(5));
        assert_eq!(config.hashing.algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.append.max_retries, 3);
        assert_eq!(config.activity.business_hours_start, 7);
        assert_eq!(config.activity.business_hours_end, 20);
        assert_eq!(config.activity.bulk_delete_threshold, 10);
        assert_eq!(config.verification.page_size, 1_000);
    }

    // ── 2. full document ──────────────────────────────────────────────────────

    #[test]
    fn test_full_document() {
        let toml = r#"
            [storage]
            backend = "sqlite"
            path = "/tmp/ledger.db"
            timeout_ms = 250

            [hashing]
            algorithm = "sha512"

            [append]
            max_retries = 5

            [activity]
            business_hours_start = 8
            business_hours_end = 19
            utc_offset_minutes = 120
            bulk_delete_threshold = 3
            bulk_delete_window_minutes = 15

            [verification]
            page_size = 50
        "#;

        let config = LedgerConfig::from_toml_str(toml).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path.to_str(), Some("/tmp/ledger.db"));
        assert_eq!(config.storage.timeout(), Duration::from_millis(250));
        assert_eq!(config.hashing.algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.append.max_retries, 5);
        assert_eq!(config.activity.utc_offset().unwrap().local_minus_utc(), 7_200);
        assert_eq!(config.verification.page_size, 50);
    }

    // ── 3. partial section keeps sibling defaults ─────────────────────────────

    #[test]
    fn test_partial_section() {
        let config = LedgerConfig::from_toml_str("[activity]\nbulk_delete_threshold = 4\n").unwrap();
        assert_eq!(config.activity.bulk_delete_threshold, 4);
        assert_eq!(config.activity.business_hours_start, 7);
    }

    // ── 4. invalid values ─────────────────────────────────────────────────────

    #[test]
    fn test_inverted_business_hours_rejected() {
        let toml = "[activity]\nbusiness_hours_start = 20\nbusiness_hours_end = 7\n";
        match LedgerConfig::from_toml_str(toml) {
            Err(LedgerError::Config { reason }) => {
                assert!(reason.contains("business_hours_start"), "unexpected reason: {reason}");
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_delete_window_bounds() {
        for minutes in ["0", "-5", "9223372036854775807"] {
            let toml = format!("[activity]\nbulk_delete_window_minutes = {minutes}\n");
            assert!(
                matches!(LedgerConfig::from_toml_str(&toml), Err(LedgerError::Config { .. })),
                "window of {minutes} minutes must be refused"
            );
        }
        let config = LedgerConfig::from_toml_str("[activity]\nbulk_delete_window_minutes = 15\n").unwrap();
        assert_eq!(config.activity.bulk_delete_window().unwrap(), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = LedgerConfig::from_toml_str("[verification]\npage_size = 0\n");
        assert!(matches!(result, Err(LedgerError::Config { .. })));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let result = LedgerConfig::from_toml_str("[hashing]\nalgorithm = \"md5\"\n");
        assert!(matches!(result, Err(LedgerError::Config { .. })));
    }

    // ── 5. TOML parse error ───────────────────────────────────────────────────

    /// Malformed TOML must produce a `LedgerError::Config`.
    #[test]
    fn test_toml_parse_error() {
        let result = LedgerConfig::from_toml_str("this is not valid toml ][[[");

        match result {
            Err(LedgerError::Config { reason }) => {
                assert!(
                    reason.contains("failed to parse ledger TOML"),
                    "expected parse error message, got: {reason}"
                );
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = LedgerConfig::from_file(std::path::Path::new("/nonexistent/sceau.toml"));
        assert!(matches!(result, Err(LedgerError::Config { .. })));
    }
}
