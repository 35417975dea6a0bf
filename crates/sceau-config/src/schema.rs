//! Configuration schema.
//!
//! A `LedgerConfig` is deserialized from TOML.  Every section and every key
//! has a default, so an empty document is a valid configuration.
//!
//! Example:
//! ```toml
//! [storage]
//! backend = "sqlite"
//! path = "/var/lib/sceau/ledger.db"
//! timeout_ms = 2000
//!
//! [hashing]
//! algorithm = "sha256"
//!
//! [activity]
//! business_hours_start = 8
//! business_hours_end = 19
//! utc_offset_minutes = 60
//! bulk_delete_threshold = 5
//! bulk_delete_window_minutes = 30
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sceau_contracts::record::HashAlgorithm;

/// Which store backs the ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file for the `sqlite` backend.
    pub path: PathBuf,
    /// Upper bound on waiting for a scope lock or the database, per operation.
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("sceau.db"),
            timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Algorithm for new records.  Existing records keep their own.
    pub algorithm: HashAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendConfig {
    /// How many times an append is retried after a `ChainRace`.
    pub max_retries: u32,
}

impl Default for AppendConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Thresholds for the suspicious-activity scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// First local hour (0-23) considered business hours.
    pub business_hours_start: u32,
    /// Local hour at which business hours end (exclusive, 1-24).
    pub business_hours_end: u32,
    /// Offset of local time from UTC.
    pub utc_offset_minutes: i32,
    /// More DELETEs than this by one actor inside the window is flagged.
    pub bulk_delete_threshold: usize,
    pub bulk_delete_window_minutes: i64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            business_hours_start: 7,
            business_hours_end: 20,
            utc_offset_minutes: 0,
            bulk_delete_threshold: 10,
            bulk_delete_window_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Records fetched per page during a full chain audit.
    pub page_size: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { page_size: 1_000 }
    }
}

/// The top-level structure deserialized from a TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub hashing: HashingConfig,
    pub append: AppendConfig,
    pub activity: ActivityConfig,
    pub verification: VerificationConfig,
}
