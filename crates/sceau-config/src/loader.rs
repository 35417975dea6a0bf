//! Loading and validating a `LedgerConfig`.
//!
//! Parsing only checks shape.  `validate` then rejects values that parse but
//! cannot be honored (an empty business-hours window, a zero page size, ...).

use std::path::Path;

use chrono::{Duration, FixedOffset};
use tracing::debug;

use sceau_contracts::error::{LedgerError, LedgerResult};

use crate::schema::{ActivityConfig, LedgerConfig};

impl LedgerConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `LedgerError::Config` if the TOML is malformed, does not match
    /// the schema, or holds invalid values.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse ledger TOML: {}", e),
        })?;
        config.validate()?;
        debug!(
            backend = ?config.storage.backend,
            algorithm = %config.hashing.algorithm,
            "ledger configuration loaded"
        );
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML ledger configuration.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        self.activity.validate()?;
        if self.verification.page_size == 0 {
            return Err(config_error("verification.page_size must be at least 1"));
        }
        if self.storage.timeout_ms == 0 {
            return Err(config_error("storage.timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

impl ActivityConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.business_hours_start > 23 || self.business_hours_end > 24 {
            return Err(config_error("business hours must lie within 0..=24"));
        }
        if self.business_hours_start >= self.business_hours_end {
            return Err(config_error(
                "activity.business_hours_start must be before activity.business_hours_end",
            ));
        }
        if self.bulk_delete_threshold == 0 {
            return Err(config_error("activity.bulk_delete_threshold must be at least 1"));
        }
        self.bulk_delete_window()?;
        self.utc_offset()?;
        Ok(())
    }

    /// The window within which deletes by one actor count as a burst.
    pub fn bulk_delete_window(&self) -> LedgerResult<Duration> {
        Duration::try_minutes(self.bulk_delete_window_minutes)
            .filter(|w| *w > Duration::zero())
            .ok_or_else(|| {
                config_error("activity.bulk_delete_window_minutes must be positive and representable")
            })
    }

    /// The configured local-time offset.
    pub fn utc_offset(&self) -> LedgerResult<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| config_error("activity.utc_offset_minutes is out of range"))
    }
}

fn config_error(reason: &str) -> LedgerError {
    LedgerError::Config {
        reason: reason.to_string(),
    }
}
