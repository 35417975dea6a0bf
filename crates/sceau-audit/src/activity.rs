//! Suspicious-activity heuristics over the audit trail.
//!
//! Advisory only.  Findings are reported as data for a human to review and
//! have no bearing on chain integrity.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Offset, Timelike, Utc};
use serde::Serialize;
use tracing::warn;

use sceau_config::ActivityConfig;
use sceau_contracts::{
    audit::{ActionKind, AuditRecord},
    error::LedgerResult,
    record::{RecordId, TimeWindow},
};

/// A record written outside business hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutOfHoursFinding {
    pub record_id: RecordId,
    pub actor: String,
    pub action: ActionKind,
    pub timestamp: DateTime<Utc>,
    /// Hour of `timestamp` in the configured local time.
    pub local_hour: u32,
}

/// One actor deleting more records than the threshold inside the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkDeleteFinding {
    pub actor: String,
    pub count: usize,
    pub first_delete: DateTime<Utc>,
    pub last_delete: DateTime<Utc>,
    pub record_ids: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousActivityReport {
    pub window: TimeWindow,
    pub records_scanned: usize,
    pub out_of_hours: Vec<OutOfHoursFinding>,
    pub bulk_deletes: Vec<BulkDeleteFinding>,
}

impl SuspiciousActivityReport {
    pub fn is_clean(&self) -> bool {
        self.out_of_hours.is_empty() && self.bulk_deletes.is_empty()
    }
}

/// Thresholds for the scan, resolved from `ActivityConfig`.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    business_hours: std::ops::Range<u32>,
    offset: FixedOffset,
    bulk_delete_threshold: usize,
    bulk_delete_window: Duration,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        let defaults = ActivityConfig::default();
        Self {
            business_hours: defaults.business_hours_start..defaults.business_hours_end,
            offset: Utc.fix(),
            bulk_delete_threshold: defaults.bulk_delete_threshold,
            bulk_delete_window: defaults
                .bulk_delete_window()
                .unwrap_or_else(|_| Duration::hours(1)),
        }
    }
}

impl ActivityMonitor {
    pub fn from_config(config: &ActivityConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self {
            business_hours: config.business_hours_start..config.business_hours_end,
            offset: config.utc_offset()?,
            bulk_delete_threshold: config.bulk_delete_threshold,
            bulk_delete_window: config.bulk_delete_window()?,
        })
    }

    pub fn local_hour(&self, ts: DateTime<Utc>) -> u32 {
        ts.with_timezone(&self.offset).hour()
    }

    pub fn is_business_hour(&self, ts: DateTime<Utc>) -> bool {
        self.business_hours.contains(&self.local_hour(ts))
    }

    /// Scan `records` (any order) taken from `window`.
    pub fn scan(&self, window: TimeWindow, records: &[AuditRecord]) -> SuspiciousActivityReport {
        let mut ordered: Vec<&AuditRecord> = records.iter().collect();
        ordered.sort_by_key(|r| (r.timestamp, r.id));

        let out_of_hours: Vec<OutOfHoursFinding> = ordered
            .iter()
            .filter(|r| !self.is_business_hour(r.timestamp))
            .map(|r| OutOfHoursFinding {
                record_id: r.id,
                actor: r.actor.clone(),
                action: r.action,
                timestamp: r.timestamp,
                local_hour: self.local_hour(r.timestamp),
            })
            .collect();

        let mut deletes_by_actor: BTreeMap<&str, Vec<&AuditRecord>> = BTreeMap::new();
        for r in ordered.iter().copied().filter(|r| r.action == ActionKind::Delete) {
            deletes_by_actor.entry(r.actor.as_str()).or_default().push(r);
        }
        let bulk_deletes: Vec<BulkDeleteFinding> = deletes_by_actor
            .into_iter()
            .flat_map(|(actor, deletes)| self.bursts(actor, &deletes))
            .collect();

        if !out_of_hours.is_empty() || !bulk_deletes.is_empty() {
            warn!(
                out_of_hours = out_of_hours.len(),
                bulk_deletes = bulk_deletes.len(),
                "suspicious audit activity detected"
            );
        }

        SuspiciousActivityReport {
            window,
            records_scanned: records.len(),
            out_of_hours,
            bulk_deletes,
        }
    }

    /// Sliding-window count over one actor's DELETEs, oldest first.
    /// Overlapping windows above the threshold merge into one finding.
    fn bursts(&self, actor: &str, deletes: &[&AuditRecord]) -> Vec<BulkDeleteFinding> {
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut left = 0;
        for right in 0..deletes.len() {
            while deletes[right].timestamp - deletes[left].timestamp > self.bulk_delete_window {
                left += 1;
            }
            if right - left + 1 <= self.bulk_delete_threshold {
                continue;
            }
            match spans.last().copied() {
                Some((start, end)) if left <= end => {
                    spans.pop();
                    spans.push((start, right));
                }
                _ => spans.push((left, right)),
            }
        }

        spans
            .into_iter()
            .map(|(start, end)| {
                let burst = &deletes[start..=end];
                BulkDeleteFinding {
                    actor: actor.to_string(),
                    count: burst.len(),
                    first_delete: burst[0].timestamp,
                    last_delete: burst[burst.len() - 1].timestamp,
                    record_ids: burst.iter().map(|r| r.id).collect(),
                }
            })
            .collect()
    }
}
