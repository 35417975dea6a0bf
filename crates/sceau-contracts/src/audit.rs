//! Audit trail types.
//!
//! `AuditEntry` is what a business service hands to the ledger after a
//! successful mutation.  `AuditRecord` is what the ledger persists: the entry
//! plus request context, chain position and digest.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LedgerError;
use crate::record::{HashAlgorithm, RecordId};

/// The kind of mutation (or access) being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Validate,
    Reject,
    AdminUpdate,
    Export,
    View,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Validate,
        Self::Reject,
        Self::AdminUpdate,
        Self::Export,
        Self::View,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Validate => "VALIDATE",
            Self::Reject => "REJECT",
            Self::AdminUpdate => "ADMIN_UPDATE",
            Self::Export => "EXPORT",
            Self::View => "VIEW",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == upper)
            .ok_or_else(|| LedgerError::InvalidInput {
                reason: format!("unknown audit action '{s}'"),
            })
    }
}

/// Actor recorded for mutations made without a user, such as scheduled jobs.
pub const SYSTEM_ACTOR: &str = "system";

/// `actor`, or `SYSTEM_ACTOR` when it is blank.
pub fn actor_or_system(actor: &str) -> &str {
    if actor.trim().is_empty() {
        SYSTEM_ACTOR
    } else {
        actor
    }
}

/// Where a request came from.  Supplied by the host application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            client_ip: Some(client_ip.into()),
            user_agent: Some(user_agent.into()),
            session_id: Some(session_id.into()),
        }
    }
}

/// A mutation to record, built by the calling service.
///
/// Only `actor`, `target_type`, `target_id` and `action` are set up front; the
/// remaining fields default to empty.  A blank actor is recorded as
/// `SYSTEM_ACTOR`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub target_type: String,
    pub target_id: String,
    pub action: ActionKind,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub changed_fields: Vec<String>,
    pub justification: Option<String>,
    pub approved_by: Option<String>,
    pub metadata: Value,
}

impl AuditEntry {
    pub fn new(
        actor: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl ToString,
        action: ActionKind,
    ) -> Self {
        Self {
            actor: actor.into(),
            target_type: target_type.into(),
            target_id: target_id.to_string(),
            action,
            before: None,
            after: None,
            changed_fields: Vec::new(),
            justification: None,
            approved_by: None,
            metadata: Value::Null,
        }
    }

    pub fn before(mut self, state: Value) -> Self {
        self.before = Some(state);
        self
    }

    pub fn after(mut self, state: Value) -> Self {
        self.after = Some(state);
        self
    }

    pub fn changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Fill `changed_fields` from the top-level keys that differ between the
    /// before and after snapshots.
    pub fn with_computed_changes(mut self) -> Self {
        self.changed_fields = changed_fields_between(self.before.as_ref(), self.after.as_ref());
        self
    }

    pub fn justification(mut self, reason: impl Into<String>) -> Self {
        self.justification = Some(reason.into());
        self
    }

    pub fn approved_by(mut self, approver: impl Into<String>) -> Self {
        self.approved_by = Some(approver.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Top-level keys whose values differ between two object snapshots, sorted.
///
/// A missing snapshot counts as an empty object, so a CREATE lists every
/// field of `after` and a DELETE lists every field of `before`.
pub fn changed_fields_between(before: Option<&Value>, after: Option<&Value>) -> Vec<String> {
    let empty = serde_json::Map::new();
    let b = before.and_then(Value::as_object).unwrap_or(&empty);
    let a = after.and_then(Value::as_object).unwrap_or(&empty);

    let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
    keys.into_iter()
        .filter(|k| b.get(*k) != a.get(*k))
        .cloned()
        .collect()
}

/// One persisted row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub target_type: String,
    pub target_id: String,
    pub action: ActionKind,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub changed_fields: Vec<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub justification: Option<String>,
    pub approved_by: Option<String>,
    pub metadata: Value,
    pub hash_algorithm: HashAlgorithm,
    pub record_hash: String,
    pub previous_record_hash: Option<String>,
    /// Retention flag.  Not hashed.
    pub archived: bool,
    /// Hashed columns the store could not decode as written.  Always empty
    /// for records the ledger wrote; when not, the digest cannot match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreadable_fields: Vec<String>,
}
