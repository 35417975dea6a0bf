//! SQLite-backed ledger store.
//!
//! Both ledgers live in one database file:
//!
//! - `audit_records` — the global audit chain
//! - `document_integrity_records` — one chain per `document_type`
//!
//! # Guarantees
//!
//! - Appends run in `BEGIN IMMEDIATE` transactions, so the head read, id
//!   allocation and insert are serialized against every other writer.
//! - A unique index on `(scope, previous_record_hash)` makes it impossible
//!   for two records to claim the same predecessor; a violation surfaces as
//!   `ChainRace`.
//! - Triggers reject deletes and updates of hashed columns.  Only archival,
//!   verification, anchor and `current` columns are mutable.
//! - Timestamps are stored as microseconds since the Unix epoch.
//! - Reads never fail on a row whose hashed columns were rewritten into
//!   something undecodable.  The record comes back with those columns listed
//!   in `unreadable_fields` and fails verification like any other tampering.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{
    params, types::ValueRef, Connection, ErrorCode, OpenFlags, OptionalExtension, Row,
    TransactionBehavior,
};
use serde_json::Value;
use tracing::{debug, info};

use sceau_contracts::{
    audit::{ActionKind, AuditRecord},
    error::{LedgerError, LedgerResult},
    integrity::{AnchorRef, DocumentIntegrityRecord, VerificationStatus},
    record::{storage_precision, ChainScope, HashAlgorithm, RecordId, ScanCursor, TimeWindow},
};
use sceau_core::{
    chain::ChainRecord,
    link::{ensure_extends, next_slot},
    traits::{AuditStore, ChainStore, IntegrityStore, RecordBuilder},
};

use crate::lock::lock_within;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_records (
    id INTEGER PRIMARY KEY,
    scope TEXT NOT NULL,
    timestamp_us INTEGER NOT NULL,
    actor TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    action TEXT NOT NULL,
    before_state TEXT,
    after_state TEXT,
    changed_fields TEXT NOT NULL,
    client_ip TEXT,
    user_agent TEXT,
    session_id TEXT,
    justification TEXT,
    approved_by TEXT,
    metadata TEXT NOT NULL,
    hash_algorithm TEXT NOT NULL,
    record_hash TEXT NOT NULL,
    previous_record_hash TEXT,
    archived INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_audit_chain ON audit_records(
    scope, MIN(MAX(timestamp_us, -8000000000000000000), 8000000000000000000), id);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_records(target_type, target_id);
CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_records(actor, timestamp_us);
CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_records(action, timestamp_us);
CREATE UNIQUE INDEX IF NOT EXISTS idx_audit_link
    ON audit_records(scope, COALESCE(previous_record_hash, ''));

CREATE TRIGGER IF NOT EXISTS audit_records_no_delete
BEFORE DELETE ON audit_records
BEGIN
    SELECT RAISE(ABORT, 'audit_records is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_records_no_rewrite
BEFORE UPDATE OF id, scope, timestamp_us, actor, target_type, target_id, action,
    before_state, after_state, changed_fields, client_ip, user_agent, session_id,
    justification, approved_by, metadata, hash_algorithm, record_hash,
    previous_record_hash
ON audit_records
BEGIN
    SELECT RAISE(ABORT, 'hashed audit columns are immutable');
END;

CREATE TABLE IF NOT EXISTS document_integrity_records (
    id INTEGER PRIMARY KEY,
    document_type TEXT NOT NULL,
    timestamp_us INTEGER NOT NULL,
    document_id TEXT NOT NULL,
    document_number TEXT NOT NULL,
    hash_algorithm TEXT NOT NULL,
    signature_payload TEXT NOT NULL,
    created_by TEXT NOT NULL,
    modified_by TEXT,
    client_ip TEXT,
    user_agent TEXT,
    session_id TEXT,
    compliance_metadata TEXT NOT NULL,
    record_hash TEXT NOT NULL,
    previous_record_hash TEXT,
    verification_status TEXT NOT NULL DEFAULT 'unverified',
    last_verification_us INTEGER,
    anchor_network TEXT,
    anchor_transaction_hash TEXT,
    anchor_block_number INTEGER,
    anchored_at_us INTEGER,
    current INTEGER NOT NULL DEFAULT 1,
    archived INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_integrity_chain ON document_integrity_records(
    document_type, MIN(MAX(timestamp_us, -8000000000000000000), 8000000000000000000), id);
CREATE INDEX IF NOT EXISTS idx_integrity_document
    ON document_integrity_records(document_type, document_id, current);
CREATE UNIQUE INDEX IF NOT EXISTS idx_integrity_link
    ON document_integrity_records(document_type, COALESCE(previous_record_hash, ''));

CREATE TRIGGER IF NOT EXISTS integrity_records_no_delete
BEFORE DELETE ON document_integrity_records
BEGIN
    SELECT RAISE(ABORT, 'document_integrity_records is append-only');
END;

CREATE TRIGGER IF NOT EXISTS integrity_records_no_rewrite
BEFORE UPDATE OF id, document_type, timestamp_us, document_id, document_number,
    hash_algorithm, signature_payload, created_by, modified_by, client_ip,
    user_agent, session_id, compliance_metadata, record_hash, previous_record_hash
ON document_integrity_records
BEGIN
    SELECT RAISE(ABORT, 'hashed integrity columns are immutable');
END;
"#;

const AUDIT_COLUMNS: &str = "id, timestamp_us, actor, target_type, target_id, action, \
    before_state, after_state, changed_fields, client_ip, user_agent, session_id, \
    justification, approved_by, metadata, hash_algorithm, record_hash, \
    previous_record_hash, archived";

const INTEGRITY_COLUMNS: &str = "id, timestamp_us, document_type, document_id, document_number, \
    hash_algorithm, signature_payload, created_by, modified_by, client_ip, user_agent, \
    session_id, compliance_metadata, record_hash, previous_record_hash, verification_status, \
    last_verification_us, anchor_network, anchor_transaction_hash, anchor_block_number, \
    anchored_at_us, current, archived";

/// Ledger store backed by a single SQLite database.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Create or open the ledger database at `path` (WAL mode).
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening ledger database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::storage(format!(
                        "failed to create database directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(storage_error)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_error)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(storage_error)?;
        Self::init(conn)
    }

    /// A private, non-durable database.  Useful for tests and dry runs.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> LedgerResult<Self> {
        conn.execute_batch(SCHEMA).map_err(storage_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self, timeout: Option<Duration>) -> LedgerResult<std::sync::MutexGuard<'_, Connection>> {
        let conn = lock_within(&self.conn, timeout, "ledger database")?;
        if let Some(timeout) = timeout {
            conn.busy_timeout(timeout).map_err(storage_error)?;
        }
        Ok(conn)
    }

    /// Run `f` against the raw connection.
    ///
    /// Bypasses every ledger rule.  Meant for schema inspection and
    /// fault-injection drills that simulate direct database tampering.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> LedgerResult<T> {
        let conn = self.conn(None)?;
        f(&conn).map_err(storage_error)
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

fn storage_error(e: rusqlite::Error) -> LedgerError {
    let retryable = matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    );
    LedgerError::Storage {
        reason: format!("sqlite: {}", e),
        retryable,
    }
}

/// Inside an append, a constraint violation means another writer claimed the
/// same predecessor or id first.
fn append_error(scope: &ChainScope, e: rusqlite::Error) -> LedgerError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            LedgerError::ChainRace {
                scope: scope.to_string(),
            }
        }
        _ => storage_error(e),
    }
}

// ── Column codecs ─────────────────────────────────────────────────────────────

fn ts_to_sql(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn json_to_sql(value: &impl serde::Serialize) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn opt_json_to_sql(value: Option<&Value>) -> rusqlite::Result<Option<String>> {
    value.map(|v| json_to_sql(v)).transpose()
}

// ── Row decoding ──────────────────────────────────────────────────────────────

/// Largest timestamp magnitude, in microseconds, a row decodes to.  Well
/// inside chrono's range; anything beyond it comes from a rewritten row.
const MAX_TIMESTAMP_US: i64 = 8_000_000_000_000_000_000;

/// `timestamp_us` clamped the way rows decode it.  Chain order and scan
/// cursors compare on this expression so a row with a forged timestamp sorts
/// where its decoded cursor puts it.  Must match the chain indexes in `SCHEMA`.
const CHAIN_TS: &str = "MIN(MAX(timestamp_us, -8000000000000000000), 8000000000000000000)";

fn lenient_ts(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros.clamp(-MAX_TIMESTAMP_US, MAX_TIMESTAMP_US))
        .unwrap_or_default()
}

fn bool_column(row: &Row<'_>, idx: usize) -> bool {
    matches!(row.get_ref(idx), Ok(ValueRef::Integer(i)) if i != 0)
}

fn status_from_sql(status: &str) -> Option<VerificationStatus> {
    [
        VerificationStatus::Unverified,
        VerificationStatus::Valid,
        VerificationStatus::Compromised,
    ]
    .into_iter()
    .find(|s| s.as_str() == status)
}

/// Decodes one row without failing on hashed columns that no longer parse.
///
/// A column that cannot be read back exactly as the ledger writes it gets a
/// placeholder value and its name is recorded.  The record then carries the
/// names in `unreadable_fields`, which makes its digest mismatch, so a
/// rewritten row shows up in verification instead of aborting the read.
struct RowReader<'a, 'r> {
    row: &'a Row<'r>,
    unreadable: Vec<String>,
}

impl<'a, 'r> RowReader<'a, 'r> {
    fn new(row: &'a Row<'r>) -> Self {
        Self {
            row,
            unreadable: Vec::new(),
        }
    }

    fn flag(&mut self, column: &str) {
        if self.unreadable.last().map(String::as_str) != Some(column) {
            self.unreadable.push(column.to_string());
        }
    }

    fn id(&mut self) -> rusqlite::Result<RecordId> {
        let raw: i64 = self.row.get(0)?;
        Ok(RecordId(u64::try_from(raw).unwrap_or_else(|_| {
            self.flag("id");
            0
        })))
    }

    fn opt_text(&mut self, idx: usize, column: &str) -> rusqlite::Result<Option<String>> {
        let text = match self.row.get_ref(idx)? {
            ValueRef::Null => return Ok(None),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => return Ok(Some(s.to_string())),
                Err(_) => String::from_utf8_lossy(bytes).into_owned(),
            },
            ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ValueRef::Integer(i) => i.to_string(),
            ValueRef::Real(f) => f.to_string(),
        };
        self.flag(column);
        Ok(Some(text))
    }

    fn text(&mut self, idx: usize, column: &str) -> rusqlite::Result<String> {
        match self.opt_text(idx, column)? {
            Some(text) => Ok(text),
            None => {
                self.flag(column);
                Ok(String::new())
            }
        }
    }

    /// Out-of-range and non-integer values clamp the same way `CHAIN_TS` does.
    fn timestamp(&mut self, idx: usize, column: &str) -> rusqlite::Result<DateTime<Utc>> {
        let micros = match self.row.get_ref(idx)? {
            ValueRef::Integer(us) if (-MAX_TIMESTAMP_US..=MAX_TIMESTAMP_US).contains(&us) => us,
            ValueRef::Integer(us) => {
                self.flag(column);
                us
            }
            ValueRef::Real(f) => {
                self.flag(column);
                f as i64
            }
            ValueRef::Null => {
                self.flag(column);
                -MAX_TIMESTAMP_US
            }
            ValueRef::Text(_) | ValueRef::Blob(_) => {
                self.flag(column);
                MAX_TIMESTAMP_US
            }
        };
        Ok(lenient_ts(micros))
    }

    fn opt_json(&mut self, idx: usize, column: &str) -> rusqlite::Result<Option<Value>> {
        let Some(text) = self.opt_text(idx, column)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                self.flag(column);
                Ok(Some(Value::String(text)))
            }
        }
    }

    fn json(&mut self, idx: usize, column: &str) -> rusqlite::Result<Value> {
        match self.opt_json(idx, column)? {
            Some(value) => Ok(value),
            None => {
                self.flag(column);
                Ok(Value::Null)
            }
        }
    }

    fn string_list(&mut self, idx: usize, column: &str) -> rusqlite::Result<Vec<String>> {
        let text = self.text(idx, column)?;
        match serde_json::from_str(&text) {
            Ok(list) => Ok(list),
            Err(_) => {
                self.flag(column);
                Ok(vec![text])
            }
        }
    }

    /// An identifier column, accepted only in the exact spelling the ledger
    /// writes.
    fn ident<T: FromStr>(
        &mut self,
        idx: usize,
        column: &str,
        as_str: impl Fn(&T) -> &'static str,
        placeholder: T,
    ) -> rusqlite::Result<T> {
        let text = self.text(idx, column)?;
        match text.parse::<T>() {
            Ok(value) if as_str(&value) == text => Ok(value),
            _ => {
                self.flag(column);
                Ok(placeholder)
            }
        }
    }

    fn finish(self) -> Vec<String> {
        self.unreadable
    }
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let mut r = RowReader::new(row);
    let mut record = AuditRecord {
        id: r.id()?,
        timestamp: r.timestamp(1, "timestamp")?,
        actor: r.text(2, "actor")?,
        target_type: r.text(3, "target_type")?,
        target_id: r.text(4, "target_id")?,
        action: r.ident(5, "action", ActionKind::as_str, ActionKind::View)?,
        before: r.opt_json(6, "before")?,
        after: r.opt_json(7, "after")?,
        changed_fields: r.string_list(8, "changed_fields")?,
        client_ip: r.opt_text(9, "client_ip")?,
        user_agent: r.opt_text(10, "user_agent")?,
        session_id: r.opt_text(11, "session_id")?,
        justification: r.opt_text(12, "justification")?,
        approved_by: r.opt_text(13, "approved_by")?,
        metadata: r.json(14, "metadata")?,
        hash_algorithm: r.ident(15, "hash_algorithm", HashAlgorithm::as_str, HashAlgorithm::default())?,
        record_hash: r.text(16, "record_hash")?,
        previous_record_hash: r.opt_text(17, "previous_record_hash")?,
        archived: bool_column(row, 18),
        unreadable_fields: Vec::new(),
    };
    record.unreadable_fields = r.finish();
    Ok(record)
}

fn integrity_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentIntegrityRecord> {
    let anchor = row
        .get::<_, Option<String>>(17)
        .ok()
        .flatten()
        .map(|network| AnchorRef {
            network,
            transaction_hash: row.get::<_, Option<String>>(18).ok().flatten().unwrap_or_default(),
            block_number: row
                .get::<_, Option<i64>>(19)
                .ok()
                .flatten()
                .and_then(|b| u64::try_from(b).ok()),
            anchored_at: lenient_ts(row.get::<_, Option<i64>>(20).ok().flatten().unwrap_or(0)),
        });
    let status = row.get::<_, Option<String>>(15).ok().flatten();

    let mut r = RowReader::new(row);
    let mut record = DocumentIntegrityRecord {
        id: r.id()?,
        timestamp: r.timestamp(1, "timestamp")?,
        document_type: r.text(2, "document_type")?,
        document_id: r.text(3, "document_id")?,
        document_number: r.text(4, "document_number")?,
        hash_algorithm: r.ident(5, "hash_algorithm", HashAlgorithm::as_str, HashAlgorithm::default())?,
        signature_payload: r.text(6, "signature_payload")?,
        created_by: r.text(7, "created_by")?,
        modified_by: r.opt_text(8, "modified_by")?,
        client_ip: r.opt_text(9, "client_ip")?,
        user_agent: r.opt_text(10, "user_agent")?,
        session_id: r.opt_text(11, "session_id")?,
        compliance_metadata: r.json(12, "compliance_metadata")?,
        record_hash: r.text(13, "record_hash")?,
        previous_record_hash: r.opt_text(14, "previous_record_hash")?,
        verification_status: status.as_deref().and_then(status_from_sql).unwrap_or_default(),
        last_verification: row.get::<_, Option<i64>>(16).ok().flatten().map(lenient_ts),
        anchor,
        current: bool_column(row, 21),
        archived: bool_column(row, 22),
        unreadable_fields: Vec::new(),
    };
    record.unreadable_fields = r.finish();
    Ok(record)
}

/// Per-table SQL and row mapping, so the chain operations are written once.
pub trait SqlChainTable: ChainRecord {
    const TABLE: &'static str;
    const SCOPE_COLUMN: &'static str;
    const COLUMNS: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn insert(&self, conn: &Connection) -> rusqlite::Result<()>;
}

impl SqlChainTable for AuditRecord {
    const TABLE: &'static str = "audit_records";
    const SCOPE_COLUMN: &'static str = "scope";
    const COLUMNS: &'static str = AUDIT_COLUMNS;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        audit_from_row(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        let before = opt_json_to_sql(self.before.as_ref())?;
        let after = opt_json_to_sql(self.after.as_ref())?;
        let changed = json_to_sql(&self.changed_fields)?;
        let metadata = json_to_sql(&self.metadata)?;

        conn.execute(
            r#"
            INSERT INTO audit_records (
                id, scope, timestamp_us, actor, target_type, target_id, action,
                before_state, after_state, changed_fields, client_ip, user_agent,
                session_id, justification, approved_by, metadata, hash_algorithm,
                record_hash, previous_record_hash, archived
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                self.id.0 as i64,
                ChainScope::GLOBAL,
                ts_to_sql(self.timestamp),
                self.actor,
                self.target_type,
                self.target_id,
                self.action.as_str(),
                before,
                after,
                changed,
                self.client_ip,
                self.user_agent,
                self.session_id,
                self.justification,
                self.approved_by,
                metadata,
                self.hash_algorithm.as_str(),
                self.record_hash,
                self.previous_record_hash,
                self.archived,
            ],
        )
        .map(|_| ())
    }
}

impl SqlChainTable for DocumentIntegrityRecord {
    const TABLE: &'static str = "document_integrity_records";
    const SCOPE_COLUMN: &'static str = "document_type";
    const COLUMNS: &'static str = INTEGRITY_COLUMNS;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        integrity_from_row(row)
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        let metadata = json_to_sql(&self.compliance_metadata)?;
        conn.execute(
            "UPDATE document_integrity_records SET current = 0 \
             WHERE document_type = ?1 AND document_id = ?2 AND current = 1",
            params![self.document_type, self.document_id],
        )?;

        conn.execute(
            r#"
            INSERT INTO document_integrity_records (
                id, document_type, timestamp_us, document_id, document_number,
                hash_algorithm, signature_payload, created_by, modified_by, client_ip,
                user_agent, session_id, compliance_metadata, record_hash,
                previous_record_hash, verification_status, current, archived
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18)
            "#,
            params![
                self.id.0 as i64,
                self.document_type,
                ts_to_sql(self.timestamp),
                self.document_id,
                self.document_number,
                self.hash_algorithm.as_str(),
                self.signature_payload,
                self.created_by,
                self.modified_by,
                self.client_ip,
                self.user_agent,
                self.session_id,
                metadata,
                self.record_hash,
                self.previous_record_hash,
                self.verification_status.as_str(),
                self.current,
                self.archived,
            ],
        )
        .map(|_| ())
    }
}

fn head_in<R: SqlChainTable>(conn: &Connection, scope: &ChainScope) -> rusqlite::Result<Option<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} DESC, id DESC LIMIT 1",
        R::COLUMNS,
        R::TABLE,
        R::SCOPE_COLUMN,
        CHAIN_TS
    );
    conn.query_row(&sql, [scope.key()], |row| R::from_row(row))
        .optional()
}

fn query_records<R: SqlChainTable>(
    conn: &Connection,
    filter: &str,
    order: &str,
    params: &[&dyn rusqlite::ToSql],
) -> LedgerResult<Vec<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        R::COLUMNS,
        R::TABLE,
        filter,
        order
    );
    let mut stmt = conn.prepare(&sql).map_err(storage_error)?;
    let rows = stmt
        .query_map(params, |row| R::from_row(row))
        .map_err(storage_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_error)?;
    Ok(rows)
}

// ── ChainStore impls ──────────────────────────────────────────────────────────

impl<R: SqlChainTable> ChainStore<R> for SqliteLedgerStore {
    fn append(
        &self,
        scope: &ChainScope,
        now: DateTime<Utc>,
        timeout: Option<Duration>,
        build: RecordBuilder<'_, R>,
    ) -> LedgerResult<R> {
        let mut conn = self.conn(timeout)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_error)?;

        let head: Option<R> = head_in(&tx, scope).map_err(storage_error)?;
        let next_id: i64 = tx
            .query_row(&format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", R::TABLE), [], |row| {
                row.get(0)
            })
            .map_err(storage_error)?;
        let id = RecordId(next_id as u64);

        let record = build(next_slot(id, now, head.as_ref()));
        if record.scope() != *scope {
            return Err(LedgerError::InvalidInput {
                reason: format!("record for scope '{}' appended to '{}'", record.scope(), scope),
            });
        }
        ensure_extends(scope, head.as_ref(), &record)?;

        record.insert(&tx).map_err(|e| append_error(scope, e))?;
        tx.commit().map_err(storage_error)?;

        debug!(scope = %scope, record_id = %id, hash = %record.record_hash(), "record committed");
        Ok(record)
    }

    fn last_hash(&self, scope: &ChainScope, excluding: Option<RecordId>) -> LedgerResult<Option<String>> {
        let conn = self.conn(None)?;
        let sql = format!(
            "SELECT record_hash FROM {} WHERE {} = ?1 AND id != ?2 \
             ORDER BY {} DESC, id DESC LIMIT 1",
            R::TABLE,
            R::SCOPE_COLUMN,
            CHAIN_TS
        );
        let excluded = excluding.map(|id| id.0 as i64).unwrap_or(-1);
        conn.query_row(&sql, params![scope.key(), excluded], |row| row.get(0))
            .optional()
            .map_err(storage_error)
    }

    fn scan(
        &self,
        scope: &ChainScope,
        after: Option<&ScanCursor>,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<R>> {
        let conn = self.conn(None)?;
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);
        let order = format!("{} ASC, id ASC LIMIT {}", CHAIN_TS, limit);
        match after {
            Some(c) => {
                let filter = format!(
                    "{scope} = ?1 AND ({ts} > ?2 OR ({ts} = ?2 AND id > ?3))",
                    scope = R::SCOPE_COLUMN,
                    ts = CHAIN_TS
                );
                query_records(
                    &conn,
                    &filter,
                    &order,
                    params![scope.key(), ts_to_sql(c.timestamp), c.id.0 as i64],
                )
            }
            None => {
                let filter = format!("{} = ?1", R::SCOPE_COLUMN);
                query_records(&conn, &filter, &order, params![scope.key()])
            }
        }
    }

    fn get(&self, scope: &ChainScope, id: RecordId) -> LedgerResult<Option<R>> {
        let conn = self.conn(None)?;
        let filter = format!("{} = ?1 AND id = ?2", R::SCOPE_COLUMN);
        let mut rows = query_records(&conn, &filter, "id", params![scope.key(), id.0 as i64])?;
        Ok(rows.pop())
    }

    fn archive_before(&self, scope: &ChainScope, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        let conn = self.conn(None)?;
        let sql = format!(
            "UPDATE {} SET archived = 1 WHERE {} = ?1 AND timestamp_us < ?2 AND archived = 0",
            R::TABLE,
            R::SCOPE_COLUMN
        );
        conn.execute(&sql, params![scope.key(), ts_to_sql(cutoff)])
            .map_err(storage_error)
    }
}

// ── AuditStore impl ───────────────────────────────────────────────────────────

const NEWEST_FIRST: &str = "timestamp_us DESC, id DESC";

impl AuditStore for SqliteLedgerStore {
    fn find_by_entity(&self, target_type: &str, target_id: &str) -> LedgerResult<Vec<AuditRecord>> {
        let conn = self.conn(None)?;
        query_records(
            &conn,
            "target_type = ?1 AND target_id = ?2",
            NEWEST_FIRST,
            params![target_type, target_id],
        )
    }

    fn find_by_user(&self, actor: &str, window: Option<TimeWindow>) -> LedgerResult<Vec<AuditRecord>> {
        let conn = self.conn(None)?;
        let (from, to) = window_bounds(window);
        query_records(
            &conn,
            "actor = ?1 AND timestamp_us BETWEEN ?2 AND ?3",
            NEWEST_FIRST,
            params![actor, from, to],
        )
    }

    fn find_by_action(
        &self,
        action: ActionKind,
        window: Option<TimeWindow>,
    ) -> LedgerResult<Vec<AuditRecord>> {
        let conn = self.conn(None)?;
        let (from, to) = window_bounds(window);
        query_records(
            &conn,
            "action = ?1 AND timestamp_us BETWEEN ?2 AND ?3",
            NEWEST_FIRST,
            params![action.as_str(), from, to],
        )
    }

    fn find_between(&self, window: TimeWindow) -> LedgerResult<Vec<AuditRecord>> {
        let conn = self.conn(None)?;
        let (from, to) = window_bounds(Some(window));
        query_records(
            &conn,
            "timestamp_us BETWEEN ?1 AND ?2",
            NEWEST_FIRST,
            params![from, to],
        )
    }
}

fn window_bounds(window: Option<TimeWindow>) -> (i64, i64) {
    match window {
        Some(w) => (ts_to_sql(w.from), ts_to_sql(w.to)),
        None => (i64::MIN, i64::MAX),
    }
}

// ── IntegrityStore impl ───────────────────────────────────────────────────────

impl SqliteLedgerStore {
    fn integrity_by_id(
        &self,
        conn: &Connection,
        document_type: &str,
        id: RecordId,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        let mut rows: Vec<DocumentIntegrityRecord> = query_records(
            conn,
            "document_type = ?1 AND id = ?2",
            "id",
            params![document_type, id.0 as i64],
        )?;
        rows.pop().ok_or_else(|| LedgerError::RecordNotFound {
            scope: document_type.to_string(),
            id: id.0,
        })
    }
}

impl IntegrityStore for SqliteLedgerStore {
    fn find_current(
        &self,
        document_type: &str,
        document_id: &str,
    ) -> LedgerResult<Option<DocumentIntegrityRecord>> {
        let conn = self.conn(None)?;
        let mut rows = query_records(
            &conn,
            "document_type = ?1 AND document_id = ?2 AND current = 1",
            NEWEST_FIRST,
            params![document_type, document_id],
        )?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    fn history(
        &self,
        document_type: &str,
        document_id: &str,
    ) -> LedgerResult<Vec<DocumentIntegrityRecord>> {
        let conn = self.conn(None)?;
        query_records(
            &conn,
            "document_type = ?1 AND document_id = ?2",
            "timestamp_us ASC, id ASC",
            params![document_type, document_id],
        )
    }

    fn find_current_by_type(&self, document_type: &str) -> LedgerResult<Vec<DocumentIntegrityRecord>> {
        let conn = self.conn(None)?;
        query_records(
            &conn,
            "document_type = ?1 AND current = 1",
            "timestamp_us ASC, id ASC",
            params![document_type],
        )
    }

    fn record_verification(
        &self,
        document_type: &str,
        id: RecordId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        let conn = self.conn(None)?;
        conn.execute(
        "UPDATE document_integrity_records \
         SET verification_status = ?1, last_verification_us = ?2 \
         WHERE document_type = ?3 AND id = ?4",
        params![status.as_str(), ts_to_sql(at), document_type, id.0 as i64],
        )
        .map_err(storage_error)?;
        self.integrity_by_id(&conn, document_type, id)
    }

    fn attach_anchor(
        &self,
        document_type: &str,
        id: RecordId,
        anchor: &AnchorRef,
    ) -> LedgerResult<DocumentIntegrityRecord> {
        let anchor = AnchorRef {
            anchored_at: storage_precision(anchor.anchored_at),
            ..anchor.clone()
        };
        let mut conn = self.conn(None)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_error)?;

        let existing = self.integrity_by_id(&tx, document_type, id)?;
        match &existing.anchor {
            Some(a) if *a == anchor => return Ok(existing),
            Some(_) => return Err(LedgerError::AnchorConflict { id: id.0 }),
            None => {}
        }

        tx.execute(
            "UPDATE document_integrity_records \
             SET anchor_network = ?1, anchor_transaction_hash = ?2, \
                 anchor_block_number = ?3, anchored_at_us = ?4 \
             WHERE document_type = ?5 AND id = ?6",
            params![
                anchor.network,
                anchor.transaction_hash,
                anchor.block_number.map(|b| b as i64),
                ts_to_sql(anchor.anchored_at),
                document_type,
                id.0 as i64,
            ],
        )
        .map_err(storage_error)?;
        let updated = self.integrity_by_id(&tx, document_type, id)?;
        tx.commit().map_err(storage_error)?;
        Ok(updated)
    }
}
