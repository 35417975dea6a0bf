//! Record builders shared by the store tests.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use sceau_contracts::{
    audit::{ActionKind, AuditRecord},
    integrity::{DocumentIntegrityRecord, VerificationStatus},
    record::{ChainScope, ChainSlot, HashAlgorithm},
};
use sceau_core::{ChainRecord, ChainStore};

pub(crate) fn audit(slot: ChainSlot, target_id: &str, action: ActionKind) -> AuditRecord {
    let mut r = AuditRecord {
        id: slot.id,
        timestamp: slot.timestamp,
        actor: "user:1".to_string(),
        target_type: "Client".to_string(),
        target_id: target_id.to_string(),
        action,
        before: None,
        after: Some(json!({ "name": "ACME", "credit": 1.1 })),
        changed_fields: vec!["name".to_string()],
        client_ip: Some("10.0.0.1".to_string()),
        user_agent: None,
        session_id: Some("s-1".to_string()),
        justification: None,
        approved_by: None,
        metadata: Value::Null,
        hash_algorithm: HashAlgorithm::Sha256,
        record_hash: String::new(),
        previous_record_hash: slot.previous_record_hash,
        archived: false,
        unreadable_fields: Vec::new(),
    };
    r.record_hash = r.recompute_hash();
    r
}

pub(crate) fn integrity(slot: ChainSlot, document_type: &str, document_id: &str) -> DocumentIntegrityRecord {
    let mut r = DocumentIntegrityRecord {
        id: slot.id,
        timestamp: slot.timestamp,
        document_type: document_type.to_string(),
        document_id: document_id.to_string(),
        document_number: format!("DOC-{}", document_id),
        hash_algorithm: HashAlgorithm::Sha256,
        signature_payload: "sig".to_string(),
        created_by: "user:1".to_string(),
        modified_by: None,
        client_ip: None,
        user_agent: None,
        session_id: None,
        compliance_metadata: json!({ "nf525": true }),
        record_hash: String::new(),
        previous_record_hash: slot.previous_record_hash,
        verification_status: VerificationStatus::Unverified,
        last_verification: None,
        anchor: None,
        current: true,
        archived: false,
        unreadable_fields: Vec::new(),
    };
    r.record_hash = r.recompute_hash();
    r
}

pub(crate) fn append_audit<S: ChainStore<AuditRecord> + ?Sized>(
    store: &S,
    now: DateTime<Utc>,
    target_id: &str,
    action: ActionKind,
) -> AuditRecord {
    store
        .append(&ChainScope::Global, now, None, &|slot| audit(slot, target_id, action))
        .unwrap()
}

pub(crate) fn append_integrity<S: ChainStore<DocumentIntegrityRecord> + ?Sized>(
    store: &S,
    document_type: &str,
    document_id: &str,
) -> DocumentIntegrityRecord {
    store
        .append(&ChainScope::document(document_type), Utc::now(), None, &|slot| {
            integrity(slot, document_type, document_id)
        })
        .unwrap()
}
