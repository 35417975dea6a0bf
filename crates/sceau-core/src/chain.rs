//! The chained-record abstraction shared by both ledgers.
//!
//! A `ChainRecord` carries a content digest and the digest of the record
//! before it in the same scope.  The hashed field set is fixed per record
//! type below; metadata that changes after hashing (archival, verification
//! status, anchors, the `current` pointer) is deliberately left out.

use chrono::{DateTime, Utc};

use sceau_contracts::{
    audit::AuditRecord,
    integrity::DocumentIntegrityRecord,
    record::{ChainScope, HashAlgorithm, RecordId, ScanCursor},
};

use crate::codec::{digest, CanonicalEncoder};

/// A record that participates in a hash chain.
pub trait ChainRecord: Clone + Send + Sync + 'static {
    /// Record kind written at the start of the canonical encoding.
    const KIND: &'static str;

    fn id(&self) -> RecordId;
    fn timestamp(&self) -> DateTime<Utc>;
    fn scope(&self) -> ChainScope;
    fn record_hash(&self) -> &str;
    fn previous_record_hash(&self) -> Option<&str>;
    fn hash_algorithm(&self) -> HashAlgorithm;

    fn is_archived(&self) -> bool;
    fn set_archived(&mut self, archived: bool);

    /// Records with the same lineage key supersede each other within a scope;
    /// only the newest is current.  `None` means records never supersede.
    fn lineage(&self) -> Option<&str> {
        None
    }

    fn set_current(&mut self, _current: bool) {}

    /// Canonical bytes of every hashed field, including the previous hash and
    /// excluding `record_hash` itself.
    fn canonicalize(&self) -> Vec<u8>;

    /// Digest recomputed from the currently stored fields.
    fn recompute_hash(&self) -> String {
        digest(self.hash_algorithm(), &self.canonicalize())
    }

    /// True when the stored digest still matches the stored fields.
    fn verify_hash(&self) -> bool {
        self.recompute_hash() == self.record_hash()
    }

    fn cursor(&self) -> ScanCursor {
        ScanCursor {
            timestamp: self.timestamp(),
            id: self.id(),
        }
    }
}

/// Order key used everywhere records are sorted: `(timestamp, id)`.
pub fn chain_order<R: ChainRecord>(a: &R, b: &R) -> std::cmp::Ordering {
    (a.timestamp(), a.id()).cmp(&(b.timestamp(), b.id()))
}

impl ChainRecord for AuditRecord {
    const KIND: &'static str = "audit";

    fn id(&self) -> RecordId {
        self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn scope(&self) -> ChainScope {
        ChainScope::Global
    }

    fn record_hash(&self) -> &str {
        &self.record_hash
    }

    fn previous_record_hash(&self) -> Option<&str> {
        self.previous_record_hash.as_deref()
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn is_archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn canonicalize(&self) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new(Self::KIND);
        enc.u64("id", self.id.0)
            .i64("timestamp", self.timestamp.timestamp_micros())
            .str("hash_algorithm", self.hash_algorithm.as_str())
            .str("actor", &self.actor)
            .str("target_type", &self.target_type)
            .str("target_id", &self.target_id)
            .str("action", self.action.as_str())
            .opt_json("before", self.before.as_ref())
            .opt_json("after", self.after.as_ref())
            .str_list("changed_fields", &self.changed_fields)
            .opt_str("client_ip", self.client_ip.as_deref())
            .opt_str("user_agent", self.user_agent.as_deref())
            .opt_str("session_id", self.session_id.as_deref())
            .opt_str("justification", self.justification.as_deref())
            .opt_str("approved_by", self.approved_by.as_deref())
            .json("metadata", &self.metadata)
            .opt_str("previous_record_hash", self.previous_record_hash.as_deref());
        if !self.unreadable_fields.is_empty() {
            enc.str_list("unreadable_fields", &self.unreadable_fields);
        }
        enc.finish()
    }
}

impl ChainRecord for DocumentIntegrityRecord {
    const KIND: &'static str = "document_integrity";

    fn id(&self) -> RecordId {
        self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn scope(&self) -> ChainScope {
        ChainScope::document(self.document_type.clone())
    }

    fn record_hash(&self) -> &str {
        &self.record_hash
    }

    fn previous_record_hash(&self) -> Option<&str> {
        self.previous_record_hash.as_deref()
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn is_archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn lineage(&self) -> Option<&str> {
        Some(&self.document_id)
    }

    fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    fn canonicalize(&self) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new(Self::KIND);
        enc.u64("id", self.id.0)
            .i64("timestamp", self.timestamp.timestamp_micros())
            .str("hash_algorithm", self.hash_algorithm.as_str())
            .str("document_type", &self.document_type)
            .str("document_id", &self.document_id)
            .str("document_number", &self.document_number)
            .str("signature_payload", &self.signature_payload)
            .str("created_by", &self.created_by)
            .opt_str("modified_by", self.modified_by.as_deref())
            .opt_str("client_ip", self.client_ip.as_deref())
            .opt_str("user_agent", self.user_agent.as_deref())
            .opt_str("session_id", self.session_id.as_deref())
            .json("compliance_metadata", &self.compliance_metadata)
            .opt_str("previous_record_hash", self.previous_record_hash.as_deref());
        if !self.unreadable_fields.is_empty() {
            enc.str_list("unreadable_fields", &self.unreadable_fields);
        }
        enc.finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use sceau_contracts::{
        audit::{ActionKind, AuditRecord},
        integrity::{AnchorRef, DocumentIntegrityRecord, VerificationStatus},
        record::{HashAlgorithm, RecordId},
    };

    use super::ChainRecord;

    fn audit_record() -> AuditRecord {
        let mut r = AuditRecord {
            id: RecordId(1),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            actor: "user:12".to_string(),
            target_type: "Client".to_string(),
            target_id: "42".to_string(),
            action: ActionKind::Update,
            before: Some(json!({ "name": "ACME" })),
            after: Some(json!({ "name": "ACME SA" })),
            changed_fields: vec!["name".to_string()],
            client_ip: Some("10.0.0.8".to_string()),
            user_agent: None,
            session_id: Some("s-1".to_string()),
            justification: None,
            approved_by: None,
            metadata: json!({}),
            hash_algorithm: HashAlgorithm::Sha256,
            record_hash: String::new(),
            previous_record_hash: None,
            archived: false,
            unreadable_fields: Vec::new(),
        };
        r.record_hash = r.recompute_hash();
        r
    }

    fn integrity_record() -> DocumentIntegrityRecord {
        let mut r = DocumentIntegrityRecord {
            id: RecordId(7),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            document_type: "devis".to_string(),
            document_id: "7".to_string(),
            document_number: "DEV-2024-0007".to_string(),
            hash_algorithm: HashAlgorithm::Sha256,
            signature_payload: "sig".to_string(),
            created_by: "user:3".to_string(),
            modified_by: None,
            client_ip: None,
            user_agent: None,
            session_id: None,
            compliance_metadata: json!({ "nf525": true }),
            record_hash: String::new(),
            previous_record_hash: None,
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

    #[test]
    fn recomputed_hash_is_stable() {
        let r = audit_record();
        assert!(r.verify_hash());
        assert_eq!(r.record_hash.len(), 64);
        assert_eq!(r.clone().recompute_hash(), r.record_hash);
    }

    #[test]
    fn every_hashed_audit_field_changes_the_digest() {
        let base = audit_record();
        let mutations: Vec<Box<dyn Fn(&mut AuditRecord)>> = vec![
            Box::new(|r| r.id = RecordId(2)),
            Box::new(|r| r.timestamp = r.timestamp + chrono::Duration::microseconds(1)),
            Box::new(|r| r.actor = "user:13".into()),
            Box::new(|r| r.target_id = "43".into()),
            Box::new(|r| r.action = ActionKind::Delete),
            Box::new(|r| r.after = Some(json!({ "name": "EVIL" }))),
            Box::new(|r| r.changed_fields.push("vat".into())),
            Box::new(|r| r.client_ip = None),
            Box::new(|r| r.justification = Some("because".into())),
            Box::new(|r| r.metadata = json!({ "k": 1 })),
            Box::new(|r| r.previous_record_hash = Some("00".into())),
            Box::new(|r| r.hash_algorithm = HashAlgorithm::Sha512),
        ];

        for (i, mutate) in mutations.iter().enumerate() {
            let mut r = base.clone();
            mutate(&mut r);
            assert!(!r.verify_hash(), "mutation {i} must invalidate the stored hash");
        }
    }

    #[test]
    fn metadata_fields_are_not_hashed() {
        let mut r = integrity_record();
        r.verification_status = VerificationStatus::Compromised;
        r.last_verification = Some(Utc::now());
        r.current = false;
        r.archived = true;
        r.anchor = Some(AnchorRef {
            network: "bitcoin".into(),
            transaction_hash: "ab".repeat(32),
            block_number: Some(840_000),
            anchored_at: Utc::now(),
        });
        assert!(r.verify_hash(), "non-hashed metadata must not affect the digest");
    }

    /// A record decoded with placeholders never passes, even when the
    /// placeholder happens to equal the original value.
    #[test]
    fn unreadable_fields_invalidate_the_digest() {
        let mut r = audit_record();
        r.unreadable_fields = vec!["action".into()];
        assert!(!r.verify_hash());

        let mut d = integrity_record();
        d.unreadable_fields = vec!["compliance_metadata".into()];
        assert!(!d.verify_hash());
    }

    #[test]
    fn signature_tampering_is_detected() {
        let mut r = integrity_record();
        r.signature_payload = "forged".into();
        assert!(!r.verify_hash());
    }

    #[test]
    fn equal_json_with_different_key_order_hashes_identically() {
        let mut a = audit_record();
        a.metadata = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let mut b = audit_record();
        b.metadata = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        assert_eq!(a.recompute_hash(), b.recompute_hash());
    }
}
