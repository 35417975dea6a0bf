//! Simulated CRM data for the SCEAU reference scenarios.
//!
//! All data in this module is hardcoded and fictional.  It stands in for the
//! client and quote tables of a real CRM so the scenarios can exercise the
//! ledgers without a host application.

use chrono::{TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use sceau_contracts::{
    audit::RequestContext,
    error::{LedgerError, LedgerResult},
    integrity::{AnchorRef, DocumentSignature},
};

/// Sales representative performing day-to-day changes.
pub const SALES_REP: &str = "user:12";
/// Back-office administrator allowed to delete clients.
pub const ADMIN: &str = "user:1";

// ── Request context ───────────────────────────────────────────────────────────

/// Context of an authenticated browser request with a fresh session id.
pub fn request_context() -> RequestContext {
    RequestContext::new(
        "192.0.2.44",
        "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0",
        Uuid::new_v4().to_string(),
    )
}

// ── Clients ───────────────────────────────────────────────────────────────────

/// Snapshot of `Client#id` as the CRM would serialize it for the audit trail.
pub fn client_snapshot(id: u32, status: &str, email: &str) -> Value {
    json!({
        "id": id,
        "company": "Boulangerie Martin SARL",
        "siret": "73282932000074",
        "email": email,
        "status": status,
        "address": {
            "street": "12 rue des Lilas",
            "postcode": "69003",
            "city": "Lyon"
        }
    })
}

// ── Quotes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct QuoteLine {
    pub label: &'static str,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// A finalized quote (`devis`) ready to be signed.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub id: u32,
    pub number: String,
    pub client_id: u32,
    pub vat_rate_percent: i64,
    pub lines: Vec<QuoteLine>,
}

impl Quote {
    pub fn total_ht_cents(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.unit_price_cents * i64::from(l.quantity))
            .sum()
    }

    pub fn total_ttc_cents(&self) -> i64 {
        let ht = self.total_ht_cents();
        ht + ht * self.vat_rate_percent / 100
    }

    /// The signed content: a stable serialization of the quote body.
    pub fn signature_payload(&self) -> LedgerResult<String> {
        serde_json::to_string(self).map_err(|e| LedgerError::InvalidInput {
            reason: format!("quote {} cannot be serialized for signing: {}", self.number, e),
        })
    }

    pub fn signature(&self) -> LedgerResult<DocumentSignature> {
        let payload = self.signature_payload()?;
        Ok(DocumentSignature::new("devis", self.id, self.number.clone(), payload)
            .compliance_metadata(json!({
                "client_id": self.client_id,
                "total_ht_cents": self.total_ht_cents(),
                "total_ttc_cents": self.total_ttc_cents(),
                "vat_rate_percent": self.vat_rate_percent,
                "legal_mentions": ["validite 30 jours", "penalites de retard 3x taux legal"],
            })))
    }
}

/// Quote `DEV-2024-<id>` for client 42.
pub fn quote(id: u32) -> Quote {
    Quote {
        id,
        number: format!("DEV-2024-{:04}", id),
        client_id: 42,
        vat_rate_percent: 20,
        lines: vec![
            QuoteLine {
                label: "Four a sole, installation comprise",
                quantity: 1,
                unit_price_cents: 1_250_000,
            },
            QuoteLine {
                label: "Contrat de maintenance annuel",
                quantity: 2,
                unit_price_cents: 90_000,
            },
        ],
    }
}

// ── Anchors ───────────────────────────────────────────────────────────────────

/// A fictional Polygon transaction carrying a published digest.
pub fn polygon_anchor(transaction_hash: &str) -> AnchorRef {
    AnchorRef {
        network: "polygon".to_string(),
        transaction_hash: transaction_hash.to_string(),
        block_number: Some(55_312_908),
        anchored_at: Utc
            .with_ymd_and_hms(2024, 6, 3, 14, 30, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_carries_quote_body() {
        let q = quote(7);
        let signature = q.signature().unwrap();

        assert_eq!(signature.document_number, "DEV-2024-0007");
        assert_eq!(signature.signature_payload, q.signature_payload().unwrap());
        let body: Value = serde_json::from_str(&signature.signature_payload).unwrap();
        assert_eq!(body["lines"][0]["unit_price_cents"], 1_250_000);
        assert_eq!(signature.compliance_metadata["total_ttc_cents"], 1_716_000);
    }
}
