//! Canonical serialization and digest primitives.
//!
//! Every field that contributes to a record's hash is written explicitly, in
//! a fixed order chosen by the record type, so nothing depends on map
//! iteration order.
//!
//! Encoding layout (bytes, in order):
//!   1. codec version (1 byte)
//!   2. record kind, length-prefixed UTF-8
//!   3. for each field: name (length-prefixed UTF-8), type tag (1 byte),
//!      body (length-prefixed)
//!
//! Lengths are 8-byte big-endian.  JSON bodies are canonical JSON: no
//! whitespace, object keys sorted at every depth.

use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};

use sceau_contracts::record::HashAlgorithm;

/// Bumped whenever the byte layout changes.
pub const CODEC_VERSION: u8 = 2;

const TAG_NULL: u8 = 0x00;
const TAG_STR: u8 = 0x01;
const TAG_U64: u8 = 0x02;
const TAG_I64: u8 = 0x03;
const TAG_JSON: u8 = 0x04;
const TAG_LIST: u8 = 0x05;

/// Builds the canonical byte string for one record.
#[derive(Debug)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    /// Start an encoding for a record of the given kind (e.g. `"audit"`).
    pub fn new(kind: &str) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.push(CODEC_VERSION);
        put_bytes(&mut buf, kind.as_bytes());
        Self { buf }
    }

    pub fn str(&mut self, name: &str, value: &str) -> &mut Self {
        self.field(name, TAG_STR, value.as_bytes())
    }

    pub fn opt_str(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.str(name, v),
            None => self.null(name),
        }
    }

    pub fn u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.field(name, TAG_U64, &value.to_be_bytes())
    }

    pub fn i64(&mut self, name: &str, value: i64) -> &mut Self {
        self.field(name, TAG_I64, &value.to_be_bytes())
    }

    pub fn json(&mut self, name: &str, value: &Value) -> &mut Self {
        let body = canonical_json(value);
        self.field(name, TAG_JSON, body.as_bytes())
    }

    pub fn opt_json(&mut self, name: &str, value: Option<&Value>) -> &mut Self {
        match value {
            Some(v) => self.json(name, v),
            None => self.null(name),
        }
    }

    pub fn str_list(&mut self, name: &str, values: &[String]) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(&len_prefix(values.len()));
        for v in values {
            put_bytes(&mut body, v.as_bytes());
        }
        self.field(name, TAG_LIST, &body)
    }

    pub fn null(&mut self, name: &str) -> &mut Self {
        self.field(name, TAG_NULL, &[])
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn field(&mut self, name: &str, tag: u8, body: &[u8]) -> &mut Self {
        put_bytes(&mut self.buf, name.as_bytes());
        self.buf.push(tag);
        put_bytes(&mut self.buf, body);
        self
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&len_prefix(bytes.len()));
    buf.extend_from_slice(bytes);
}

fn len_prefix(len: usize) -> [u8; 8] {
    // usize is at most 64 bits on every supported target.
    u64::try_from(len).unwrap_or(u64::MAX).to_be_bytes()
}

/// Render a JSON value with sorted object keys and no insignificant whitespace.
///
/// Independent of whether `serde_json` was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hash `bytes` with `algorithm` and return the lowercase hex digest.
///
/// Pure: no clock, no I/O.
pub fn digest(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
    }
}
