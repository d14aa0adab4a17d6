//! The persisted envelope format.
//!
//! ```json
//! { "format": 1, "module": "occupancy", "universe": "Target",
//!   "saved_at": "2026-10-19T10:00:00Z", "checksum": "<sha256 hex>",
//!   "fields": { "dailyHours": { "value": { "Number": 12.0 }, "provenance": "User" } } }
//! ```
//!
//! The checksum covers the canonical JSON of `fields` only. A flat
//! `{"field": "text"}` object without a `format` key is a legacy blob and
//! decodes as format 0.

use crate::checksum::Checksum;
use crate::error::{PersistError, Result};
use crate::slot::SlotKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tws_core::{Provenance, StoredValue, Universe, Value};

/// Newest envelope format this crate reads and the one it writes.
pub const FORMAT_VERSION: u32 = 1;

/// Format number reported for legacy flat-map blobs.
pub const LEGACY_FORMAT: u32 = 0;

/// One universe's persisted fields, keyed by field name.
pub type StateMap = BTreeMap<String, StoredValue>;

/// Versioned, checksummed snapshot of one module universe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub format: u32,
    pub module: String,
    pub universe: Universe,
    pub saved_at: DateTime<Utc>,
    pub checksum: Checksum,
    pub fields: StateMap,
}

impl Envelope {
    /// Seal `fields` into a current-format envelope.
    pub fn seal(key: &SlotKey, fields: StateMap) -> Result<Self> {
        let checksum = fields_checksum(&fields)?;
        Ok(Envelope {
            format: FORMAT_VERSION,
            module: key.module().to_string(),
            universe: key.universe(),
            saved_at: Utc::now(),
            checksum,
            fields,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify(&self) -> Result<()> {
        let computed = fields_checksum(&self.fields)?;
        if computed != self.checksum {
            return Err(PersistError::ChecksumMismatch {
                stored: self.checksum.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }
}

fn fields_checksum(fields: &StateMap) -> Result<Checksum> {
    Ok(Checksum::of(&serde_json::to_vec(fields)?))
}

/// A successfully decoded slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub format: u32,
    /// Absent for legacy blobs.
    pub saved_at: Option<DateTime<Utc>>,
    pub fields: StateMap,
}

/// Decode a slot blob, verifying format, checksum and ownership.
pub fn decode(key: &SlotKey, blob: &str) -> Result<Decoded> {
    let raw: serde_json::Value = serde_json::from_str(blob)?;
    let object = raw
        .as_object()
        .ok_or_else(|| PersistError::Malformed("expected a JSON object".into()))?;

    let Some(format) = object.get("format") else {
        return decode_legacy(object);
    };

    let found = format
        .as_u64()
        .and_then(|f| u32::try_from(f).ok())
        .ok_or_else(|| PersistError::Malformed(format!("bad format marker {format}")))?;
    if found == LEGACY_FORMAT || found > FORMAT_VERSION {
        return Err(PersistError::UnsupportedFormat {
            found,
            supported: FORMAT_VERSION,
        });
    }

    let envelope: Envelope = serde_json::from_value(raw)?;
    if envelope.module != key.module() || envelope.universe != key.universe() {
        return Err(PersistError::SlotMismatch {
            slot: key.render(),
            found: SlotKey::new(envelope.module, envelope.universe).render(),
        });
    }
    envelope.verify()?;

    Ok(Decoded {
        format: envelope.format,
        saved_at: Some(envelope.saved_at),
        fields: envelope.fields,
    })
}

fn decode_legacy(object: &serde_json::Map<String, serde_json::Value>) -> Result<Decoded> {
    let mut fields = StateMap::new();
    for (name, raw) in object {
        let value = match raw {
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| PersistError::Malformed(format!("{name}: {n}")))?,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            other => {
                return Err(PersistError::Malformed(format!(
                    "legacy field {name} holds {other}"
                )))
            }
        };
        fields.insert(name.clone(), StoredValue::new(value, Provenance::User));
    }
    Ok(Decoded {
        format: LEGACY_FORMAT,
        saved_at: None,
        fields,
    })
}
