//! Record decoding against a resolved schema.
//!
//! Data entities are sequences of fixed-width records. Fields decode per
//! their declared kind; anything the schema could not name decodes as raw
//! bytes, so newer containers degrade to opaque values instead of failing.

use crate::cursor::format_guid;
use crate::schema::{FieldKind, Schema};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Unsigned 8-bit integer
    U8(u8),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Unsigned 64-bit integer
    U64(u64),
    /// Text with trailing NUL padding stripped
    Str(String),
    /// GUID in canonical text form
    Guid(String),
    /// Opaque bytes (unknown kind, or a field overrunning its record)
    Raw(Vec<u8>),
}

impl FieldValue {
    /// The value as text, when it naturally has one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Guid(s) => Some(s),
            _ => None,
        }
    }

    /// The value widened to u64, when numeric.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }
}

/// One record decoded against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    values: Vec<(String, FieldValue)>,
}

impl DecodedRecord {
    /// Looks up a field value by schema field name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Field text by name, `None` when absent or non-textual.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// Numeric field by name, `None` when absent or non-numeric.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(FieldValue::as_u64)
    }

    /// All decoded `(name, value)` pairs in schema order.
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.values
    }
}

fn decode_field(kind: &FieldKind, bytes: &[u8]) -> FieldValue {
    match kind {
        FieldKind::U8 if !bytes.is_empty() => FieldValue::U8(bytes[0]),
        FieldKind::U16 if bytes.len() >= 2 => {
            FieldValue::U16(u16::from_le_bytes([bytes[0], bytes[1]]))
        }
        FieldKind::U32 if bytes.len() >= 4 => {
            FieldValue::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        FieldKind::U64 if bytes.len() >= 8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            FieldValue::U64(u64::from_le_bytes(b))
        }
        FieldKind::Str => {
            let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            FieldValue::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        FieldKind::Guid if bytes.len() >= 16 => {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(&bytes[..16]);
            FieldValue::Guid(format_guid(&guid))
        }
        // Opaque kinds, and numeric fields narrower than their type
        _ => FieldValue::Raw(bytes.to_vec()),
    }
}

/// Decodes all complete records of `data` against `schema`.
///
/// Trailing partial records and all-zero records (page-tail padding) are
/// skipped. Fields overrunning the record width decode as [`FieldValue::Raw`]
/// of whatever bytes remain.
pub fn decode_records(schema: &Schema, data: &[u8]) -> Vec<DecodedRecord> {
    let mut records = Vec::new();
    if schema.record_len == 0 {
        return records;
    }

    for chunk in data.chunks_exact(schema.record_len) {
        if chunk.iter().all(|&b| b == 0) {
            continue; // padding
        }
        let values = schema
            .fields
            .iter()
            .map(|field| {
                // Offsets come straight from container XML; clamp instead of
                // trusting them to stay within the record (or within usize).
                let start = field.offset.min(chunk.len());
                let end = field.offset.saturating_add(field.width).min(chunk.len());
                (field.name.clone(), decode_field(&field.kind, &chunk[start..end]))
            })
            .collect();
        records.push(DecodedRecord { values });
    }

    records
}
