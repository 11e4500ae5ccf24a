//! Embedded-XML metadata schema interpretation.
//!
//! The container is partially self-describing: schema blocks carry XML
//! documents that declare the field layout of subsequent raw data pages.
//!
//! ```xml
//! <MetaInfo Id="3" Name="DeviceCatalog" Record="96">
//!   <Field Name="OrderNumber" Type="Str" Offset="0" Width="24"/>
//!   <Field Name="MaxBlocks" Type="U32" Offset="24" Width="4"/>
//! </MetaInfo>
//! ```
//!
//! Schemas are resolved once and cached in a [`SchemaSet`] keyed by schema
//! id, never reinterpreted per page. Interpretation is forward-compatible
//! across the supported format families: unknown field types become
//! [`FieldKind::Opaque`] and unknown elements or attributes are ignored.
//! Only structurally invalid XML is an error.

mod value;

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, trace};

pub use value::{decode_records, DecodedRecord, FieldValue};

/// Data type of one schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit little-endian integer
    U16,
    /// Unsigned 32-bit little-endian integer
    U32,
    /// Unsigned 64-bit little-endian integer
    U64,
    /// NUL-padded UTF-8 text
    Str,
    /// 16-byte GUID
    Guid,
    /// Unrecognized type string, decoded as raw bytes
    Opaque(String),
}

impl FieldKind {
    /// Parses a type string; unknown values are preserved as [`Self::Opaque`].
    pub fn from_type_str(s: &str) -> Self {
        match s {
            "U8" => Self::U8,
            "U16" => Self::U16,
            "U32" => Self::U32,
            "U64" => Self::U64,
            "Str" => Self::Str,
            "Guid" => Self::Guid,
            other => Self::Opaque(other.to_string()),
        }
    }
}

/// Layout of one field within a fixed-width record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name as declared by the schema
    pub name: String,
    /// Field data type
    pub kind: FieldKind,
    /// Byte offset within the record
    pub offset: usize,
    /// Byte width within the record
    pub width: usize,
}

/// One resolved metadata schema.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Schema id (the frame's object id)
    pub id: u64,
    /// Schema name; binds model semantics (e.g. `DeviceCatalog`)
    pub name: String,
    /// Fixed record width in bytes
    pub record_len: usize,
    /// Ordered field descriptors
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Parses a schema document from a decompressed schema block payload.
    ///
    /// `id` comes from the frame's object id, which is authoritative over
    /// any `Id` attribute the document may carry.
    pub fn parse(id: u64, xml: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(xml)
            .map_err(|e| Error::schema_parse(format!("schema is not UTF-8: {e}")))?;

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut name = String::new();
        let mut declared_record: Option<usize> = None;
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut seen_root = false;

        loop {
            match reader
                .read_event()
                .map_err(|e| Error::schema_parse(e.to_string()))?
            {
                Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                    b"MetaInfo" => {
                        seen_root = true;
                        let attrs = collect_attrs(&e)?;
                        if let Some(v) = attrs.get("Name") {
                            name = v.clone();
                        }
                        if let Some(v) = attrs.get("Record") {
                            declared_record = Some(parse_usize("Record", v)?);
                        }
                    }
                    b"Field" => {
                        let attrs = collect_attrs(&e)?;
                        let field_name = attrs
                            .get("Name")
                            .cloned()
                            .ok_or_else(|| Error::schema_parse("Field without Name"))?;
                        let kind = attrs
                            .get("Type")
                            .map(|s| FieldKind::from_type_str(s))
                            .unwrap_or(FieldKind::Opaque(String::new()));
                        let offset = parse_usize(
                            "Offset",
                            attrs
                                .get("Offset")
                                .ok_or_else(|| Error::schema_parse("Field without Offset"))?,
                        )?;
                        let width = parse_usize(
                            "Width",
                            attrs
                                .get("Width")
                                .ok_or_else(|| Error::schema_parse("Field without Width"))?,
                        )?;
                        fields.push(FieldDescriptor {
                            name: field_name,
                            kind,
                            offset,
                            width,
                        });
                    }
                    // Unknown elements are forward-compatible extensions
                    other => {
                        trace!(
                            element = String::from_utf8_lossy(other).as_ref(),
                            "ignoring unknown schema element"
                        );
                    }
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(Error::schema_parse("document has no MetaInfo root"));
        }

        // Without a declared record width, fall back to the field extent.
        // Declared offsets are untrusted and may sit at the usize boundary.
        let record_len = declared_record.unwrap_or_else(|| {
            fields
                .iter()
                .map(|f| f.offset.saturating_add(f.width))
                .max()
                .unwrap_or(0)
        });
        if record_len == 0 {
            return Err(Error::schema_parse("schema declares no record layout"));
        }

        debug!(
            id,
            name,
            record_len,
            fields = fields.len(),
            "resolved schema"
        );

        Ok(Self {
            id,
            name,
            record_len,
            fields,
        })
    }
}

fn collect_attrs(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::schema_parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_usize(attr: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| Error::schema_parse(format!("attribute {attr}=\"{value}\" is not a number")))
}

/// Cache of resolved schemas, keyed by schema id.
#[derive(Debug, Default)]
pub struct SchemaSet {
    schemas: HashMap<u64, Schema>,
}

impl SchemaSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a resolved schema; a later schema block for the same id
    /// supersedes the earlier one (append-log discipline).
    pub fn insert(&mut self, schema: Schema) {
        self.schemas.insert(schema.id, schema);
    }

    /// Looks up a schema by id.
    pub fn resolve(&self, id: u64) -> Option<&Schema> {
        self.schemas.get(&id)
    }

    /// Number of resolved schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true when no schema has been resolved.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEVICE_SCHEMA: &str = r#"
        <MetaInfo Id="3" Name="DeviceCatalog" Record="64">
          <Field Name="Name" Type="Str" Offset="0" Width="24"/>
          <Field Name="OrderNumber" Type="Str" Offset="24" Width="24"/>
          <Field Name="MaxBlocks" Type="U32" Offset="48" Width="4"/>
        </MetaInfo>"#;

    #[test]
    fn test_parse_schema() {
        let schema = Schema::parse(3, DEVICE_SCHEMA.as_bytes()).unwrap();
        assert_eq!(schema.id, 3);
        assert_eq!(schema.name, "DeviceCatalog");
        assert_eq!(schema.record_len, 64);
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(
            schema.fields[2],
            FieldDescriptor {
                name: "MaxBlocks".into(),
                kind: FieldKind::U32,
                offset: 48,
                width: 4,
            }
        );
    }

    #[test]
    fn test_record_len_falls_back_to_field_extent() {
        let xml = r#"<MetaInfo Name="Station">
            <Field Name="Id" Type="Str" Offset="0" Width="48"/>
        </MetaInfo>"#;
        let schema = Schema::parse(1, xml.as_bytes()).unwrap();
        assert_eq!(schema.record_len, 48);
    }

    #[test]
    fn test_unknown_type_preserved_as_opaque() {
        let xml = r#"<MetaInfo Name="X" Record="8">
            <Field Name="Future" Type="Decimal128" Offset="0" Width="8"/>
        </MetaInfo>"#;
        let schema = Schema::parse(1, xml.as_bytes()).unwrap();
        assert_eq!(
            schema.fields[0].kind,
            FieldKind::Opaque("Decimal128".into())
        );
    }

    #[test]
    fn test_unknown_elements_and_attrs_ignored() {
        let xml = r#"<MetaInfo Name="X" Record="4" Revision="9" Culture="en-US">
            <Provenance Tool="HWCN"/>
            <Field Name="A" Type="U32" Offset="0" Width="4" Hint="volatile"/>
        </MetaInfo>"#;
        let schema = Schema::parse(1, xml.as_bytes()).unwrap();
        assert_eq!(schema.fields.len(), 1);
    }

    #[test]
    fn test_boundary_offset_does_not_overflow() {
        // A field offset at the usize boundary must saturate, not wrap, when
        // the record extent is derived from it.
        let xml = format!(
            r#"<MetaInfo Name="X">
                <Field Name="Huge" Type="U8" Offset="{}" Width="1"/>
            </MetaInfo>"#,
            usize::MAX
        );
        let schema = Schema::parse(1, xml.as_bytes()).unwrap();
        assert_eq!(schema.record_len, usize::MAX);
    }

    #[test]
    fn test_malformed_xml_rejected() {
        let xml = r#"<MetaInfo Name="X"><Field Name="A" "#;
        assert!(matches!(
            Schema::parse(1, xml.as_bytes()),
            Err(Error::SchemaParse { .. })
        ));
    }

    #[test]
    fn test_missing_root_rejected() {
        let xml = r#"<Other/>"#;
        assert!(matches!(
            Schema::parse(1, xml.as_bytes()),
            Err(Error::SchemaParse { .. })
        ));
    }

    #[test]
    fn test_non_numeric_offset_rejected() {
        let xml = r#"<MetaInfo Name="X" Record="4">
            <Field Name="A" Type="U32" Offset="zero" Width="4"/>
        </MetaInfo>"#;
        assert!(matches!(
            Schema::parse(1, xml.as_bytes()),
            Err(Error::SchemaParse { .. })
        ));
    }

    #[test]
    fn test_schema_set_supersedes_by_id() {
        let mut set = SchemaSet::new();
        set.insert(Schema::parse(3, DEVICE_SCHEMA.as_bytes()).unwrap());
        let newer = r#"<MetaInfo Name="DeviceCatalogV2" Record="64">
            <Field Name="Name" Type="Str" Offset="0" Width="64"/>
        </MetaInfo>"#;
        set.insert(Schema::parse(3, newer.as_bytes()).unwrap());

        assert_eq!(set.len(), 1);
        assert_eq!(set.resolve(3).unwrap().name, "DeviceCatalogV2");
        assert!(set.resolve(99).is_none());
    }
}
