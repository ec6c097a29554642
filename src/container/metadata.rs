//! EXTH metadata: the static field registry and the per-book field map

use crate::error::{MobiError, Result};
use crate::layout::Value;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// How a field's value is stored in its EXTH entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// Raw bytes; integers are rendered as ASCII decimal
    Text,
    /// Big-endian u32
    U32,
    /// Single byte
    U8,
}

/// Value a field receives when the caller leaves it unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Text(&'static str),
    /// The assembly date as `YYYY-MM-DD`
    AssemblyDate,
}

/// One recognized EXTH field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExthField {
    pub name: &'static str,
    pub type_code: u32,
    pub encoding: FieldEncoding,
    pub default: Option<FieldDefault>,
}

const fn field(name: &'static str, type_code: u32, encoding: FieldEncoding) -> ExthField {
    ExthField {
        name,
        type_code,
        encoding,
        default: None,
    }
}

use FieldEncoding::{Text, U32, U8};

/// Every field name accepted by [`Metadata::set`]
pub static EXTH_FIELDS: &[ExthField] = &[
    field("drm_server_id", 1, Text),
    field("drm_commerce_id", 2, Text),
    field("drm_ebookbase_book_id", 3, Text),
    field("author", 100, Text),
    field("publisher", 101, Text),
    field("imprint", 102, Text),
    field("description", 103, Text),
    field("isbn", 104, Text),
    field("subject", 105, Text),
    ExthField {
        default: Some(FieldDefault::AssemblyDate),
        ..field("publishingdate", 106, Text)
    },
    field("review", 107, Text),
    field("contributor", 108, Text),
    field("rights", 109, Text),
    field("subjectcode", 110, Text),
    field("type", 111, Text),
    field("source", 112, Text),
    field("asin", 113, Text),
    field("versionnumber", 114, Text),
    field("sample", 115, U32),
    field("startreading", 116, U32),
    field("adult", 117, Text),
    field("retail_price", 118, Text),
    field("retail_price_currency", 119, Text),
    field("coveroffset", 201, U32),
    field("thumboffset", 202, U32),
    field("hasfakecover", 203, U32),
    field("creatorsoftware", 204, U32),
    field("watermark", 208, Text),
    field("tamper_proof_keys", 209, Text),
    field("clippinglimit", 401, U8),
    field("publisherlimit", 402, U32),
    ExthField {
        default: Some(FieldDefault::Text("EBOK")),
        ..field("cdetype", 501, Text)
    },
    field("lastupdatetime", 502, Text),
    field("updatedtitle", 503, Text),
    field("language", 524, Text),
];

/// Look up a field by name
pub fn lookup(name: &str) -> Option<&'static ExthField> {
    EXTH_FIELDS.iter().find(|f| f.name == name)
}

/// Look up a field by type code
pub fn lookup_code(type_code: u32) -> Option<&'static ExthField> {
    EXTH_FIELDS.iter().find(|f| f.type_code == type_code)
}

/// A metadata entry ready to be emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub field: &'static ExthField,
    pub value: Vec<u8>,
}

/// Caller-supplied metadata, one value per recognized field
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: BTreeMap<u32, MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value for it
    ///
    /// Unknown names and values that do not suit the field's encoding are
    /// rejected without touching the map.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let field = lookup(name).ok_or_else(|| MobiError::UnknownField(name.to_string()))?;
        let value = encode_value(field, value.into())?;
        self.entries
            .insert(field.type_code, MetadataEntry { field, value });
        Ok(())
    }

    /// Raw encoded value of a field, if set
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        let field = lookup(name)?;
        self.entries.get(&field.type_code).map(|e| e.value.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set every member of a JSON object; members must be strings or integers
    pub fn set_from_json(&mut self, json: &serde_json::Value) -> Result<()> {
        let object = json.as_object().ok_or_else(|| MobiError::InvalidFieldValue {
            field: "<root>".to_string(),
            reason: "metadata must be a JSON object".to_string(),
        })?;

        // Validate everything first so a bad member leaves the map untouched
        let mut staged = self.clone();
        for (name, value) in object {
            let value = match value {
                serde_json::Value::String(s) => Value::from(s.as_str()),
                serde_json::Value::Number(n) => match n.as_u64() {
                    Some(n) => Value::Int(n),
                    None => {
                        return Err(MobiError::InvalidFieldValue {
                            field: name.clone(),
                            reason: format!("{} is not an unsigned integer", n),
                        })
                    }
                },
                other => {
                    return Err(MobiError::InvalidFieldValue {
                        field: name.clone(),
                        reason: format!("unsupported JSON value: {}", other),
                    })
                }
            };
            staged.set(name, value)?;
        }
        *self = staged;
        Ok(())
    }

    /// Parse a JSON document and set its members
    pub fn set_from_json_str(&mut self, source: &str) -> Result<()> {
        let json: serde_json::Value = serde_json::from_str(source)?;
        self.set_from_json(&json)
    }

    /// Entries to emit, with defaults filled in, in ascending type-code order
    pub fn entries_with_defaults(&self, today: NaiveDate) -> Vec<MetadataEntry> {
        let mut entries = self.entries.clone();
        for field in EXTH_FIELDS {
            let Some(default) = field.default else {
                continue;
            };
            entries.entry(field.type_code).or_insert_with(|| {
                let value = match default {
                    FieldDefault::Text(text) => text.as_bytes().to_vec(),
                    FieldDefault::AssemblyDate => today.format("%Y-%m-%d").to_string().into_bytes(),
                };
                MetadataEntry { field, value }
            });
        }
        entries.into_values().collect()
    }
}

fn encode_value(field: &ExthField, value: Value) -> Result<Vec<u8>> {
    let invalid = |reason: String| MobiError::InvalidFieldValue {
        field: field.name.to_string(),
        reason,
    };
    match (field.encoding, value) {
        (Text, Value::Bytes(bytes)) => Ok(bytes),
        (Text, Value::Int(n)) => Ok(n.to_string().into_bytes()),
        (U32, Value::Int(n)) => u32::try_from(n)
            .map(|n| n.to_be_bytes().to_vec())
            .map_err(|_| invalid(format!("{} does not fit in 32 bits", n))),
        (U8, Value::Int(n)) => u8::try_from(n)
            .map(|n| vec![n])
            .map_err(|_| invalid(format!("{} does not fit in 8 bits", n))),
        (U32 | U8, Value::Bytes(_)) => Err(invalid("expected an integer".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_registry_names_and_codes_are_unique() {
        for (i, a) in EXTH_FIELDS.iter().enumerate() {
            for b in &EXTH_FIELDS[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.type_code, b.type_code);
            }
        }
    }

    #[test]
    fn test_set_and_overwrite() {
        let mut metadata = Metadata::new();
        metadata.set("author", "First").unwrap();
        metadata.set("author", "Jane Doe").unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("author"), Some(&b"Jane Doe"[..]));
    }

    #[test]
    fn test_unknown_field_leaves_map_unchanged() {
        let mut metadata = Metadata::new();
        metadata.set("author", "Jane Doe").unwrap();
        let err = metadata.set("not-a-real-field", "x").unwrap_err();
        assert!(matches!(err, MobiError::UnknownField(name) if name == "not-a-real-field"));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_integer_encodings() {
        let mut metadata = Metadata::new();
        metadata.set("coveroffset", 3u32).unwrap();
        metadata.set("clippinglimit", 10u32).unwrap();
        metadata.set("isbn", 9780000000002u64).unwrap();
        assert_eq!(metadata.get("coveroffset"), Some(&[0, 0, 0, 3][..]));
        assert_eq!(metadata.get("clippinglimit"), Some(&[10][..]));
        assert_eq!(metadata.get("isbn"), Some(&b"9780000000002"[..]));

        assert!(matches!(
            metadata.set("coveroffset", "three"),
            Err(MobiError::InvalidFieldValue { .. })
        ));
        assert!(matches!(
            metadata.set("clippinglimit", 300u32),
            Err(MobiError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let metadata = Metadata::new();
        let entries = metadata.entries_with_defaults(date());
        let codes: Vec<u32> = entries.iter().map(|e| e.field.type_code).collect();
        assert_eq!(codes, vec![106, 501]);
        assert_eq!(entries[0].value, b"2024-03-09".to_vec());
        assert_eq!(entries[1].value, b"EBOK".to_vec());
    }

    #[test]
    fn test_explicit_value_beats_default() {
        let mut metadata = Metadata::new();
        metadata.set("cdetype", "PDOC").unwrap();
        let entries = metadata.entries_with_defaults(date());
        let cde = entries.iter().find(|e| e.field.name == "cdetype").unwrap();
        assert_eq!(cde.value, b"PDOC".to_vec());
    }

    #[test]
    fn test_set_from_json() {
        let mut metadata = Metadata::new();
        let json = serde_json::json!({ "author": "Jane Doe", "sample": 0 });
        metadata.set_from_json(&json).unwrap();
        assert_eq!(metadata.get("author"), Some(&b"Jane Doe"[..]));
        assert_eq!(metadata.get("sample"), Some(&[0, 0, 0, 0][..]));
    }

    #[test]
    fn test_set_from_json_str() {
        let mut metadata = Metadata::new();
        metadata
            .set_from_json_str(r#"{ "publisher": "Blackfall" }"#)
            .unwrap();
        assert_eq!(metadata.get("publisher"), Some(&b"Blackfall"[..]));

        let err = metadata.set_from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, MobiError::JsonError(_)));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_set_from_json_is_atomic() {
        let mut metadata = Metadata::new();
        let json = serde_json::json!({ "author": "Jane Doe", "bogus": "x" });
        assert!(metadata.set_from_json(&json).is_err());
        assert!(metadata.is_empty());
    }
}
