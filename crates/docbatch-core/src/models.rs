//! Schema and value types shared by the catalog, the coercion engine,
//! the repository port, and the executor.
//!
//! Schema types serialize with camelCase field names; that shape is the
//! `config.json` introspection dump.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Declared data type of a keyword. Names are matched case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordDataType {
    AlphaNumeric,
    Numeric9,
    Numeric20,
    Currency,
    SpecificCurrency,
    FloatingPoint,
    Date,
    DateTime,
}

impl KeywordDataType {
    pub const ALL: [KeywordDataType; 8] = [
        KeywordDataType::AlphaNumeric,
        KeywordDataType::Numeric9,
        KeywordDataType::Numeric20,
        KeywordDataType::Currency,
        KeywordDataType::SpecificCurrency,
        KeywordDataType::FloatingPoint,
        KeywordDataType::Date,
        KeywordDataType::DateTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordDataType::AlphaNumeric => "AlphaNumeric",
            KeywordDataType::Numeric9 => "Numeric9",
            KeywordDataType::Numeric20 => "Numeric20",
            KeywordDataType::Currency => "Currency",
            KeywordDataType::SpecificCurrency => "SpecificCurrency",
            KeywordDataType::FloatingPoint => "FloatingPoint",
            KeywordDataType::Date => "Date",
            KeywordDataType::DateTime => "DateTime",
        }
    }
}

impl fmt::Display for KeywordDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeywordDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeywordDataType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown keyword data type '{}'", s))
    }
}

/// One keyword definition inside a keyword record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordType {
    pub id: i64,
    pub name: String,
    pub data_type: KeywordDataType,
    pub required: bool,
}

/// The authoritative keyword set of a document type.
///
/// Only the first keyword record type of a document type is ever read;
/// later record types are not represented here at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordRecordSchema {
    keyword_types: Vec<KeywordType>,
}

impl KeywordRecordSchema {
    /// Builds a schema from keyword types in repository order. Names are
    /// unique; a repeated name keeps its first definition.
    pub fn new(keyword_types: Vec<KeywordType>) -> Self {
        let mut unique: Vec<KeywordType> = Vec::with_capacity(keyword_types.len());
        for kt in keyword_types {
            if !unique.iter().any(|existing| existing.name == kt.name) {
                unique.push(kt);
            }
        }
        Self {
            keyword_types: unique,
        }
    }

    pub fn keyword_types(&self) -> &[KeywordType] {
        &self.keyword_types
    }

    pub fn get(&self, name: &str) -> Option<&KeywordType> {
        self.keyword_types.iter().find(|kt| kt.name == name)
    }

    pub fn len(&self) -> usize {
        self.keyword_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyword_types.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeSchema {
    pub id: i64,
    pub name: String,
    pub keyword_types: KeywordRecordSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeGroupSchema {
    pub id: i64,
    pub name: String,
    pub document_types: Vec<DocumentTypeSchema>,
}

impl DocumentTypeGroupSchema {
    pub fn document_type(&self, name: &str) -> Option<&DocumentTypeSchema> {
        self.document_types.iter().find(|dt| dt.name == name)
    }
}

/// Repository file format (e.g. `PDF`) a new document is stored as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeHandle {
    pub id: i64,
    pub name: String,
}

/// A keyword value in its typed representation.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordValue {
    Text(String),
    Integer(i64),
    Decimal(BigDecimal),
    Float(f64),
    DateTime(NaiveDateTime),
}

impl KeywordValue {
    /// Short name of the representation, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            KeywordValue::Text(_) => "string",
            KeywordValue::Integer(_) => "integer",
            KeywordValue::Decimal(_) => "decimal",
            KeywordValue::Float(_) => "float",
            KeywordValue::DateTime(_) => "datetime",
        }
    }
}

/// Canonical writer. Output read back by [`crate::coerce::coerce`] with the
/// originating data type yields the same value.
impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordValue::Text(s) => f.write_str(s),
            KeywordValue::Integer(n) => write!(f, "{}", n),
            KeywordValue::Decimal(d) => write!(f, "{}", d.normalized()),
            KeywordValue::Float(x) => write!(f, "{}", x),
            KeywordValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// A typed value paired with the keyword type it was coerced for.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedKeyword {
    pub keyword_type: KeywordType,
    pub value: KeywordValue,
}

impl TypedKeyword {
    pub fn name(&self) -> &str {
        &self.keyword_type.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kt(id: i64, name: &str, data_type: KeywordDataType) -> KeywordType {
        KeywordType {
            id,
            name: name.to_string(),
            data_type,
            required: false,
        }
    }

    #[test]
    fn data_type_names_are_case_sensitive() {
        assert_eq!(
            "Currency".parse::<KeywordDataType>(),
            Ok(KeywordDataType::Currency)
        );
        assert!("currency".parse::<KeywordDataType>().is_err());
        for t in KeywordDataType::ALL {
            assert_eq!(t.as_str().parse::<KeywordDataType>(), Ok(t));
        }
    }

    #[test]
    fn record_schema_keeps_first_of_duplicate_names() {
        let schema = KeywordRecordSchema::new(vec![
            kt(1, "DLN", KeywordDataType::AlphaNumeric),
            kt(2, "Amount", KeywordDataType::Currency),
            kt(3, "DLN", KeywordDataType::Numeric9),
        ]);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("DLN").map(|k| k.id), Some(1));
    }

    #[test]
    fn group_serializes_in_config_dump_shape() {
        let group = DocumentTypeGroupSchema {
            id: 7,
            name: "TAX".to_string(),
            document_types: vec![DocumentTypeSchema {
                id: 11,
                name: "RETURN".to_string(),
                keyword_types: KeywordRecordSchema::new(vec![KeywordType {
                    id: 101,
                    name: "DLN".to_string(),
                    data_type: KeywordDataType::AlphaNumeric,
                    required: true,
                }]),
            }],
        };
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "name": "TAX",
                "documentTypes": [{
                    "id": 11,
                    "name": "RETURN",
                    "keywordTypes": [{
                        "id": 101,
                        "name": "DLN",
                        "dataType": "AlphaNumeric",
                        "required": true
                    }]
                }]
            })
        );
    }
}
