//! Batch descriptor files.
//!
//! A batch file is a JSON object whose `contents` array holds one
//! [`ContentDescriptor`] per document. Array order is processing order.
//!
//! ```json
//! { "contents": [
//!     { "file": "returns/0001.pdf",
//!       "documentType": "RETURN",
//!       "fileTypes": ["PDF"],
//!       "keywords": { "DLN": "06122018" } } ] }
//! ```
//!
//! Only `documentType` is checked here. The fields an operation needs
//! beyond that (`file`, `fileTypes`, `documentID`) are checked by the
//! executor for the descriptor at hand.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::BatchError;

/// One entry of a batch file's `contents` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentDescriptor {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(rename = "documentID", default, deserialize_with = "optional_scalar")]
    pub document_id: Option<String>,
    #[serde(rename = "documentType")]
    pub document_type: String,
    #[serde(rename = "documentTypeGroup", default)]
    pub document_type_group: Option<String>,
    #[serde(rename = "fileTypes", default)]
    pub file_types: Vec<String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub keywords: BTreeMap<String, String>,
}

/// The parsed, ordered descriptors of one batch file.
///
/// Consumed by value; a batch is processed once.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBatch {
    descriptors: Vec<ContentDescriptor>,
}

impl DescriptorBatch {
    pub fn new(descriptors: Vec<ContentDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Keep only the first `n` descriptors.
    pub fn truncate(&mut self, n: usize) {
        self.descriptors.truncate(n);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContentDescriptor> {
        self.descriptors.iter()
    }
}

impl IntoIterator for DescriptorBatch {
    type Item = ContentDescriptor;
    type IntoIter = std::vec::IntoIter<ContentDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}

/// Parse the raw bytes of a batch file.
pub fn parse_batch(content: &[u8]) -> Result<DescriptorBatch, BatchError> {
    let root: Value = serde_json::from_slice(content)
        .map_err(|e| BatchError::MalformedBatch(format!("invalid JSON: {}", e)))?;

    let contents = root
        .get("contents")
        .ok_or_else(|| BatchError::MalformedBatch("missing 'contents' array".to_string()))?
        .as_array()
        .ok_or_else(|| BatchError::MalformedBatch("'contents' is not an array".to_string()))?;

    let descriptors = contents
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            ContentDescriptor::deserialize(entry)
                .map_err(|e| BatchError::MalformedBatch(format!("contents[{}]: {}", index, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DescriptorBatch::new(descriptors))
}

/// Strings pass through; numbers and booleans keep their JSON spelling.
fn scalar_to_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a string value, found {}", other)),
    }
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_to_string(v)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Map<String, Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            scalar_to_string(v)
                .map(|s| (k.clone(), s))
                .map_err(|e| serde::de::Error::custom(format!("keyword '{}': {}", k, e)))
        })
        .collect()
}
