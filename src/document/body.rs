//! DocumentBody - immutable JSON payload
//!
//! The body holds user content only. Reserved metadata keys (`_id`,
//! `_rev`, `_deleted`, `_attachments`) are synthesized on read by the
//! revision and are rejected here.

use serde_json::{Map, Value};

use super::errors::{DocumentError, DocumentResult};

/// Keys the revision synthesizes and a body may not carry.
pub const RESERVED_KEYS: [&str; 4] = ["_id", "_rev", "_deleted", "_attachments"];

/// An immutable JSON object payload.
///
/// Readers get `&Map` views. Producing a modified body means building a
/// new `DocumentBody`, so nothing can mutate a body already attached to
/// a revision.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentBody {
    map: Map<String, Value>,
}

impl DocumentBody {
    /// The empty object `{}`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a JSON object map.
    pub fn from_map(map: Map<String, Value>) -> DocumentResult<Self> {
        if let Some(key) = map.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
            return Err(DocumentError::InvalidBody(format!(
                "reserved key '{}' is not allowed in a body",
                key
            )));
        }
        Ok(Self { map })
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> DocumentResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(DocumentError::InvalidBody(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parses serialized JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> DocumentResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| DocumentError::InvalidBody(e.to_string()))?;
        Self::from_value(value)
    }

    /// Builds a body keeping only the named top-level fields.
    pub fn project(&self, fields: &[&str]) -> Self {
        let map = self
            .map
            .iter()
            .filter(|(k, _)| fields.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { map }
    }

    /// Read-only map view.
    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }

    /// Returns an owned copy of the map, detached from this body.
    pub fn to_map(&self) -> Map<String, Value> {
        self.map.clone()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Canonical serialization. Keys come out sorted, so equal bodies
    /// produce equal bytes.
    pub fn as_bytes(&self) -> Vec<u8> {
        // Serializing a Map<String, Value> cannot fail.
        serde_json::to_vec(&self.map).unwrap_or_default()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
