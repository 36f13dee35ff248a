//! Document and revision identifiers
//!
//! A revision identifier has the shape `<generation>-<digest>`:
//! - `generation` is a positive integer, parent + 1 for every child
//! - `digest` is an opaque, non-empty content fingerprint
//!
//! Both identifier types validate on construction. An invalid string
//! never produces a value.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{DocumentError, DocumentResult};

/// Namespaces allowed to start with an underscore.
const RESERVED_PREFIXES: [&str; 2] = ["_design/", "_local/"];

/// A validated document identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Validates and wraps a document identifier.
    pub fn new(id: impl Into<String>) -> DocumentResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DocumentError::invalid_identifier(id, "document id is empty"));
        }
        if id.chars().any(char::is_control) {
            return Err(DocumentError::invalid_identifier(
                id,
                "document id contains control characters",
            ));
        }
        if id.starts_with('_') && !RESERVED_PREFIXES.iter().any(|p| id.starts_with(p)) {
            return Err(DocumentError::invalid_identifier(
                id,
                "document id may not start with '_'",
            ));
        }
        Ok(Self(id))
    }

    /// Generates a fresh random document identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated revision identifier with its generation parsed once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId {
    raw: String,
    generation: u64,
    /// Byte offset of the digest within `raw`.
    digest_start: usize,
}

impl RevisionId {
    /// Parses a `<generation>-<digest>` string.
    pub fn parse(raw: impl Into<String>) -> DocumentResult<Self> {
        let raw = raw.into();
        let Some((prefix, digest)) = raw.split_once('-') else {
            return Err(DocumentError::invalid_identifier(
                raw,
                "revision id has no '-' separator",
            ));
        };
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DocumentError::invalid_identifier(
                raw,
                "revision generation is not numeric",
            ));
        }
        let generation: u64 = match prefix.parse() {
            Ok(g) if g > 0 => g,
            _ => {
                return Err(DocumentError::invalid_identifier(
                    raw,
                    "revision generation must be a positive integer",
                ))
            }
        };
        if digest.is_empty() {
            return Err(DocumentError::invalid_identifier(
                raw,
                "revision digest is empty",
            ));
        }
        let digest_start = prefix.len() + 1;
        Ok(Self {
            raw,
            generation,
            digest_start,
        })
    }

    /// Builds an identifier from its parts.
    pub fn from_parts(generation: u64, digest: &str) -> DocumentResult<Self> {
        Self::parse(format!("{}-{}", generation, digest))
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn digest(&self) -> &str {
        &self.raw[self.digest_start..]
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl TryFrom<String> for RevisionId {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.raw
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
