//! Content digests for new revision identifiers
//!
//! A local edit's revision id is `<parent generation + 1>-<digest>`, where
//! the digest covers the parent revision id, the deleted flag, the body
//! bytes and the attachment metadata. Identical edits of the same parent
//! produce identical ids on every replica.

use sha2::{Digest, Sha256};

use super::attachments::AttachmentMap;
use super::body::DocumentBody;
use super::identifiers::RevisionId;

/// Produces the digest part of a new revision id.
pub trait ContentDigest: Send + Sync {
    fn digest(
        &self,
        parent: Option<&RevisionId>,
        deleted: bool,
        body: &DocumentBody,
        attachments: &AttachmentMap,
    ) -> String;
}

/// SHA-256, hex encoded and truncated to `length` characters.
#[derive(Debug, Clone, Copy)]
pub struct Sha256Digest {
    length: usize,
}

impl Sha256Digest {
    pub const DEFAULT_LENGTH: usize = 32;
    pub const MIN_LENGTH: usize = 8;
    pub const MAX_LENGTH: usize = 64;

    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(Self::MIN_LENGTH, Self::MAX_LENGTH),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for Sha256Digest {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LENGTH)
    }
}

impl ContentDigest for Sha256Digest {
    fn digest(
        &self,
        parent: Option<&RevisionId>,
        deleted: bool,
        body: &DocumentBody,
        attachments: &AttachmentMap,
    ) -> String {
        let mut hasher = Sha256::new();

        // Length-prefix every field so adjacent fields cannot run together
        let parent = parent.map(RevisionId::as_str).unwrap_or("");
        hasher.update((parent.len() as u64).to_le_bytes());
        hasher.update(parent.as_bytes());
        hasher.update([u8::from(deleted)]);

        let bytes = body.as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);

        for attachment in attachments.to_records() {
            hasher.update((attachment.name.len() as u64).to_le_bytes());
            hasher.update(attachment.name.as_bytes());
            hasher.update((attachment.digest.len() as u64).to_le_bytes());
            hasher.update(attachment.digest.as_bytes());
            hasher.update(attachment.revpos.to_le_bytes());
        }

        let mut hex = hex::encode(hasher.finalize());
        hex.truncate(self.length);
        hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Attachment;
    use serde_json::json;

    fn body(v: serde_json::Value) -> DocumentBody {
        DocumentBody::from_value(v).unwrap()
    }

    #[test]
    fn test_deterministic() {
        let d = Sha256Digest::default();
        let parent = RevisionId::parse("1-abc").unwrap();
        let a = d.digest(Some(&parent), false, &body(json!({"x": 1})), &AttachmentMap::new());
        let b = d.digest(Some(&parent), false, &body(json!({"x": 1})), &AttachmentMap::new());
        assert_eq!(a, b);
        assert_eq!(a.len(), Sha256Digest::DEFAULT_LENGTH);
    }

    #[test]
    fn test_sensitive_to_every_input() {
        let d = Sha256Digest::default();
        let p1 = RevisionId::parse("1-abc").unwrap();
        let p2 = RevisionId::parse("1-abd").unwrap();
        let b = body(json!({"x": 1}));
        let none = AttachmentMap::new();
        let with = AttachmentMap::from_records(vec![Attachment::new("a", "text/plain", 1, "d", 2)]);

        let base = d.digest(Some(&p1), false, &b, &none);
        assert_ne!(base, d.digest(Some(&p2), false, &b, &none));
        assert_ne!(base, d.digest(None, false, &b, &none));
        assert_ne!(base, d.digest(Some(&p1), true, &b, &none));
        assert_ne!(base, d.digest(Some(&p1), false, &body(json!({"x": 2})), &none));
        assert_ne!(base, d.digest(Some(&p1), false, &b, &with));
    }

    #[test]
    fn test_length_clamped() {
        assert_eq!(Sha256Digest::new(1).length(), Sha256Digest::MIN_LENGTH);
        assert_eq!(Sha256Digest::new(500).length(), Sha256Digest::MAX_LENGTH);
        let d = Sha256Digest::new(64);
        let out = d.digest(None, false, &DocumentBody::empty(), &AttachmentMap::new());
        assert_eq!(out.len(), 64);
    }
}
