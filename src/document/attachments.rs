//! AttachmentMap - change-observing attachment metadata
//!
//! Structural mutations (put, remove, clear, retain) invoke the map's
//! change hook. Hydration from stored records does not: loading a
//! revision from storage is not an edit.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Metadata for one attachment. Blob content lives outside the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub length: u64,
    /// Content digest, e.g. `sha256-<hex>`.
    pub digest: String,
    /// Generation of the revision that introduced this content.
    pub revpos: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        length: u64,
        digest: impl Into<String>,
        revpos: u64,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            length,
            digest: digest.into(),
            revpos,
            encoding: None,
        }
    }
}

/// Callback fired after any structural change.
pub type ChangeHook = Arc<dyn Fn() + Send + Sync>;

/// Attachment name -> metadata, with a change hook.
#[derive(Default)]
pub struct AttachmentMap {
    entries: HashMap<String, Attachment>,
    on_change: Option<ChangeHook>,
}

impl AttachmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrates a map from stored records without firing the hook.
    pub fn from_records(records: impl IntoIterator<Item = Attachment>) -> Self {
        let entries = records.into_iter().map(|a| (a.name.clone(), a)).collect();
        Self {
            entries,
            on_change: None,
        }
    }

    /// Wraps an existing mapping without firing the hook.
    pub fn from_map(entries: HashMap<String, Attachment>) -> Self {
        Self {
            entries,
            on_change: None,
        }
    }

    /// Installs the change hook, replacing any previous one.
    pub fn subscribe(&mut self, hook: ChangeHook) {
        self.on_change = Some(hook);
    }

    /// Removes the change hook.
    pub fn unsubscribe(&mut self) {
        self.on_change = None;
    }

    fn notify(&self) {
        if let Some(hook) = &self.on_change {
            hook();
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attachment> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attachment)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Inserts under the attachment's own name.
    pub fn put(&mut self, attachment: Attachment) -> Option<Attachment> {
        let previous = self.entries.insert(attachment.name.clone(), attachment);
        self.notify();
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<Attachment> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.notify();
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Attachment) -> bool) {
        let before = self.entries.len();
        self.entries.retain(|_, a| keep(a));
        if self.entries.len() != before {
            self.notify();
        }
    }

    /// Owned records sorted by name.
    pub fn to_records(&self) -> Vec<Attachment> {
        let mut records: Vec<Attachment> = self.entries.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }
}

/// A clone starts unobserved. Mutating it never reports to the owner of
/// the original.
impl Clone for AttachmentMap {
    fn clone(&self) -> Self {
        Self::from_map(self.entries.clone())
    }
}

impl PartialEq for AttachmentMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for AttachmentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentMap")
            .field("entries", &self.entries)
            .field("observed", &self.on_change.is_some())
            .finish()
    }
}
