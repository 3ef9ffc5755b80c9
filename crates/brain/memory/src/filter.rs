use std::collections::BTreeSet;

use crate::entry::MemoryEntry;

/// Declarative read filter. Tombstoned entries are excluded unless asked for.
#[derive(Clone, Debug, Default)]
pub struct MemoryFilter {
    include_tombstoned: bool,
    subject: Option<String>,
    keys: Option<BTreeSet<String>>,
    tags_any: Vec<String>,
    min_significance: Option<f64>,
    content_contains: Option<String>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_tombstoned(mut self) -> Self {
        self.include_tombstoned = true;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Restrict keyed entries to an explicit key set.
    pub fn with_keys(mut self, keys: BTreeSet<String>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_any_tag(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags_any = tags.into_iter().collect();
        self
    }

    pub fn with_min_significance(mut self, min: f64) -> Self {
        self.min_significance = Some(min);
        self
    }

    pub fn with_content_contains(mut self, needle: impl Into<String>) -> Self {
        self.content_contains = Some(needle.into());
        self
    }

    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if entry.header.tombstoned && !self.include_tombstoned {
            return false;
        }
        if let Some(subject) = &self.subject {
            if entry.content.subject_key() != Some(subject.as_str()) {
                return false;
            }
        }
        if let Some(keys) = &self.keys {
            match entry.content.subject_key() {
                Some(key) if keys.contains(key) => {}
                _ => return false,
            }
        }
        if !self.tags_any.is_empty()
            && !self
                .tags_any
                .iter()
                .any(|t| entry.content.tags().contains(t))
        {
            return false;
        }
        if let Some(min) = self.min_significance {
            if entry.header.significance < min {
                return false;
            }
        }
        if let Some(needle) = &self.content_contains {
            if !entry.content.display_text().contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}
