use std::collections::HashMap;

use chrono::{DateTime, Utc};
use llamabrain_types::{Authority, ContentHash, EntryId, NpcId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::{strict_total_order, EntryDraft, EntryHeader, MemoryEntry, MemoryKind};
use crate::error::MemoryError;
use crate::filter::MemoryFilter;

/// Read-time decay parameters for the episodic store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Seconds for effective significance to halve.
    pub half_life_secs: f64,
    /// Entries whose effective significance falls below this are retained
    /// but ranked last during retrieval.
    pub rank_threshold: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_secs: 3600.0,
            rank_threshold: 0.05,
        }
    }
}

impl DecayConfig {
    /// Multiplicative decay factor after `age_secs` seconds.
    pub fn factor(&self, age_secs: f64) -> f64 {
        if self.half_life_secs <= 0.0 {
            return 1.0;
        }
        (-(std::f64::consts::LN_2) * age_secs / self.half_life_secs).exp()
    }
}

/// One typed store: an arena of entries plus an id index.
///
/// Entries are never removed; tombstoning hides them from reads while
/// preserving sequence numbers. All ordered traversals use the strict total
/// order so two reads of the same state are byte-identical.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    npc: NpcId,
    kind: MemoryKind,
    entries: Vec<MemoryEntry>,
    index: HashMap<EntryId, usize>,
    next_sequence: u64,
    capacity: usize,
    sealed: bool,
    decay: Option<DecayConfig>,
}

impl MemoryStore {
    pub fn new(npc: NpcId, kind: MemoryKind, capacity: usize) -> Self {
        Self {
            npc,
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
            next_sequence: 0,
            capacity,
            sealed: false,
            decay: None,
        }
    }

    pub fn with_decay(mut self, decay: DecayConfig) -> Self {
        self.decay = Some(decay);
        self
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn decay(&self) -> Option<&DecayConfig> {
        self.decay.as_ref()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seal the store against any further writes. Used for the canonical
    /// store once designer facts are loaded.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Total entries including tombstoned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries visible to readers.
    pub fn live_len(&self) -> usize {
        self.entries.iter().filter(|e| !e.header.tombstoned).count()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Insert a new entry. Authority is checked against the store's required
    /// tier; keyed stores (world, belief) replace any live entry with the
    /// same subject by tombstoning it first.
    pub fn write(
        &mut self,
        draft: EntryDraft,
        writer: Authority,
        now: DateTime<Utc>,
    ) -> Result<EntryId, MemoryError> {
        if self.sealed {
            return Err(MemoryError::CanonicalFactProtected);
        }
        let actual = draft.content.kind();
        if actual != self.kind {
            return Err(MemoryError::WrongStore {
                store: self.kind,
                actual,
            });
        }
        if !(0.0..=1.0).contains(&draft.significance) {
            return Err(MemoryError::SignificanceOutOfRange(draft.significance));
        }
        let required = self.kind.required_authority();
        if !writer.permits(required) {
            return Err(MemoryError::AuthorityInsufficient {
                store: self.kind,
                required,
                claimed: writer,
            });
        }

        // Keyed replacement keeps the live view a map while the arena stays
        // append-only. Checks all run before any state changes.
        let replace_pos = match self.kind {
            MemoryKind::World | MemoryKind::Belief => draft
                .content
                .subject_key()
                .and_then(|key| self.live_position_by_subject(key)),
            MemoryKind::Canonical => {
                if let Some(subject) = draft.content.subject_key() {
                    if self.live_position_by_subject(subject).is_some() {
                        return Err(MemoryError::DuplicateSubject(subject.to_string()));
                    }
                }
                None
            }
            MemoryKind::Episodic => None,
        };

        if replace_pos.is_none() && self.live_len() >= self.capacity {
            return Err(MemoryError::StoreFull {
                store: self.kind,
                capacity: self.capacity,
            });
        }

        let sequence = self.next_sequence;
        if let Some(last) = self.entries.last() {
            if sequence <= last.header.sequence_number {
                return Err(MemoryError::SequenceRegression { store: self.kind });
            }
        }

        let id = match draft.explicit_id {
            Some(id) => {
                if let Some(pos) = self.index.get(&id) {
                    if !self.entries[*pos].header.tombstoned {
                        return Err(MemoryError::DuplicateId(id));
                    }
                }
                id
            }
            None => EntryId::derive(&self.npc, self.kind.as_str(), sequence),
        };

        if let Some(pos) = replace_pos {
            self.entries[pos].header.tombstoned = true;
        }

        let entry = MemoryEntry {
            header: EntryHeader {
                id: id.clone(),
                created_at: now,
                last_touched_at: now,
                significance: draft.significance,
                sequence_number: sequence,
                tombstoned: false,
            },
            content: draft.content,
        };

        debug!(store = %self.kind, id = %id, sequence, "memory entry written");
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(entry);
        self.next_sequence += 1;
        Ok(id)
    }

    /// Hide an entry from reads. The entry and its sequence number persist.
    pub fn tombstone(
        &mut self,
        id: &EntryId,
        writer: Authority,
        _now: DateTime<Utc>,
    ) -> Result<(), MemoryError> {
        if self.sealed {
            return Err(MemoryError::CanonicalFactProtected);
        }
        let required = self.kind.required_authority();
        if !writer.permits(required) {
            return Err(MemoryError::AuthorityInsufficient {
                store: self.kind,
                required,
                claimed: writer,
            });
        }
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| MemoryError::NotFound(id.clone()))?;
        self.entries[pos].header.tombstoned = true;
        debug!(store = %self.kind, id = %id, "memory entry tombstoned");
        Ok(())
    }

    /// Refresh an entry's `last_touched_at`. Used by belief transforms, not
    /// by reads; retrieval must stay pure.
    pub fn touch(&mut self, id: &EntryId, now: DateTime<Utc>) -> Result<(), MemoryError> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| MemoryError::NotFound(id.clone()))?;
        self.entries[pos].header.last_touched_at = now;
        Ok(())
    }

    pub fn get(&self, id: &EntryId) -> Option<&MemoryEntry> {
        self.index.get(id).map(|pos| &self.entries[*pos])
    }

    /// Live entry with the given subject key, if any.
    pub fn live_by_subject(&self, subject: &str) -> Option<&MemoryEntry> {
        self.live_position_by_subject(subject)
            .map(|pos| &self.entries[pos])
    }

    fn live_position_by_subject(&self, subject: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.header.tombstoned && e.content.subject_key() == Some(subject))
    }

    /// Matching entries in strict total order.
    pub fn read(&self, filter: &MemoryFilter) -> Vec<&MemoryEntry> {
        let mut out: Vec<&MemoryEntry> =
            self.entries.iter().filter(|e| filter.matches(e)).collect();
        out.sort_by(|a, b| strict_total_order(a, b));
        out
    }

    /// Every entry, tombstoned included, in strict total order. This is the
    /// canonical serialization sequence.
    pub fn canonical_entries(&self) -> Vec<&MemoryEntry> {
        let mut out: Vec<&MemoryEntry> = self.entries.iter().collect();
        out.sort_by(|a, b| strict_total_order(a, b));
        out
    }

    /// Hash of the canonical serialization of this store.
    pub fn hash(&self) -> ContentHash {
        #[derive(Serialize)]
        struct CanonicalStore<'a> {
            store: MemoryKind,
            entries: Vec<&'a MemoryEntry>,
        }
        ContentHash::of_canonical(&CanonicalStore {
            store: self.kind,
            entries: self.canonical_entries(),
        })
        .unwrap_or_else(|_| ContentHash::of_str(self.kind.as_str()))
    }
}
