use chrono::{DateTime, Utc};
use llamabrain_types::{Authority, EntryId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::DecayConfig;

/// Which of the four stores an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Canonical,
    World,
    Episodic,
    Belief,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Canonical => "canonical",
            MemoryKind::World => "world",
            MemoryKind::Episodic => "episodic",
            MemoryKind::Belief => "belief",
        }
    }

    /// Minimum writer tier the store accepts. The canonical store is
    /// additionally sealed after load, so this tier only matters for the
    /// load phase.
    pub fn required_authority(&self) -> Authority {
        match self {
            MemoryKind::Canonical => Authority::Designer,
            MemoryKind::World => Authority::GameSystem,
            MemoryKind::Episodic => Authority::GeneratorDerived,
            MemoryKind::Belief => Authority::Belief,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The typed payload of a memory entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryContent {
    /// Designer-authored truth. Immutable at runtime.
    CanonicalFact { subject: String, value: Value },
    /// Key-value world state owned by game systems.
    WorldState { key: String, value: Value },
    /// A remembered event; the only content that decays.
    Episodic {
        content: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    /// A held belief. May contradict canon; contradiction is flagged, never
    /// silently dropped.
    Belief {
        subject: String,
        statement: String,
        confidence: f64,
        #[serde(default)]
        contradicts_canonical: bool,
    },
}

impl MemoryContent {
    pub fn kind(&self) -> MemoryKind {
        match self {
            MemoryContent::CanonicalFact { .. } => MemoryKind::Canonical,
            MemoryContent::WorldState { .. } => MemoryKind::World,
            MemoryContent::Episodic { .. } => MemoryKind::Episodic,
            MemoryContent::Belief { .. } => MemoryKind::Belief,
        }
    }

    /// Subject key for keyed stores (canonical, world, belief).
    pub fn subject_key(&self) -> Option<&str> {
        match self {
            MemoryContent::CanonicalFact { subject, .. } => Some(subject),
            MemoryContent::WorldState { key, .. } => Some(key),
            MemoryContent::Belief { subject, .. } => Some(subject),
            MemoryContent::Episodic { .. } => None,
        }
    }

    /// Text rendered into prompts and searched for relevance.
    pub fn display_text(&self) -> String {
        match self {
            MemoryContent::CanonicalFact { subject, value } => format!("{subject}: {value}"),
            MemoryContent::WorldState { key, value } => format!("{key} = {value}"),
            MemoryContent::Episodic { content, .. } => content.clone(),
            MemoryContent::Belief {
                subject,
                statement,
                confidence,
                contradicts_canonical,
            } => {
                if *contradicts_canonical {
                    format!("{subject}: {statement} (confidence {confidence:.2}, disputed)")
                } else {
                    format!("{subject}: {statement} (confidence {confidence:.2})")
                }
            }
        }
    }

    /// Tags attached to the content, if any.
    pub fn tags(&self) -> &[String] {
        match self {
            MemoryContent::Episodic { tags, .. } => tags,
            _ => &[],
        }
    }
}

/// Common header shared by every entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub id: EntryId,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    /// Stored significance in [0,1]. Decay never rewrites this; effective
    /// significance is derived at read time.
    pub significance: f64,
    /// Strictly monotonic per store. Assigned at insert, never reused.
    pub sequence_number: u64,
    pub tombstoned: bool,
}

/// A committed memory entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub header: EntryHeader,
    pub content: MemoryContent,
}

impl MemoryEntry {
    pub fn id(&self) -> &EntryId {
        &self.header.id
    }

    pub fn kind(&self) -> MemoryKind {
        self.content.kind()
    }

    /// Significance with read-time decay applied. Only episodic entries
    /// decay; everything else returns the stored value.
    pub fn effective_significance(&self, decay: Option<&DecayConfig>, now: DateTime<Utc>) -> f64 {
        match (self.kind(), decay) {
            (MemoryKind::Episodic, Some(cfg)) => {
                let age_secs = (now - self.header.last_touched_at)
                    .num_milliseconds()
                    .max(0) as f64
                    / 1000.0;
                self.header.significance * cfg.factor(age_secs)
            }
            _ => self.header.significance,
        }
    }
}

/// What a writer submits. Ids and sequence numbers are assigned by the store;
/// a draft may carry an explicit id only when restoring a serialized store.
#[derive(Clone, Debug)]
pub struct EntryDraft {
    pub content: MemoryContent,
    pub significance: f64,
    pub explicit_id: Option<EntryId>,
}

impl EntryDraft {
    pub fn new(content: MemoryContent, significance: f64) -> Self {
        Self {
            content,
            significance,
            explicit_id: None,
        }
    }

    pub fn with_id(mut self, id: EntryId) -> Self {
        self.explicit_id = Some(id);
        self
    }
}

/// The strict total order used for every ordered traversal:
/// `(-significance, -last_touched_at, sequence_number)`.
///
/// Uses the *stored* significance so ordering is stable across reads within
/// an interaction; decay influences scoring, not tie-breaking.
pub fn strict_total_order(a: &MemoryEntry, b: &MemoryEntry) -> std::cmp::Ordering {
    b.header
        .significance
        .total_cmp(&a.header.significance)
        .then_with(|| b.header.last_touched_at.cmp(&a.header.last_touched_at))
        .then_with(|| a.header.sequence_number.cmp(&b.header.sequence_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use llamabrain_types::NpcId;

    fn entry(significance: f64, touched_offset_secs: i64, sequence: u64) -> MemoryEntry {
        let base = Utc::now();
        MemoryEntry {
            header: EntryHeader {
                id: EntryId::derive(&NpcId::new("t"), "episodic", sequence),
                created_at: base,
                last_touched_at: base + Duration::seconds(touched_offset_secs),
                significance,
                sequence_number: sequence,
                tombstoned: false,
            },
            content: MemoryContent::Episodic {
                content: format!("event {sequence}"),
                tags: vec![],
            },
        }
    }

    #[test]
    fn order_prefers_higher_significance() {
        let a = entry(0.9, 0, 1);
        let b = entry(0.5, 0, 0);
        assert_eq!(strict_total_order(&a, &b), std::cmp::Ordering::Less);
    }

    #[test]
    fn order_breaks_significance_ties_by_recency() {
        let older = entry(0.5, 0, 0);
        let newer = entry(0.5, 10, 1);
        assert_eq!(strict_total_order(&newer, &older), std::cmp::Ordering::Less);
    }

    #[test]
    fn order_breaks_full_ties_by_sequence() {
        let mut a = entry(0.5, 0, 3);
        let mut b = entry(0.5, 0, 7);
        b.header.last_touched_at = a.header.last_touched_at;
        b.header.created_at = a.header.created_at;
        assert_eq!(strict_total_order(&a, &b), std::cmp::Ordering::Less);
        // Antisymmetric.
        assert_eq!(strict_total_order(&b, &a), std::cmp::Ordering::Greater);
        // Reflexive equality only against itself.
        a.header.sequence_number = 7;
        b.header.sequence_number = 7;
        assert_eq!(strict_total_order(&a, &b), std::cmp::Ordering::Equal);
    }

    #[test]
    fn decay_applies_only_to_episodic() {
        let now = Utc::now();
        let cfg = DecayConfig::default();
        let mut episodic = entry(0.8, 0, 0);
        episodic.header.last_touched_at = now - Duration::seconds(cfg.half_life_secs as i64);
        let effective = episodic.effective_significance(Some(&cfg), now);
        assert!((effective - 0.4).abs() < 0.01);

        let belief = MemoryEntry {
            header: episodic.header.clone(),
            content: MemoryContent::Belief {
                subject: "s".into(),
                statement: "x".into(),
                confidence: 0.5,
                contradicts_canonical: false,
            },
        };
        assert!((belief.effective_significance(Some(&cfg), now) - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn display_text_marks_disputed_beliefs() {
        let content = MemoryContent::Belief {
            subject: "magic-exists".into(),
            statement: "magic is fake".into(),
            confidence: 0.4,
            contradicts_canonical: true,
        };
        assert!(content.display_text().contains("disputed"));
    }
}
