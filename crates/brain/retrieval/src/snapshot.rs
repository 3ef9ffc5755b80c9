use chrono::{DateTime, Utc};
use llamabrain_expectancy::ConstraintSet;
use llamabrain_memory::MemoryEntry;
use llamabrain_types::{DialogueTurn, InteractionContext};
use serde::Serialize;

/// The immutable bundle captured at the start of an inference attempt.
///
/// Entries are copies, not references into the stores, so concurrent commits
/// for other interactions can never change what this attempt sees. The
/// snapshot is the sole input to the prompt assembler and the validation
/// gate; retries reuse it (with an escalated constraint set) rather than
/// re-capturing.
#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub context: InteractionContext,
    pub constraints: ConstraintSet,
    /// Always complete; canonical inclusion is authority-driven, not scored.
    pub canonical: Vec<MemoryEntry>,
    pub world: Vec<MemoryEntry>,
    pub episodic: Vec<MemoryEntry>,
    pub beliefs: Vec<MemoryEntry>,
    pub system_prompt: String,
    pub history: Vec<DialogueTurn>,
    /// Monotonic per NPC; seeds downstream determinism.
    pub interaction_count: u64,
    pub taken_at: DateTime<Utc>,
}

impl StateSnapshot {
    /// Replace the constraint set for a retry attempt. Everything else is
    /// reused unchanged.
    pub fn with_constraints(&self, constraints: ConstraintSet) -> Self {
        Self {
            constraints,
            ..self.clone()
        }
    }

    /// Canonical fact value by subject, used by gate predicates.
    pub fn canonical_value(&self, subject: &str) -> Option<&serde_json::Value> {
        self.canonical.iter().find_map(|e| match &e.content {
            llamabrain_memory::MemoryContent::CanonicalFact { subject: s, value }
                if s == subject =>
            {
                Some(value)
            }
            _ => None,
        })
    }

    pub fn selected_entry_count(&self) -> usize {
        self.canonical.len() + self.world.len() + self.episodic.len() + self.beliefs.len()
    }
}
