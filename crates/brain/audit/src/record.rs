use chrono::{DateTime, Utc};
use llamabrain_types::{ContentHash, NpcId, RecordId};
use serde::{Deserialize, Serialize};

/// Terminal failure category recorded on an interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionFailure {
    InputInvalid,
    GeneratorFailure,
    ValidationRejected,
    MutationRejected,
    Cancelled,
    Internal,
}

/// One finished interaction, hashed ends-to-ends.
///
/// Every interaction produces a record: success, degraded success,
/// fallback, or error. The before/after store hashes make the canonical
/// immutability and fallback purity invariants directly checkable from the
/// log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: RecordId,
    pub npc_id: NpcId,
    pub interaction_count: u64,
    pub seed: u64,
    pub attempt_count: u32,
    pub player_input: String,
    pub memory_hash_before: ContentHash,
    pub memory_hash_after: ContentHash,
    pub canonical_hash_before: ContentHash,
    pub canonical_hash_after: ContentHash,
    pub prompt_hash: ContentHash,
    pub output_hash: ContentHash,
    pub validation_passed: bool,
    pub approved_mutation_count: usize,
    pub fallback_used: bool,
    #[serde(default)]
    pub dispatch_failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<InteractionFailure>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Canonical-store immutability held for this interaction.
    pub fn canonical_unchanged(&self) -> bool {
        self.canonical_hash_before == self.canonical_hash_after
    }

    /// Fallback purity held: a fallback response mutated nothing.
    pub fn fallback_pure(&self) -> bool {
        !self.fallback_used
            || (self.approved_mutation_count == 0
                && self.memory_hash_before == self.memory_hash_after)
    }
}
