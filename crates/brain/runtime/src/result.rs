use llamabrain_memory::MemoryError;
use llamabrain_mutation::DispatchRecord;
use llamabrain_types::{EntryId, ProposedMutation, RecordId, WorldIntent};
use llamabrain_validation::ValidationReport;
use thiserror::Error;

/// Errors `submit` returns to the caller. Generator and validation failures
/// are not here; they resolve to retries or fallback responses; a mutation
/// rejection resolves to a degraded success.
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("interaction cancelled")]
    Cancelled,

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

/// The caller-facing result of one interaction.
#[derive(Clone, Debug)]
pub struct InteractionResult {
    pub dialogue_text: String,
    /// Mutations that were approved and applied. Empty on fallback and on a
    /// rejected commit.
    pub approved_mutations: Vec<ProposedMutation>,
    /// Entry ids the commit created, in input order.
    pub applied_entry_ids: Vec<EntryId>,
    /// Intents that were approved and handed to the dispatcher.
    pub approved_intents: Vec<WorldIntent>,
    pub dispatch_records: Vec<DispatchRecord>,
    /// Report of the final validated attempt; `None` when no attempt reached
    /// validation (pure generator-failure fallback).
    pub validation_report: Option<ValidationReport>,
    pub fallback_used: bool,
    pub attempt_count: u32,
    pub audit_record_id: RecordId,
}

impl InteractionResult {
    /// A success that applied no state changes (item rejections, or a
    /// commit-time rejection).
    pub fn is_degraded(&self) -> bool {
        !self.fallback_used && self.approved_mutations.is_empty() && self.validation_report.is_some()
    }
}
