use llamabrain_types::{Authority, EntryId};
use thiserror::Error;

use crate::entry::MemoryKind;

/// Structured failure modes of the memory system. Never thrown silently;
/// every rejection reaches the caller as a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    #[error("canonical facts are load-time only; runtime write rejected")]
    CanonicalFactProtected,

    #[error("{store} store requires {required} authority, writer claimed {claimed}")]
    AuthorityInsufficient {
        store: MemoryKind,
        required: Authority,
        claimed: Authority,
    },

    #[error("entry {0} already exists and is not tombstoned")]
    DuplicateId(EntryId),

    #[error("canonical subject {0:?} already loaded")]
    DuplicateSubject(String),

    #[error("{store} store is full (capacity {capacity})")]
    StoreFull { store: MemoryKind, capacity: usize },

    #[error("entry {0} not found")]
    NotFound(EntryId),

    #[error("significance {0} outside [0,1]")]
    SignificanceOutOfRange(f64),

    #[error("belief on {subject:?} contradicts canon and policy is reject")]
    CanonicalContradiction { subject: String },

    #[error("entry kind {actual} cannot be written to the {store} store")]
    WrongStore { store: MemoryKind, actual: MemoryKind },

    #[error("sequence regression detected in {store} store")]
    SequenceRegression { store: MemoryKind },

    #[error("memory lock poisoned")]
    LockPoisoned,
}

impl MemoryError {
    /// Bug-class invariant violations that must abort the interaction rather
    /// than degrade it.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            MemoryError::SequenceRegression { .. } | MemoryError::LockPoisoned
        )
    }
}
