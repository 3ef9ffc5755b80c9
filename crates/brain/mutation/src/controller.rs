use chrono::{DateTime, Utc};
use llamabrain_memory::{MemoryContent, MemoryError, MemoryKind, MemoryOp, NpcMemory};
use llamabrain_types::{Authority, EntryId, MutationRequest, ProposedMutation};
use thiserror::Error;
use tracing::{info, warn};

/// Commit failure. `Rejected` is the expected degraded path (dialogue
/// delivered, state unchanged); `Internal` is a bug-class invariant break.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error("claimed authority {claimed} exceeds the granted tier {granted}")]
    AuthorityExceeded {
        claimed: Authority,
        granted: Authority,
    },

    #[error("mutation batch rejected: {0}")]
    Rejected(MemoryError),

    #[error("invariant violation during commit: {0}")]
    Internal(MemoryError),
}

/// Result of a successful batch commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub committed_ids: Vec<EntryId>,
    pub ops_applied: usize,
}

/// Applies approved mutations under the commit protocol: re-check authority
/// against current state, stage, trial-apply, commit or roll back.
#[derive(Clone, Debug)]
pub struct MutationController {
    granted_authority: Authority,
    /// Confidence assigned to a belief subject seen for the first time,
    /// before the delta is applied.
    base_confidence: f64,
}

impl Default for MutationController {
    fn default() -> Self {
        Self {
            granted_authority: Authority::GeneratorDerived,
            base_confidence: 0.5,
        }
    }
}

impl MutationController {
    pub fn new(granted_authority: Authority) -> Self {
        Self {
            granted_authority,
            ..Self::default()
        }
    }

    /// Commit a batch of approved mutations. The caller must hold the NPC's
    /// write lock for the duration.
    pub fn commit(
        &self,
        memory: &mut NpcMemory,
        approved: &[ProposedMutation],
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome, MutationError> {
        // Authority re-check against commit-time state. The gate checked the
        // snapshot; claims could not have grown since, but the rule is
        // enforced where the write happens.
        for proposed in approved {
            if proposed.claimed_authority > self.granted_authority {
                return Err(MutationError::AuthorityExceeded {
                    claimed: proposed.claimed_authority,
                    granted: self.granted_authority,
                });
            }
        }

        let mut ops: Vec<MemoryOp> = Vec::new();
        for proposed in approved {
            self.stage(memory, proposed, &mut ops)?;
        }

        let committed_ids = memory.commit(&ops, now).map_err(|e| {
            warn!(error = %e, "mutation batch rolled back");
            if e.is_internal() {
                MutationError::Internal(e)
            } else {
                MutationError::Rejected(e)
            }
        })?;

        info!(
            mutations = approved.len(),
            entries = committed_ids.len(),
            "mutation batch committed"
        );
        Ok(CommitOutcome {
            ops_applied: ops.len(),
            committed_ids,
        })
    }

    /// Translate one request into staged ops against current state.
    fn stage(
        &self,
        memory: &NpcMemory,
        proposed: &ProposedMutation,
        ops: &mut Vec<MemoryOp>,
    ) -> Result<(), MutationError> {
        let authority = proposed.claimed_authority;
        match &proposed.request {
            MutationRequest::AppendEpisodic {
                content,
                significance,
                tags,
            } => {
                ops.push(MemoryOp::Write {
                    content: MemoryContent::Episodic {
                        content: content.clone(),
                        tags: tags.clone(),
                    },
                    significance: *significance,
                    authority,
                });
            }
            MutationRequest::TransformBelief {
                subject,
                statement,
                confidence_delta,
            } => {
                self.stage_belief(memory, subject, statement.clone(), *confidence_delta, authority, ops);
            }
            MutationRequest::TransformRelationship {
                subject,
                target,
                delta,
            } => {
                let key = format!("rel:{subject}->{target}");
                self.stage_belief(memory, &key, "disposition".to_string(), *delta, authority, ops);
            }
            MutationRequest::WriteCanonical { .. } => {
                // The gate rejects these; a request reaching this point is a
                // protocol violation and fails the whole batch.
                return Err(MutationError::Rejected(MemoryError::CanonicalFactProtected));
            }
            MutationRequest::EmitWorldIntent(intent) => {
                // Intents are side effects, not memory writes; the dispatcher
                // owns them.
                warn!(intent_type = %intent.intent_type, "world intent reached the mutation controller; skipped");
            }
        }
        Ok(())
    }

    /// A belief transform is tombstone-old plus insert-new, keeping the
    /// arena append-only and sequence numbers stable.
    fn stage_belief(
        &self,
        memory: &NpcMemory,
        subject: &str,
        statement: String,
        delta: f64,
        authority: Authority,
        ops: &mut Vec<MemoryOp>,
    ) {
        let (confidence, significance) = match memory.live_belief(subject) {
            Some(entry) => {
                let old_confidence = match &entry.content {
                    MemoryContent::Belief { confidence, .. } => *confidence,
                    _ => self.base_confidence,
                };
                ops.push(MemoryOp::Tombstone {
                    kind: MemoryKind::Belief,
                    id: entry.id().clone(),
                    authority,
                });
                (old_confidence + delta, entry.header.significance)
            }
            None => (self.base_confidence + delta, self.base_confidence),
        };

        ops.push(MemoryOp::Write {
            content: MemoryContent::Belief {
                subject: subject.to_string(),
                statement,
                confidence: confidence.clamp(0.0, 1.0),
                // Contradiction marking happens at write time in the store.
                contradicts_canonical: false,
            },
            significance,
            authority,
        });
    }
}
