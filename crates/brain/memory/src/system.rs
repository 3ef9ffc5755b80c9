use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use llamabrain_types::{Authority, ContentHash, EntryId, NpcId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::entry::{EntryDraft, MemoryContent, MemoryEntry, MemoryKind};
use crate::error::MemoryError;
use crate::filter::MemoryFilter;
use crate::store::{DecayConfig, MemoryStore};

/// What to do with a belief write that directly contradicts canon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionPolicy {
    /// Accept the belief, mark it `contradicts_canonical`. Default.
    Flag,
    /// Reject the write.
    Reject,
}

/// Per-NPC store sizing and policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub canonical_capacity: usize,
    pub world_capacity: usize,
    pub episodic_capacity: usize,
    pub belief_capacity: usize,
    pub decay: DecayConfig,
    pub contradiction_policy: ContradictionPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            canonical_capacity: 1024,
            world_capacity: 256,
            episodic_capacity: 512,
            belief_capacity: 256,
            decay: DecayConfig::default(),
            contradiction_policy: ContradictionPolicy::Flag,
        }
    }
}

/// One operation inside a transactional batch.
#[derive(Clone, Debug)]
pub enum MemoryOp {
    Write {
        content: MemoryContent,
        significance: f64,
        authority: Authority,
    },
    Tombstone {
        kind: MemoryKind,
        id: EntryId,
        authority: Authority,
    },
}

/// The four stores of a single NPC.
#[derive(Clone, Debug)]
pub struct NpcMemory {
    npc: NpcId,
    canonical: MemoryStore,
    world: MemoryStore,
    episodic: MemoryStore,
    belief: MemoryStore,
    contradiction_policy: ContradictionPolicy,
}

impl NpcMemory {
    pub fn new(npc: NpcId, config: &MemoryConfig) -> Self {
        Self {
            canonical: MemoryStore::new(npc.clone(), MemoryKind::Canonical, config.canonical_capacity),
            world: MemoryStore::new(npc.clone(), MemoryKind::World, config.world_capacity),
            episodic: MemoryStore::new(npc.clone(), MemoryKind::Episodic, config.episodic_capacity)
                .with_decay(config.decay.clone()),
            belief: MemoryStore::new(npc.clone(), MemoryKind::Belief, config.belief_capacity),
            contradiction_policy: config.contradiction_policy,
            npc,
        }
    }

    pub fn npc(&self) -> &NpcId {
        &self.npc
    }

    /// Load designer facts and seal the canonical store. Load-time only.
    pub fn load_canonical(
        &mut self,
        facts: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<(), MemoryError> {
        if self.canonical.is_sealed() {
            return Err(MemoryError::CanonicalFactProtected);
        }
        let now = Utc::now();
        for (subject, value) in facts {
            self.canonical.write(
                EntryDraft::new(MemoryContent::CanonicalFact { subject, value }, 1.0),
                Authority::Designer,
                now,
            )?;
        }
        self.canonical.seal();
        info!(npc = %self.npc, facts = self.canonical.len(), "canonical store sealed");
        Ok(())
    }

    pub fn store(&self, kind: MemoryKind) -> &MemoryStore {
        match kind {
            MemoryKind::Canonical => &self.canonical,
            MemoryKind::World => &self.world,
            MemoryKind::Episodic => &self.episodic,
            MemoryKind::Belief => &self.belief,
        }
    }

    fn store_mut(&mut self, kind: MemoryKind) -> &mut MemoryStore {
        match kind {
            MemoryKind::Canonical => &mut self.canonical,
            MemoryKind::World => &mut self.world,
            MemoryKind::Episodic => &mut self.episodic,
            MemoryKind::Belief => &mut self.belief,
        }
    }

    pub fn read(&self, kind: MemoryKind, filter: &MemoryFilter) -> Vec<&MemoryEntry> {
        self.store(kind).read(filter)
    }

    /// Write one entry, applying the belief-contradiction policy.
    pub fn write(
        &mut self,
        content: MemoryContent,
        significance: f64,
        authority: Authority,
        now: DateTime<Utc>,
    ) -> Result<EntryId, MemoryError> {
        let content = self.annotate_contradiction(content)?;
        let kind = content.kind();
        self.store_mut(kind)
            .write(EntryDraft::new(content, significance), authority, now)
    }

    pub fn tombstone(
        &mut self,
        kind: MemoryKind,
        id: &EntryId,
        authority: Authority,
        now: DateTime<Utc>,
    ) -> Result<(), MemoryError> {
        self.store_mut(kind).tombstone(id, authority, now)
    }

    /// Apply a batch transactionally: either every operation passes authority
    /// and invariants, or none are applied.
    pub fn commit(
        &mut self,
        ops: &[MemoryOp],
        now: DateTime<Utc>,
    ) -> Result<Vec<EntryId>, MemoryError> {
        let mut trial = self.clone();
        let mut ids = Vec::new();
        for op in ops {
            match op {
                MemoryOp::Write {
                    content,
                    significance,
                    authority,
                } => {
                    let id = trial.write(content.clone(), *significance, *authority, now)?;
                    ids.push(id);
                }
                MemoryOp::Tombstone {
                    kind,
                    id,
                    authority,
                } => {
                    trial.tombstone(*kind, id, *authority, now)?;
                }
            }
        }
        *self = trial;
        debug!(npc = %self.npc, ops = ops.len(), new_entries = ids.len(), "memory batch committed");
        Ok(ids)
    }

    /// Live belief entry for a subject, if one exists.
    pub fn live_belief(&self, subject: &str) -> Option<&MemoryEntry> {
        self.belief.live_by_subject(subject)
    }

    /// Live canonical fact for a subject, if one exists.
    pub fn canonical_fact(&self, subject: &str) -> Option<&MemoryEntry> {
        self.canonical.live_by_subject(subject)
    }

    /// Hash covering all four stores' canonical serializations.
    pub fn memory_hash(&self) -> ContentHash {
        #[derive(Serialize)]
        struct StoreHashes<'a> {
            npc: &'a NpcId,
            canonical: ContentHash,
            world: ContentHash,
            episodic: ContentHash,
            belief: ContentHash,
        }
        ContentHash::of_canonical(&StoreHashes {
            npc: &self.npc,
            canonical: self.canonical.hash(),
            world: self.world.hash(),
            episodic: self.episodic.hash(),
            belief: self.belief.hash(),
        })
        .unwrap_or_else(|_| ContentHash::of_str(self.npc.as_str()))
    }

    pub fn canonical_hash(&self) -> ContentHash {
        self.canonical.hash()
    }

    fn annotate_contradiction(&self, content: MemoryContent) -> Result<MemoryContent, MemoryError> {
        let MemoryContent::Belief {
            subject,
            statement,
            confidence,
            ..
        } = content
        else {
            return Ok(content);
        };

        let contradicts = match self.canonical.live_by_subject(&subject) {
            Some(fact) => match &fact.content {
                MemoryContent::CanonicalFact { value, .. } => {
                    statement != canonical_value_text(value)
                }
                _ => false,
            },
            None => false,
        };

        if contradicts && self.contradiction_policy == ContradictionPolicy::Reject {
            return Err(MemoryError::CanonicalContradiction { subject });
        }

        Ok(MemoryContent::Belief {
            subject,
            statement,
            confidence,
            contradicts_canonical: contradicts,
        })
    }
}

/// Text form a belief statement is compared against.
fn canonical_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shared entry point owning every NPC's stores. Operations on one NPC are
/// linearized through that NPC's lock; different NPCs proceed in parallel.
#[derive(Debug, Default)]
pub struct MemorySystem {
    config: MemoryConfig,
    npcs: RwLock<HashMap<NpcId, Arc<RwLock<NpcMemory>>>>,
}

impl MemorySystem {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            npcs: RwLock::new(HashMap::new()),
        }
    }

    /// Handle for an NPC's stores, created on first use.
    pub fn handle(&self, npc: &NpcId) -> Result<Arc<RwLock<NpcMemory>>, MemoryError> {
        {
            let npcs = self.npcs.read().map_err(|_| MemoryError::LockPoisoned)?;
            if let Some(handle) = npcs.get(npc) {
                return Ok(handle.clone());
            }
        }
        let mut npcs = self.npcs.write().map_err(|_| MemoryError::LockPoisoned)?;
        let handle = npcs
            .entry(npc.clone())
            .or_insert_with(|| Arc::new(RwLock::new(NpcMemory::new(npc.clone(), &self.config))))
            .clone();
        Ok(handle)
    }

    pub fn npc_ids(&self) -> Result<Vec<NpcId>, MemoryError> {
        let npcs = self.npcs.read().map_err(|_| MemoryError::LockPoisoned)?;
        Ok(npcs.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npc_memory() -> NpcMemory {
        let mut memory = NpcMemory::new(NpcId::new("witch"), &MemoryConfig::default());
        memory
            .load_canonical([
                ("magic-exists".to_string(), serde_json::json!(true)),
                ("tower-destroyed".to_string(), serde_json::json!(true)),
            ])
            .unwrap();
        memory
    }

    #[test]
    fn canonical_runtime_write_rejected() {
        let mut memory = npc_memory();
        let err = memory
            .write(
                MemoryContent::CanonicalFact {
                    subject: "tower-destroyed".into(),
                    value: serde_json::json!(false),
                },
                1.0,
                Authority::Designer,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, MemoryError::CanonicalFactProtected);
    }

    #[test]
    fn contradicting_belief_is_flagged_not_rejected() {
        let mut memory = npc_memory();
        let id = memory
            .write(
                MemoryContent::Belief {
                    subject: "magic-exists".into(),
                    statement: "magic is fake".into(),
                    confidence: 0.6,
                    contradicts_canonical: false,
                },
                0.6,
                Authority::GeneratorDerived,
                Utc::now(),
            )
            .unwrap();

        let entry = memory.store(MemoryKind::Belief).get(&id).unwrap();
        assert!(matches!(
            entry.content,
            MemoryContent::Belief {
                contradicts_canonical: true,
                ..
            }
        ));
    }

    #[test]
    fn reject_policy_refuses_contradiction() {
        let config = MemoryConfig {
            contradiction_policy: ContradictionPolicy::Reject,
            ..MemoryConfig::default()
        };
        let mut memory = NpcMemory::new(NpcId::new("witch"), &config);
        memory
            .load_canonical([("magic-exists".to_string(), serde_json::json!(true))])
            .unwrap();

        let err = memory
            .write(
                MemoryContent::Belief {
                    subject: "magic-exists".into(),
                    statement: "magic is fake".into(),
                    confidence: 0.6,
                    contradicts_canonical: false,
                },
                0.6,
                Authority::GeneratorDerived,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, MemoryError::CanonicalContradiction { .. }));
    }

    #[test]
    fn agreeing_belief_not_flagged() {
        let mut memory = npc_memory();
        let id = memory
            .write(
                MemoryContent::Belief {
                    subject: "magic-exists".into(),
                    statement: "true".into(),
                    confidence: 0.9,
                    contradicts_canonical: false,
                },
                0.9,
                Authority::GeneratorDerived,
                Utc::now(),
            )
            .unwrap();
        let entry = memory.store(MemoryKind::Belief).get(&id).unwrap();
        assert!(matches!(
            entry.content,
            MemoryContent::Belief {
                contradicts_canonical: false,
                ..
            }
        ));
    }

    #[test]
    fn failed_batch_leaves_memory_untouched() {
        let mut memory = npc_memory();
        let hash_before = memory.memory_hash();

        let ops = vec![
            MemoryOp::Write {
                content: MemoryContent::Episodic {
                    content: "first".into(),
                    tags: vec![],
                },
                significance: 0.5,
                authority: Authority::GeneratorDerived,
            },
            // World writes need GameSystem authority; this fails the batch.
            MemoryOp::Write {
                content: MemoryContent::WorldState {
                    key: "gate-open".into(),
                    value: serde_json::json!(true),
                },
                significance: 1.0,
                authority: Authority::GeneratorDerived,
            },
        ];

        let err = memory.commit(&ops, Utc::now()).unwrap_err();
        assert!(matches!(err, MemoryError::AuthorityInsufficient { .. }));
        assert_eq!(memory.memory_hash(), hash_before);
        assert_eq!(memory.store(MemoryKind::Episodic).len(), 0);
    }

    #[test]
    fn successful_batch_assigns_sequences_in_input_order() {
        let mut memory = npc_memory();
        let ops: Vec<MemoryOp> = (0..3)
            .map(|i| MemoryOp::Write {
                content: MemoryContent::Episodic {
                    content: format!("event {i}"),
                    tags: vec![],
                },
                significance: 0.5,
                authority: Authority::GeneratorDerived,
            })
            .collect();

        let ids = memory.commit(&ops, Utc::now()).unwrap();
        assert_eq!(ids.len(), 3);
        let seqs: Vec<u64> = ids
            .iter()
            .map(|id| {
                memory
                    .store(MemoryKind::Episodic)
                    .get(id)
                    .unwrap()
                    .header
                    .sequence_number
            })
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn memory_hash_ignores_nothing() {
        let mut memory = npc_memory();
        let before = memory.memory_hash();
        let canonical_before = memory.canonical_hash();
        memory
            .write(
                MemoryContent::Episodic {
                    content: "anything".into(),
                    tags: vec![],
                },
                0.5,
                Authority::GeneratorDerived,
                Utc::now(),
            )
            .unwrap();
        assert_ne!(memory.memory_hash(), before);
        // Canonical store unaffected by episodic writes.
        assert_eq!(memory.canonical_hash(), canonical_before);
    }

    #[test]
    fn system_hands_out_one_handle_per_npc() {
        let system = MemorySystem::new(MemoryConfig::default());
        let a1 = system.handle(&NpcId::new("a")).unwrap();
        let a2 = system.handle(&NpcId::new("a")).unwrap();
        let b = system.handle(&NpcId::new("b")).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(system.npc_ids().unwrap().len(), 2);
    }
}
