use chrono::{DateTime, Utc};
use llamabrain_expectancy::ConstraintSet;
use llamabrain_memory::{
    strict_total_order, MemoryEntry, MemoryFilter, MemoryKind, NpcMemory,
};
use llamabrain_types::{DialogueTurn, InteractionContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::score::RetrievalSignals;
use crate::snapshot::StateSnapshot;

/// Weights and bounds for memory selection. The component weights are
/// deliberately exposed; the shipped default is an even split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub recency_weight: f64,
    pub relevance_weight: f64,
    pub significance_weight: f64,
    /// Time constant of the recency component, seconds.
    pub recency_tau_secs: f64,
    /// Selection bound per scored store (episodic, belief).
    pub top_k_per_store: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recency_weight: 1.0 / 3.0,
            relevance_weight: 1.0 / 3.0,
            significance_weight: 1.0 / 3.0,
            recency_tau_secs: 3600.0,
            top_k_per_store: 8,
        }
    }
}

/// Selects a bounded, deterministic set of memories and freezes them into a
/// [`StateSnapshot`].
#[derive(Clone, Debug, Default)]
pub struct ContextRetriever {
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Capture a snapshot. Pure over its inputs: the same memory state,
    /// context, and `now` always yield byte-identical output.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot(
        &self,
        memory: &NpcMemory,
        ctx: &InteractionContext,
        constraints: &ConstraintSet,
        system_prompt: &str,
        history: &[DialogueTurn],
        interaction_count: u64,
        now: DateTime<Utc>,
    ) -> StateSnapshot {
        let signals = RetrievalSignals::from_context(ctx, constraints);

        // Canonical facts are always fully included.
        let canonical: Vec<MemoryEntry> = memory
            .read(MemoryKind::Canonical, &MemoryFilter::new())
            .into_iter()
            .cloned()
            .collect();

        // World state, optionally narrowed by the constraint key list.
        let world_filter = match constraints.world_key_filter() {
            Some(keys) => MemoryFilter::new().with_keys(keys),
            None => MemoryFilter::new(),
        };
        let world: Vec<MemoryEntry> = memory
            .read(MemoryKind::World, &world_filter)
            .into_iter()
            .cloned()
            .collect();

        let episodic = self.select_scored(memory, MemoryKind::Episodic, &signals, now);
        let beliefs = self.select_scored(memory, MemoryKind::Belief, &signals, now);

        debug!(
            npc = %ctx.npc_id,
            interaction_count,
            canonical = canonical.len(),
            world = world.len(),
            episodic = episodic.len(),
            beliefs = beliefs.len(),
            "snapshot captured"
        );

        StateSnapshot {
            context: ctx.clone(),
            constraints: constraints.clone(),
            canonical,
            world,
            episodic,
            beliefs,
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            interaction_count,
            taken_at: now,
        }
    }

    /// Top-K of a scored store. Entries under the decay rank threshold stay
    /// eligible but sort after every entry above it; all ties fall back to
    /// the strict total order.
    fn select_scored(
        &self,
        memory: &NpcMemory,
        kind: MemoryKind,
        signals: &RetrievalSignals,
        now: DateTime<Utc>,
    ) -> Vec<MemoryEntry> {
        let store = memory.store(kind);
        let decay = store.decay();
        let threshold = decay.map(|d| d.rank_threshold).unwrap_or(0.0);

        let mut scored: Vec<(bool, f64, &MemoryEntry)> = store
            .read(&MemoryFilter::new())
            .into_iter()
            .map(|entry| {
                let effective = entry.effective_significance(decay, now);
                let score = self.score(entry, effective, signals, now);
                (effective < threshold, score, entry)
            })
            .collect();

        scored.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.1.total_cmp(&a.1))
                .then_with(|| strict_total_order(a.2, b.2))
        });

        scored
            .into_iter()
            .take(self.config.top_k_per_store)
            .map(|(_, _, entry)| entry.clone())
            .collect()
    }

    fn score(
        &self,
        entry: &MemoryEntry,
        effective_significance: f64,
        signals: &RetrievalSignals,
        now: DateTime<Utc>,
    ) -> f64 {
        let age_secs = (now - entry.header.last_touched_at).num_milliseconds().max(0) as f64 / 1000.0;
        let recency = if self.config.recency_tau_secs > 0.0 {
            (-age_secs / self.config.recency_tau_secs).exp()
        } else {
            0.0
        };
        let relevance = signals.overlap(&entry.content.display_text(), entry.content.tags());

        self.config.recency_weight * recency
            + self.config.relevance_weight * relevance
            + self.config.significance_weight * effective_significance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use llamabrain_memory::{DecayConfig, MemoryConfig, MemoryContent};
    use llamabrain_types::{Authority, NpcId, SceneId, TriggerReason};

    fn ctx(input: &str) -> InteractionContext {
        InteractionContext::builder(
            NpcId::new("scholar"),
            SceneId::new("library"),
            TriggerReason::PlayerUtterance,
        )
        .player_input(input)
        .build()
    }

    fn memory_with_decay(half_life_secs: f64) -> NpcMemory {
        let config = MemoryConfig {
            decay: DecayConfig {
                half_life_secs,
                rank_threshold: 0.0,
            },
            ..MemoryConfig::default()
        };
        let mut memory = NpcMemory::new(NpcId::new("scholar"), &config);
        memory.load_canonical([]).unwrap();
        memory
    }

    fn write_episodic(memory: &mut NpcMemory, content: &str, significance: f64, at: DateTime<Utc>) {
        memory
            .write(
                MemoryContent::Episodic {
                    content: content.into(),
                    tags: vec![],
                },
                significance,
                Authority::GeneratorDerived,
                at,
            )
            .unwrap();
    }

    #[test]
    fn decay_reorders_old_significant_entries() {
        // E_old: significance 0.9 at age 10 half-lives; E_new: 0.5, fresh.
        let half_life = 60.0;
        let now = Utc::now();
        let mut memory = memory_with_decay(half_life);
        write_episodic(
            &mut memory,
            "old triumph",
            0.9,
            now - Duration::seconds((half_life * 10.0) as i64),
        );
        write_episodic(&mut memory, "fresh rumor", 0.5, now);

        let retriever = ContextRetriever::default();
        let snapshot = retriever.snapshot(
            &memory,
            &ctx(""),
            &ConstraintSet::new(),
            "system",
            &[],
            0,
            now,
        );
        let order: Vec<String> = snapshot
            .episodic
            .iter()
            .map(|e| e.content.display_text())
            .collect();
        assert_eq!(order, vec!["fresh rumor", "old triumph"]);
    }

    #[test]
    fn without_decay_significance_dominates() {
        // Same entries, but an effectively infinite half-life: E_old wins on
        // stored significance despite its age (recency loses to the 0.4 gap).
        let now = Utc::now();
        let mut memory = memory_with_decay(f64::MAX);
        write_episodic(&mut memory, "old triumph", 0.9, now - Duration::seconds(600));
        write_episodic(&mut memory, "fresh rumor", 0.5, now);

        let retriever = ContextRetriever::new(RetrievalConfig {
            recency_tau_secs: 1e9,
            ..RetrievalConfig::default()
        });
        let snapshot = retriever.snapshot(
            &memory,
            &ctx(""),
            &ConstraintSet::new(),
            "system",
            &[],
            0,
            now,
        );
        let order: Vec<String> = snapshot
            .episodic
            .iter()
            .map(|e| e.content.display_text())
            .collect();
        assert_eq!(order, vec!["old triumph", "fresh rumor"]);
    }

    #[test]
    fn relevance_pulls_matching_entries_up() {
        let now = Utc::now();
        let mut memory = memory_with_decay(f64::MAX);
        write_episodic(&mut memory, "the dragon burned the mill", 0.5, now);
        write_episodic(&mut memory, "bought turnips at market", 0.5, now);

        let retriever = ContextRetriever::default();
        let snapshot = retriever.snapshot(
            &memory,
            &ctx("tell me about the dragon"),
            &ConstraintSet::new(),
            "system",
            &[],
            0,
            now,
        );
        assert!(snapshot.episodic[0]
            .content
            .display_text()
            .contains("dragon"));
    }

    #[test]
    fn top_k_bounds_selection() {
        let now = Utc::now();
        let mut memory = memory_with_decay(f64::MAX);
        for i in 0..20 {
            write_episodic(&mut memory, &format!("event {i}"), 0.5, now);
        }
        let retriever = ContextRetriever::new(RetrievalConfig {
            top_k_per_store: 5,
            ..RetrievalConfig::default()
        });
        let snapshot = retriever.snapshot(
            &memory,
            &ctx(""),
            &ConstraintSet::new(),
            "system",
            &[],
            0,
            now,
        );
        assert_eq!(snapshot.episodic.len(), 5);
    }

    #[test]
    fn two_executions_are_byte_identical() {
        let now = Utc::now();
        let mut memory = memory_with_decay(3600.0);
        for i in 0..10 {
            write_episodic(
                &mut memory,
                &format!("event {i}"),
                0.5,
                now - Duration::seconds(i),
            );
        }
        let retriever = ContextRetriever::default();
        let take = || {
            retriever.snapshot(
                &memory,
                &ctx("event"),
                &ConstraintSet::new(),
                "system",
                &[],
                3,
                now,
            )
        };
        let a = serde_json::to_string(&take()).unwrap();
        let b = serde_json::to_string(&take()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn world_entries_filtered_by_constraint_keys() {
        use llamabrain_expectancy::{
            Constraint, ConstraintKind, PredicateId, Provenance, Severity,
        };

        let now = Utc::now();
        let mut memory = memory_with_decay(3600.0);
        memory
            .write(
                MemoryContent::WorldState {
                    key: "gate-open".into(),
                    value: serde_json::json!(false),
                },
                1.0,
                Authority::GameSystem,
                now,
            )
            .unwrap();
        memory
            .write(
                MemoryContent::WorldState {
                    key: "weather".into(),
                    value: serde_json::json!("rain"),
                },
                1.0,
                Authority::GameSystem,
                now,
            )
            .unwrap();

        let mut constraints = ConstraintSet::new();
        constraints.insert(
            Constraint::new(
                ConstraintKind::Permission,
                Severity::Soft,
                "",
                PredicateId::new("world-scope:gate"),
                Provenance::new("world-keys", "scene"),
            )
            .with_world_keys(["gate-open".to_string()]),
        );

        let retriever = ContextRetriever::default();
        let snapshot =
            retriever.snapshot(&memory, &ctx(""), &constraints, "system", &[], 0, now);
        assert_eq!(snapshot.world.len(), 1);
        assert!(snapshot.world[0].content.display_text().contains("gate-open"));
    }
}
