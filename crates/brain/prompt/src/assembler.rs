use llamabrain_memory::{strict_total_order, MemoryEntry};
use llamabrain_retrieval::StateSnapshot;
use llamabrain_types::{ContentHash, Speaker};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::budget::TokenBudget;

/// A priming example inserted directly after the system prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub player: String,
    pub npc: String,
}

/// Non-fatal conditions observed during assembly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AssemblyWarning {
    /// Canonical facts pushed the prompt past the budget. Allowed by
    /// contract; canon is never truncated.
    CanonicalOverflow { overflow_tokens: usize },
    /// The few-shot block alone exceeded the budget and was dropped.
    FewShotBudgetOverflow { required: usize, available: usize },
}

/// The assembled prompt plus its stable hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub text: String,
    pub prompt_hash: ContentHash,
    pub estimated_tokens: usize,
    pub warnings: Vec<AssemblyWarning>,
}

/// Ephemeral working memory for one assembly. Accumulates lines and token
/// spend, then is consumed by `finish`; nothing survives the call.
struct WorkingBuffer<'a> {
    budget: &'a TokenBudget,
    lines: Vec<String>,
    used_tokens: usize,
}

impl<'a> WorkingBuffer<'a> {
    fn new(budget: &'a TokenBudget) -> Self {
        Self {
            budget,
            lines: Vec::new(),
            used_tokens: 0,
        }
    }

    /// Append regardless of budget. Returns the token cost.
    fn push_unbounded(&mut self, text: &str) -> usize {
        let cost = self.budget.estimate(text);
        self.used_tokens += cost;
        self.lines.push(text.to_string());
        cost
    }

    /// Append only if the whole text fits. Entries are atomic: no partial
    /// inclusion, ever.
    fn try_push(&mut self, text: &str) -> bool {
        let cost = self.budget.estimate(text);
        if self.used_tokens + cost > self.budget.available() {
            return false;
        }
        self.used_tokens += cost;
        self.lines.push(text.to_string());
        true
    }

    fn blank_line(&mut self) {
        self.lines.push(String::new());
    }

    fn finish(self) -> (String, usize) {
        (self.lines.join("\n"), self.used_tokens)
    }
}

/// Greedy assembler with a fixed section order:
/// system prompt, few-shot examples, canonical facts, constraint injections,
/// world state, beliefs, episodic memories, dialogue tail, player input,
/// response cue. Bounded sections stop at the first entry that does not fit.
#[derive(Clone, Debug, Default)]
pub struct PromptAssembler {
    budget: TokenBudget,
    few_shot: Vec<FewShotExample>,
}

impl PromptAssembler {
    pub fn new(budget: TokenBudget) -> Self {
        Self {
            budget,
            few_shot: Vec::new(),
        }
    }

    pub fn with_few_shot(mut self, examples: Vec<FewShotExample>) -> Self {
        self.few_shot = examples;
        self
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Assemble the prompt for a snapshot. No side effects, no suspension.
    pub fn assemble(&self, snapshot: &StateSnapshot) -> AssembledPrompt {
        let mut warnings = Vec::new();
        let mut buffer = WorkingBuffer::new(&self.budget);
        let npc_name = snapshot.context.npc_id.as_str().to_string();

        // (1) System prompt; never truncated.
        if !snapshot.system_prompt.is_empty() {
            buffer.push_unbounded(&snapshot.system_prompt);
            buffer.blank_line();
        }

        // (1b) Few-shot priming: all or nothing.
        if !self.few_shot.is_empty() {
            let block = self.render_few_shot(&npc_name);
            let required = self.budget.estimate(&block);
            if required > self.budget.available() {
                warn!(required, available = self.budget.available(), "few-shot block dropped");
                warnings.push(AssemblyWarning::FewShotBudgetOverflow {
                    required,
                    available: self.budget.available(),
                });
            } else {
                buffer.push_unbounded(&block);
                buffer.blank_line();
            }
        }

        // (2) Canonical facts; authority-driven, never truncated.
        if !snapshot.canonical.is_empty() {
            buffer.push_unbounded("[Known facts]");
            for entry in ordered(&snapshot.canonical) {
                buffer.push_unbounded(&format!("- {}", entry.content.display_text()));
            }
            buffer.blank_line();
            if buffer.used_tokens > self.budget.available() {
                let overflow_tokens = buffer.used_tokens - self.budget.available();
                warn!(overflow_tokens, "canonical facts overflow the prompt budget");
                warnings.push(AssemblyWarning::CanonicalOverflow { overflow_tokens });
            }
        }

        // (3) Constraint injections, in constraint-set order.
        let injections: Vec<&str> = snapshot
            .constraints
            .iter()
            .map(|c| c.prompt_injection.as_str())
            .filter(|text| !text.is_empty())
            .collect();
        if !injections.is_empty() {
            buffer.try_push("[Directives]");
            for injection in injections {
                if !buffer.try_push(&format!("- {injection}")) {
                    break;
                }
            }
            buffer.blank_line();
        }

        // (4) World state.
        self.push_entry_section(&mut buffer, "[World]", &snapshot.world);

        // (5) Beliefs.
        self.push_entry_section(&mut buffer, "[Beliefs]", &snapshot.beliefs);

        // (6) Episodic memories.
        self.push_entry_section(&mut buffer, "[Memories]", &snapshot.episodic);

        // (7) Dialogue tail: newest turns kept, rendered chronologically.
        if !snapshot.history.is_empty() {
            let mut kept: Vec<String> = Vec::new();
            let header_cost = self.budget.estimate("[Conversation]");
            let mut spent = buffer.used_tokens + header_cost;
            for turn in snapshot.history.iter().rev() {
                let line = match turn.speaker {
                    Speaker::Player => format!("Player: {}", turn.text),
                    Speaker::Npc => format!("{}: {}", npc_name, turn.text),
                };
                let cost = self.budget.estimate(&line);
                if spent + cost > self.budget.available() {
                    break;
                }
                spent += cost;
                kept.push(line);
            }
            if !kept.is_empty() {
                buffer.try_push("[Conversation]");
                for line in kept.into_iter().rev() {
                    buffer.try_push(&line);
                }
                buffer.blank_line();
            }
        }

        // (8) Player input and (9) response cue; always present.
        if !snapshot.context.player_input.is_empty() {
            buffer.push_unbounded(&format!("Player: {}", snapshot.context.player_input));
        }
        buffer.push_unbounded(&format!("{npc_name}:"));

        let (text, estimated_tokens) = buffer.finish();
        let prompt_hash = ContentHash::of_str(&text);
        debug!(
            npc = %snapshot.context.npc_id,
            estimated_tokens,
            hash = %prompt_hash,
            warnings = warnings.len(),
            "prompt assembled"
        );

        AssembledPrompt {
            text,
            prompt_hash,
            estimated_tokens,
            warnings,
        }
    }

    fn render_few_shot(&self, npc_name: &str) -> String {
        let mut lines = vec!["[Examples]".to_string()];
        for example in &self.few_shot {
            lines.push(format!("Player: {}", example.player));
            lines.push(format!("{}: {}", npc_name, example.npc));
        }
        lines.join("\n")
    }

    /// A bounded entry section: header plus entries in strict total order,
    /// stopping at the first entry that does not fit.
    fn push_entry_section(
        &self,
        buffer: &mut WorkingBuffer<'_>,
        header: &str,
        entries: &[MemoryEntry],
    ) {
        if entries.is_empty() {
            return;
        }
        if !buffer.try_push(header) {
            return;
        }
        for entry in ordered(entries) {
            if !buffer.try_push(&format!("- {}", entry.content.display_text())) {
                break;
            }
        }
        buffer.blank_line();
    }
}

/// Entries of a section in the strict total order, independent of the
/// selection order the retriever used.
fn ordered(entries: &[MemoryEntry]) -> Vec<&MemoryEntry> {
    let mut out: Vec<&MemoryEntry> = entries.iter().collect();
    out.sort_by(|a, b| strict_total_order(a, b));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use llamabrain_expectancy::{
        Constraint, ConstraintKind, ConstraintSet, PredicateId, Provenance, Severity,
    };
    use llamabrain_memory::{EntryHeader, MemoryContent};
    use llamabrain_retrieval::StateSnapshot;
    use llamabrain_types::{
        DialogueTurn, EntryId, InteractionContext, NpcId, SceneId, TriggerReason,
    };

    fn entry(kind_content: MemoryContent, significance: f64, sequence: u64) -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            header: EntryHeader {
                id: EntryId::derive(&NpcId::new("guard"), "test", sequence),
                created_at: now,
                last_touched_at: now,
                significance,
                sequence_number: sequence,
                tombstoned: false,
            },
            content: kind_content,
        }
    }

    fn episodic(text: &str, significance: f64, sequence: u64) -> MemoryEntry {
        entry(
            MemoryContent::Episodic {
                content: text.into(),
                tags: vec![],
            },
            significance,
            sequence,
        )
    }

    fn snapshot() -> StateSnapshot {
        let ctx = InteractionContext::builder(
            NpcId::new("guard"),
            SceneId::new("gatehouse"),
            TriggerReason::PlayerUtterance,
        )
        .player_input("who goes there?")
        .player_name("Ada")
        .build();

        let mut constraints = ConstraintSet::new();
        constraints.insert(Constraint::new(
            ConstraintKind::Requirement,
            Severity::Hard,
            "Address the player, Ada, by name.",
            PredicateId::new("dialogue-mentions-player"),
            Provenance::new("mention-player", "player_utterance"),
        ));

        StateSnapshot {
            context: ctx,
            constraints,
            canonical: vec![entry(
                MemoryContent::CanonicalFact {
                    subject: "tower-destroyed".into(),
                    value: serde_json::json!(true),
                },
                1.0,
                0,
            )],
            world: vec![entry(
                MemoryContent::WorldState {
                    key: "gate-open".into(),
                    value: serde_json::json!(false),
                },
                1.0,
                0,
            )],
            episodic: vec![
                episodic("a traveler passed at dusk", 0.4, 0),
                episodic("the captain doubled the watch", 0.8, 1),
            ],
            beliefs: vec![],
            system_prompt: "You are the gate guard. Stay in character.".into(),
            history: vec![
                DialogueTurn::player("hello", Utc::now()),
                DialogueTurn::npc("state your business", Utc::now()),
            ],
            interaction_count: 4,
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let assembler = PromptAssembler::new(TokenBudget::default());
        let prompt = assembler.assemble(&snapshot());

        let idx = |needle: &str| prompt.text.find(needle).unwrap();
        assert!(idx("You are the gate guard") < idx("[Known facts]"));
        assert!(idx("[Known facts]") < idx("[Directives]"));
        assert!(idx("[Directives]") < idx("[World]"));
        assert!(idx("[World]") < idx("[Memories]"));
        assert!(idx("[Memories]") < idx("[Conversation]"));
        assert!(idx("[Conversation]") < idx("Player: who goes there?"));
        assert!(prompt.text.ends_with("guard:"));
        assert!(prompt.warnings.is_empty());
    }

    #[test]
    fn entries_render_in_strict_total_order() {
        let assembler = PromptAssembler::new(TokenBudget::default());
        let prompt = assembler.assemble(&snapshot());
        // Higher-significance memory first, despite insertion order.
        assert!(
            prompt.text.find("captain doubled the watch").unwrap()
                < prompt.text.find("traveler passed at dusk").unwrap()
        );
    }

    #[test]
    fn prompt_hash_is_stable() {
        let assembler = PromptAssembler::new(TokenBudget::default());
        let snap = snapshot();
        assert_eq!(
            assembler.assemble(&snap).prompt_hash,
            assembler.assemble(&snap).prompt_hash
        );
    }

    #[test]
    fn canonical_overflow_is_warned_not_truncated() {
        let assembler = PromptAssembler::new(TokenBudget {
            max_tokens: 30,
            response_reserve: 10,
            chars_per_token: 4.0,
        });
        let mut snap = snapshot();
        snap.canonical = (0..20)
            .map(|i| {
                entry(
                    MemoryContent::CanonicalFact {
                        subject: format!("fact-{i}"),
                        value: serde_json::json!("a long canonical statement of record"),
                    },
                    1.0,
                    i,
                )
            })
            .collect();

        let prompt = assembler.assemble(&snap);
        assert!(prompt
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::CanonicalOverflow { .. })));
        // Every fact made it in regardless.
        for i in 0..20 {
            assert!(prompt.text.contains(&format!("fact-{i}")));
        }
    }

    #[test]
    fn bounded_section_stops_at_first_misfit() {
        let assembler = PromptAssembler::new(TokenBudget {
            max_tokens: 64,
            response_reserve: 8,
            chars_per_token: 4.0,
        });
        let mut snap = snapshot();
        snap.episodic = (0..50)
            .map(|i| episodic(&format!("memory number {i} with several words"), 0.5, i))
            .collect();

        let prompt = assembler.assemble(&snap);
        let included = prompt.text.matches("memory number").count();
        assert!(included > 0);
        assert!(included < 50);
        // No partial entries: each included line is complete.
        for line in prompt.text.lines().filter(|l| l.contains("memory number")) {
            assert!(line.ends_with("words"));
        }
    }

    #[test]
    fn few_shot_inserted_after_system_prompt() {
        let assembler = PromptAssembler::new(TokenBudget::default()).with_few_shot(vec![
            FewShotExample {
                player: "any news?".into(),
                npc: "quiet night, thankfully".into(),
            },
        ]);
        let prompt = assembler.assemble(&snapshot());
        let idx = |needle: &str| prompt.text.find(needle).unwrap();
        assert!(idx("You are the gate guard") < idx("[Examples]"));
        assert!(idx("[Examples]") < idx("[Known facts]"));
    }

    #[test]
    fn oversized_few_shot_dropped_with_warning() {
        let assembler = PromptAssembler::new(TokenBudget {
            max_tokens: 40,
            response_reserve: 8,
            chars_per_token: 4.0,
        })
        .with_few_shot(vec![FewShotExample {
            player: "x".repeat(400),
            npc: "y".repeat(400),
        }]);

        let prompt = assembler.assemble(&snapshot());
        assert!(prompt
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::FewShotBudgetOverflow { .. })));
        assert!(!prompt.text.contains("[Examples]"));
    }

    #[test]
    fn dialogue_tail_keeps_newest_turns() {
        let assembler = PromptAssembler::new(TokenBudget {
            max_tokens: 110,
            response_reserve: 8,
            chars_per_token: 4.0,
        });
        let mut snap = snapshot();
        snap.canonical.clear();
        snap.world.clear();
        snap.episodic.clear();
        snap.history = (0..30)
            .map(|i| DialogueTurn::player(format!("turn number {i} in the log"), Utc::now()))
            .collect();

        let prompt = assembler.assemble(&snap);
        // The newest turn survives; the oldest does not.
        assert!(prompt.text.contains("turn number 29"));
        assert!(!prompt.text.contains("turn number 0 "));
    }
}
