use std::collections::HashMap;

use llamabrain_types::{NpcId, TriggerReason};
use serde::Serialize;
use tracing::info;

/// Which tier of the hierarchy answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    Contextual,
    NpcGeneric,
    GlobalEmergency,
}

/// A designer-authored fallback line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FallbackResponse {
    pub text: String,
    pub tier: FallbackTier,
}

/// Designer-authored response catalog, looked up most-specific-first:
/// (npc, trigger) → npc → global emergency.
#[derive(Clone, Debug)]
pub struct FallbackCatalog {
    contextual: HashMap<(NpcId, String), Vec<String>>,
    npc_generic: HashMap<NpcId, Vec<String>>,
    global: Vec<String>,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self {
            contextual: HashMap::new(),
            npc_generic: HashMap::new(),
            global: vec!["Give me a moment to collect my thoughts.".to_string()],
        }
    }
}

impl FallbackCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contextual(
        mut self,
        npc: NpcId,
        trigger: &TriggerReason,
        lines: Vec<String>,
    ) -> Self {
        self.contextual
            .insert((npc, trigger.tag().to_string()), lines);
        self
    }

    pub fn with_npc_generic(mut self, npc: NpcId, lines: Vec<String>) -> Self {
        self.npc_generic.insert(npc, lines);
        self
    }

    pub fn with_global(mut self, lines: Vec<String>) -> Self {
        if !lines.is_empty() {
            self.global = lines;
        }
        self
    }
}

/// Selects a fallback line. Selection is seeded so replays pick the same
/// line, and fallbacks never touch memory; the caller wraps the text in a
/// dialogue-only output.
#[derive(Clone, Debug, Default)]
pub struct FallbackSystem {
    catalog: FallbackCatalog,
}

impl FallbackSystem {
    pub fn new(catalog: FallbackCatalog) -> Self {
        Self { catalog }
    }

    pub fn select(&self, npc: &NpcId, trigger: &TriggerReason, seed: u64) -> FallbackResponse {
        let key = (npc.clone(), trigger.tag().to_string());
        if let Some(lines) = self.catalog.contextual.get(&key) {
            if let Some(text) = pick(lines, seed) {
                info!(npc = %npc, trigger = %trigger, "contextual fallback selected");
                return FallbackResponse {
                    text,
                    tier: FallbackTier::Contextual,
                };
            }
        }
        if let Some(lines) = self.catalog.npc_generic.get(npc) {
            if let Some(text) = pick(lines, seed) {
                info!(npc = %npc, "npc-generic fallback selected");
                return FallbackResponse {
                    text,
                    tier: FallbackTier::NpcGeneric,
                };
            }
        }
        let text = pick(&self.catalog.global, seed)
            .unwrap_or_else(|| "Give me a moment to collect my thoughts.".to_string());
        info!(npc = %npc, "global emergency fallback selected");
        FallbackResponse {
            text,
            tier: FallbackTier::GlobalEmergency,
        }
    }
}

fn pick(lines: &[String], seed: u64) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    let index = (seed % lines.len() as u64) as usize;
    lines.get(index).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> FallbackSystem {
        FallbackSystem::new(
            FallbackCatalog::new()
                .with_contextual(
                    NpcId::new("guard"),
                    &TriggerReason::PlayerUtterance,
                    vec!["State your business plainly.".to_string()],
                )
                .with_npc_generic(
                    NpcId::new("guard"),
                    vec!["Hmph.".to_string(), "Move along.".to_string()],
                ),
        )
    }

    #[test]
    fn contextual_wins_over_generic() {
        let response = system().select(&NpcId::new("guard"), &TriggerReason::PlayerUtterance, 0);
        assert_eq!(response.tier, FallbackTier::Contextual);
        assert_eq!(response.text, "State your business plainly.");
    }

    #[test]
    fn generic_covers_other_triggers() {
        let response = system().select(&NpcId::new("guard"), &TriggerReason::TimerTick, 1);
        assert_eq!(response.tier, FallbackTier::NpcGeneric);
        assert_eq!(response.text, "Move along.");
    }

    #[test]
    fn global_covers_unknown_npcs() {
        let response = system().select(&NpcId::new("stranger"), &TriggerReason::SceneEvent, 9);
        assert_eq!(response.tier, FallbackTier::GlobalEmergency);
        assert!(!response.text.is_empty());
    }

    #[test]
    fn selection_is_seed_deterministic() {
        let sys = system();
        let npc = NpcId::new("guard");
        let a = sys.select(&npc, &TriggerReason::TimerTick, 42);
        let b = sys.select(&npc, &TriggerReason::TimerTick, 42);
        assert_eq!(a, b);
    }
}
