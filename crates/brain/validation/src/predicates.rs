use std::collections::HashMap;
use std::sync::Arc;

use llamabrain_expectancy::PredicateId;
use llamabrain_parser::ParsedOutput;
use llamabrain_retrieval::StateSnapshot;

type PredicateFn = Arc<dyn Fn(&StateSnapshot, &ParsedOutput) -> bool + Send + Sync>;
type PrefixFn = Arc<dyn Fn(&str, &StateSnapshot, &ParsedOutput) -> bool + Send + Sync>;

/// Pure predicates the gate executes for constraint compliance.
///
/// Two lookup forms: exact ids, and prefix families (`dialogue-mentions:X`)
/// where the suffix parameterizes a single handler. Predicates read only the
/// snapshot and the output.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    exact: HashMap<PredicateId, PredicateFn>,
    prefixes: Vec<(String, PrefixFn)>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the shipped predicate catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register("dialogue-mentions-player", |snapshot, output| {
            match snapshot.context.player_name.as_deref() {
                Some(name) if !name.is_empty() => output
                    .dialogue_text
                    .to_lowercase()
                    .contains(&name.to_lowercase()),
                _ => false,
            }
        });

        registry.register("dialogue-is-terse", |_, output| {
            output.dialogue_text.chars().count() <= 160
        });

        registry.register_prefix("dialogue-mentions:", |topic, _, output| {
            output
                .dialogue_text
                .to_lowercase()
                .contains(&topic.to_lowercase())
        });

        // Scene scope permissions never validate anything.
        registry.register_prefix("world-scope:", |_, _, _| true);

        registry
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        predicate: impl Fn(&StateSnapshot, &ParsedOutput) -> bool + Send + Sync + 'static,
    ) {
        self.exact
            .insert(PredicateId::new(id), Arc::new(predicate));
    }

    pub fn register_prefix(
        &mut self,
        prefix: impl Into<String>,
        predicate: impl Fn(&str, &StateSnapshot, &ParsedOutput) -> bool + Send + Sync + 'static,
    ) {
        self.prefixes.push((prefix.into(), Arc::new(predicate)));
    }

    /// Evaluate a predicate. `None` means the id is not registered.
    pub fn evaluate(
        &self,
        id: &PredicateId,
        snapshot: &StateSnapshot,
        output: &ParsedOutput,
    ) -> Option<bool> {
        if let Some(predicate) = self.exact.get(id) {
            return Some(predicate(snapshot, output));
        }
        for (prefix, predicate) in &self.prefixes {
            if let Some(suffix) = id.as_str().strip_prefix(prefix.as_str()) {
                return Some(predicate(suffix, snapshot, output));
            }
        }
        None
    }
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field(
                "prefixes",
                &self.prefixes.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use llamabrain_expectancy::ConstraintSet;
    use llamabrain_types::{InteractionContext, NpcId, SceneId, TriggerReason};

    fn snapshot(player_name: Option<&str>) -> StateSnapshot {
        let builder = InteractionContext::builder(
            NpcId::new("guard"),
            SceneId::new("gate"),
            TriggerReason::PlayerUtterance,
        );
        let ctx = match player_name {
            Some(name) => builder.player_name(name).build(),
            None => builder.build(),
        };
        StateSnapshot {
            context: ctx,
            constraints: ConstraintSet::new(),
            canonical: vec![],
            world: vec![],
            episodic: vec![],
            beliefs: vec![],
            system_prompt: String::new(),
            history: vec![],
            interaction_count: 0,
            taken_at: Utc::now(),
        }
    }

    fn output(dialogue: &str) -> ParsedOutput {
        ParsedOutput::dialogue_only(dialogue)
    }

    #[test]
    fn mention_player_case_insensitive() {
        let registry = PredicateRegistry::with_builtins();
        let id = PredicateId::new("dialogue-mentions-player");
        let snap = snapshot(Some("Ada"));
        assert_eq!(
            registry.evaluate(&id, &snap, &output("Welcome back, ADA.")),
            Some(true)
        );
        assert_eq!(
            registry.evaluate(&id, &snap, &output("Welcome, traveler.")),
            Some(false)
        );
    }

    #[test]
    fn mention_player_without_name_is_false() {
        let registry = PredicateRegistry::with_builtins();
        let id = PredicateId::new("dialogue-mentions-player");
        assert_eq!(
            registry.evaluate(&id, &snapshot(None), &output("hello Ada")),
            Some(false)
        );
    }

    #[test]
    fn topic_prefix_parameterizes() {
        let registry = PredicateRegistry::with_builtins();
        let id = PredicateId::new("dialogue-mentions:the hidden vault");
        assert_eq!(
            registry.evaluate(
                &id,
                &snapshot(None),
                &output("rumors speak of The Hidden Vault")
            ),
            Some(true)
        );
        assert_eq!(
            registry.evaluate(&id, &snapshot(None), &output("nothing to say")),
            Some(false)
        );
    }

    #[test]
    fn unknown_predicate_is_none() {
        let registry = PredicateRegistry::with_builtins();
        assert_eq!(
            registry.evaluate(&PredicateId::new("no-such"), &snapshot(None), &output("x")),
            None
        );
    }
}
