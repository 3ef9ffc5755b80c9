use llamabrain_types::{ContentHash, FunctionCall, MutationRequest, ProposedMutation, WorldIntent};
use serde::Serialize;
use serde_json::Value;

/// Which parse path produced the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Strict JSON parse against the reply schema.
    Structured,
    /// JSON parse succeeded after deterministic repair.
    StructuredRepaired,
    /// Marker-pattern extraction.
    Pattern,
}

/// The structured result of parsing one generator response.
///
/// Equality is semantic: dialogue, mutations, intents, and function calls.
/// `raw_text`, the parse mode, and the notes are diagnostics and do not
/// participate; `parse(serialize(parse(x)))` re-parses through the pattern
/// path and must still compare equal.
#[derive(Clone, Debug, Serialize)]
pub struct ParsedOutput {
    pub dialogue_text: String,
    pub proposed_mutations: Vec<ProposedMutation>,
    pub world_intents: Vec<WorldIntent>,
    pub function_calls: Vec<FunctionCall>,
    pub raw_text: String,
    pub mode: ParseMode,
    pub notes: Vec<String>,
}

impl PartialEq for ParsedOutput {
    fn eq(&self, other: &Self) -> bool {
        self.dialogue_text == other.dialogue_text
            && self.proposed_mutations == other.proposed_mutations
            && self.world_intents == other.world_intents
            && self.function_calls == other.function_calls
    }
}

impl ParsedOutput {
    /// A dialogue-only output (used by the fallback system).
    pub fn dialogue_only(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            dialogue_text: text.clone(),
            proposed_mutations: Vec::new(),
            world_intents: Vec::new(),
            function_calls: Vec::new(),
            raw_text: text,
            mode: ParseMode::Pattern,
            notes: Vec::new(),
        }
    }

    pub fn has_state_effects(&self) -> bool {
        !self.proposed_mutations.is_empty() || !self.world_intents.is_empty()
    }

    /// Stable hash over the semantic fields.
    pub fn output_hash(&self) -> ContentHash {
        ContentHash::of_str(&self.serialize())
    }

    /// Sort mutation and intent lists by stable content hash; the list
    /// ordering leg of the normalization contract.
    pub(crate) fn sort_lists(&mut self) {
        self.proposed_mutations
            .sort_by_key(|m| m.content_hash());
        self.world_intents.sort_by_key(intent_hash);
        self.function_calls.sort_by_key(call_hash);
    }

    /// Canonical wire form. Re-parsing this through the pattern path yields
    /// a semantically equal output.
    pub fn serialize(&self) -> String {
        let mut lines = Vec::new();
        if !self.dialogue_text.is_empty() {
            lines.push(format!("DIALOGUE: {}", self.dialogue_text));
        }
        for proposed in &self.proposed_mutations {
            lines.push(format!("MUTATION: {}", serialize_mutation(&proposed.request)));
        }
        for intent in &self.world_intents {
            lines.push(serialize_intent(intent));
        }
        for call in &self.function_calls {
            lines.push(serialize_call(call));
        }
        lines.join("\n")
    }
}

fn intent_hash(intent: &WorldIntent) -> ContentHash {
    ContentHash::of_canonical(intent).unwrap_or_else(|_| ContentHash::of_str(&intent.intent_type))
}

fn call_hash(call: &FunctionCall) -> ContentHash {
    ContentHash::of_canonical(call).unwrap_or_else(|_| ContentHash::of_str(&call.name))
}

fn serialize_mutation(request: &MutationRequest) -> String {
    match request {
        MutationRequest::AppendEpisodic {
            content,
            significance,
            tags,
        } => {
            let mut out = format!("episodic.append \"{content}\" significance={significance:.4}");
            if !tags.is_empty() {
                out.push_str(&format!(" tags={}", tags.join(",")));
            }
            out
        }
        MutationRequest::TransformBelief {
            subject,
            statement,
            confidence_delta,
        } => format!("belief.{subject} := \"{statement}\" confidence={confidence_delta:+.4}"),
        MutationRequest::TransformRelationship {
            subject,
            target,
            delta,
        } => format!("relationship.{subject}.{target} += {delta:.4}"),
        MutationRequest::EmitWorldIntent(intent) => format!(
            "intent.{} target={} payload={}",
            intent.intent_type, intent.target, intent.payload
        ),
        MutationRequest::WriteCanonical { subject, value } => {
            format!("canonical.{subject} := {value}")
        }
    }
}

fn serialize_intent(intent: &WorldIntent) -> String {
    if intent.payload == Value::Null {
        format!("INTENT: {} target={}", intent.intent_type, intent.target)
    } else {
        format!(
            "INTENT: {} target={} payload={}",
            intent.intent_type, intent.target, intent.payload
        )
    }
}

fn serialize_call(call: &FunctionCall) -> String {
    if call.args == Value::Null {
        format!("FUNCTION_CALL: {}", call.name)
    } else {
        format!("FUNCTION_CALL: {} {}", call.name, call.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_skips_empty_dialogue() {
        let output = ParsedOutput {
            dialogue_text: String::new(),
            proposed_mutations: vec![ProposedMutation::generator_derived(
                MutationRequest::AppendEpisodic {
                    content: "saw a fox".into(),
                    significance: 0.25,
                    tags: vec![],
                },
            )],
            world_intents: vec![],
            function_calls: vec![],
            raw_text: String::new(),
            mode: ParseMode::Pattern,
            notes: vec![],
        };
        let wire = output.serialize();
        assert!(!wire.contains("DIALOGUE:"));
        assert!(wire.contains("episodic.append \"saw a fox\" significance=0.2500"));
    }

    #[test]
    fn list_order_follows_content_hash() {
        let mutation = |content: &str| {
            ProposedMutation::generator_derived(MutationRequest::AppendEpisodic {
                content: content.into(),
                significance: 0.5,
                tags: vec![],
            })
        };
        let mut a = ParsedOutput::dialogue_only("x");
        a.proposed_mutations = vec![mutation("alpha"), mutation("beta")];
        a.sort_lists();

        let mut b = ParsedOutput::dialogue_only("x");
        b.proposed_mutations = vec![mutation("beta"), mutation("alpha")];
        b.sort_lists();

        assert_eq!(a.proposed_mutations, b.proposed_mutations);
    }

    #[test]
    fn equality_ignores_diagnostics() {
        let mut a = ParsedOutput::dialogue_only("hello");
        a.notes.push("anything".into());
        a.raw_text = "raw A".into();
        let mut b = ParsedOutput::dialogue_only("hello");
        b.raw_text = "raw B".into();
        assert_eq!(a, b);
    }

    #[test]
    fn output_hash_tracks_semantics() {
        let a = ParsedOutput::dialogue_only("hello");
        let mut b = ParsedOutput::dialogue_only("hello");
        b.raw_text = "different raw".into();
        assert_eq!(a.output_hash(), b.output_hash());

        let c = ParsedOutput::dialogue_only("different");
        assert_ne!(a.output_hash(), c.output_hash());
    }
}
