use llamabrain_types::{MutationRequest, ProposedMutation, WorldIntent};
use tracing::debug;

use crate::normalize::{
    normalize_call_name, normalize_dialogue, normalize_payload_text, normalize_subject,
    normalize_tags, quantize, strip_sentinels,
};
use crate::output::{ParseMode, ParsedOutput};
use crate::pattern::PatternParser;
use crate::structured::{try_structured, StructuredAttempt};

/// The total parser. Structured JSON is attempted whenever the response was
/// produced under an enforced schema or merely looks like JSON; pattern mode
/// covers everything else. Every input yields a [`ParsedOutput`].
pub struct OutputParser {
    pattern: PatternParser,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser {
    pub fn new() -> Self {
        Self {
            pattern: PatternParser::new(),
        }
    }

    /// Parse raw generator text. `schema_enforced` is the façade's flag: when
    /// false, a structured request was downgraded and strict JSON is not
    /// expected (but still recognized when present).
    pub fn parse(&self, raw: &str, schema_enforced: bool) -> ParsedOutput {
        let stripped = strip_sentinels(raw);
        let mut notes: Vec<String> = Vec::new();

        let looks_structured = {
            let head = stripped.trim_start();
            head.starts_with('{') || head.starts_with("```")
        };

        let (mode, dialogue, mutations, intents, calls) =
            if schema_enforced || looks_structured {
                match try_structured(stripped) {
                    StructuredAttempt::Strict(reply) => (
                        ParseMode::Structured,
                        reply.dialogue,
                        reply.mutations,
                        reply.intents,
                        reply.function_calls,
                    ),
                    StructuredAttempt::Repaired(reply) => (
                        ParseMode::StructuredRepaired,
                        reply.dialogue,
                        reply.mutations,
                        reply.intents,
                        reply.function_calls,
                    ),
                    StructuredAttempt::Failed => {
                        if schema_enforced {
                            notes.push("structured parse failed; fell back to patterns".into());
                        }
                        let extraction = self.pattern.extract(stripped);
                        notes.extend(extraction.notes);
                        (
                            ParseMode::Pattern,
                            extraction.dialogue,
                            extraction.mutations,
                            extraction.intents,
                            extraction.function_calls,
                        )
                    }
                }
            } else {
                let extraction = self.pattern.extract(stripped);
                notes.extend(extraction.notes);
                (
                    ParseMode::Pattern,
                    extraction.dialogue,
                    extraction.mutations,
                    extraction.intents,
                    extraction.function_calls,
                )
            };

        let mut world_intents: Vec<WorldIntent> = Vec::new();
        let mut proposed: Vec<ProposedMutation> = Vec::new();
        for mutation in mutations {
            match normalize_mutation(mutation) {
                MutationRequest::EmitWorldIntent(intent) => world_intents.push(intent),
                normalized => proposed.push(ProposedMutation::generator_derived(normalized)),
            }
        }
        world_intents.extend(intents.into_iter().map(normalize_intent));

        let function_calls = calls
            .into_iter()
            .map(|call| llamabrain_types::FunctionCall {
                name: normalize_call_name(&call.name),
                args: call.args,
            })
            .collect();

        let mut output = ParsedOutput {
            dialogue_text: normalize_dialogue(&dialogue),
            proposed_mutations: proposed,
            world_intents,
            function_calls,
            raw_text: raw.to_string(),
            mode,
            notes,
        };
        output.sort_lists();

        debug!(
            mode = ?output.mode,
            mutations = output.proposed_mutations.len(),
            intents = output.world_intents.len(),
            notes = output.notes.len(),
            "output parsed"
        );
        output
    }
}

/// Apply the normalization contract to one mutation request.
fn normalize_mutation(request: MutationRequest) -> MutationRequest {
    match request {
        MutationRequest::AppendEpisodic {
            content,
            significance,
            tags,
        } => MutationRequest::AppendEpisodic {
            content: normalize_payload_text(&content),
            significance: quantize(significance),
            tags: normalize_tags(&tags),
        },
        MutationRequest::TransformBelief {
            subject,
            statement,
            confidence_delta,
        } => MutationRequest::TransformBelief {
            subject: normalize_subject(&subject),
            statement: normalize_payload_text(&statement),
            confidence_delta: quantize(confidence_delta),
        },
        MutationRequest::TransformRelationship {
            subject,
            target,
            delta,
        } => MutationRequest::TransformRelationship {
            subject: normalize_subject(&subject),
            target: normalize_subject(&target),
            delta: quantize(delta),
        },
        MutationRequest::EmitWorldIntent(intent) => {
            MutationRequest::EmitWorldIntent(normalize_intent(intent))
        }
        MutationRequest::WriteCanonical { subject, value } => MutationRequest::WriteCanonical {
            subject: normalize_subject(&subject),
            value,
        },
    }
}

fn normalize_intent(intent: WorldIntent) -> WorldIntent {
    WorldIntent {
        intent_type: normalize_subject(&intent.intent_type),
        target: normalize_subject(&intent.target),
        payload: intent.payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamabrain_types::Authority;

    fn parser() -> OutputParser {
        OutputParser::new()
    }

    #[test]
    fn parser_is_total_on_garbage() {
        let out = parser().parse("<<<\u{0000}broken\u{FFFD}>>>", true);
        assert!(out.proposed_mutations.is_empty());
        assert!(!out.notes.is_empty());
    }

    #[test]
    fn structured_json_parses_strictly() {
        let raw = r#"{"dialogue": "Stand down.", "mutations": [{"op": "append_episodic", "content": "player yielded", "significance": 0.6}]}"#;
        let out = parser().parse(raw, true);
        assert_eq!(out.mode, ParseMode::Structured);
        assert_eq!(out.dialogue_text, "Stand down.");
        assert_eq!(out.proposed_mutations.len(), 1);
        assert_eq!(
            out.proposed_mutations[0].claimed_authority,
            Authority::GeneratorDerived
        );
    }

    #[test]
    fn prose_wrapped_json_repairs() {
        let raw = "Sure! Here is the response:\n```json\n{\"dialogue\": \"As you wish.\"}\n```";
        let out = parser().parse(raw, false);
        assert_eq!(out.mode, ParseMode::StructuredRepaired);
        assert_eq!(out.dialogue_text, "As you wish.");
    }

    #[test]
    fn pattern_mode_for_plain_text() {
        let raw = "Halt!   Who goes\nthere?</s>";
        let out = parser().parse(raw, false);
        assert_eq!(out.mode, ParseMode::Pattern);
        assert_eq!(out.dialogue_text, "Halt! Who goes there?");
    }

    #[test]
    fn intent_mutations_route_to_world_intents() {
        let raw = r#"{"mutations": [{"op": "emit_world_intent", "intent_type": "Open_Door", "target": "North Gate"}]}"#;
        let out = parser().parse(raw, true);
        assert!(out.proposed_mutations.is_empty());
        assert_eq!(out.world_intents.len(), 1);
        assert_eq!(out.world_intents[0].intent_type, "open_door");
        assert_eq!(out.world_intents[0].target, "north-gate");
    }

    #[test]
    fn equivalent_outputs_parse_identically() {
        // Same semantics, different list order and quoting.
        let a = parser().parse(
            "DIALOGUE: fine.\nMUTATION: episodic.append \"saw a fox\" significance=0.5\nMUTATION: belief.weather := \"storm coming\" confidence=+0.1",
            false,
        );
        let b = parser().parse(
            "MUTATION: belief.Weather := \"storm coming\" confidence=+0.1\nDIALOGUE: fine.\nMUTATION: episodic.append \"saw a fox\" significance=0.50",
            false,
        );
        assert_eq!(a, b);
        assert_eq!(a.output_hash(), b.output_hash());
    }

    #[test]
    fn serialize_round_trip_is_fixpoint() {
        let raw = r#"{
            "dialogue": "So be it.",
            "mutations": [
                {"op": "append_episodic", "content": "the player said \"please\"", "significance": 0.123456},
                {"op": "transform_relationship", "subject": "guard", "target": "player", "delta": 0.05},
                {"op": "write_canonical", "subject": "tower-destroyed", "value": false}
            ],
            "intents": [{"intent_type": "open_door", "target": "north-gate", "payload": {"speed": 2}}],
            "function_calls": [{"name": "wave", "args": null}]
        }"#;
        let once = parser().parse(raw, true);
        let twice = parser().parse(&once.serialize(), false);
        assert_eq!(once, twice);

        let thrice = parser().parse(&twice.serialize(), false);
        assert_eq!(twice, thrice);
    }

    #[test]
    fn numeric_fields_quantized() {
        let out = parser().parse(
            r#"{"mutations": [{"op": "append_episodic", "content": "x", "significance": 0.123456789}]}"#,
            true,
        );
        match &out.proposed_mutations[0].request {
            MutationRequest::AppendEpisodic { significance, .. } => {
                assert_eq!(*significance, 0.1235);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
