//! Structured mode: strict JSON against the published reply schema, then a
//! deterministic repair ladder for the usual model damage (prose around the
//! object, code fences, single quotes, trailing commas).

use llamabrain_types::{FunctionCall, MutationRequest, WorldIntent};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Version identifier of the published reply schema.
pub const REPLY_SCHEMA_ID: &str = "llamabrain.reply.v1";

/// The JSON schema handed to schema-capable backends in structured mode.
pub fn reply_schema() -> Value {
    serde_json::json!({
        "$id": REPLY_SCHEMA_ID,
        "type": "object",
        "properties": {
            "dialogue": { "type": "string" },
            "mutations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["op"],
                    "properties": {
                        "op": {
                            "type": "string",
                            "enum": [
                                "append_episodic",
                                "transform_belief",
                                "transform_relationship",
                                "emit_world_intent",
                                "write_canonical"
                            ]
                        }
                    },
                    "additionalProperties": true
                }
            },
            "intents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["intent_type", "target"],
                    "properties": {
                        "intent_type": { "type": "string" },
                        "target": { "type": "string" },
                        "payload": {}
                    },
                    "additionalProperties": false
                }
            },
            "function_calls": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string" },
                        "args": {}
                    },
                    "additionalProperties": false
                }
            }
        },
        "additionalProperties": false
    })
}

/// Deserialization target matching the reply schema.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StructuredReply {
    #[serde(default)]
    pub dialogue: String,
    #[serde(default)]
    pub mutations: Vec<MutationRequest>,
    #[serde(default)]
    pub intents: Vec<WorldIntent>,
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// Outcome of the structured attempt.
pub(crate) enum StructuredAttempt {
    Strict(StructuredReply),
    Repaired(StructuredReply),
    Failed,
}

pub(crate) fn try_structured(raw: &str) -> StructuredAttempt {
    if let Ok(reply) = serde_json::from_str::<StructuredReply>(raw.trim()) {
        return StructuredAttempt::Strict(reply);
    }
    match parse_with_repair::<StructuredReply>(raw) {
        Some(reply) => StructuredAttempt::Repaired(reply),
        None => StructuredAttempt::Failed,
    }
}

/// Try every repair candidate in a fixed order; first success wins.
pub(crate) fn parse_with_repair<T: DeserializeOwned>(raw: &str) -> Option<T> {
    for candidate in repair_candidates(raw) {
        if let Ok(parsed) = serde_json::from_str::<T>(&candidate) {
            return Some(parsed);
        }
    }
    None
}

fn repair_candidates(raw: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    candidates.push(raw.trim().to_string());

    if let Some(fenced) = extract_code_fence(raw) {
        candidates.push(fenced.clone());
        candidates.push(strip_trailing_commas(&fenced));
    }

    if let Some(object) = extract_first_balanced(raw, '{', '}') {
        candidates.push(object.clone());
        candidates.push(object.replace('\'', "\""));
        candidates.push(strip_trailing_commas(&object));
        candidates.push(strip_trailing_commas(&object.replace('\'', "\"")));
    }

    candidates.push(raw.replace('\'', "\""));
    candidates.push(strip_trailing_commas(raw));

    dedupe(candidates)
}

fn dedupe(candidates: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if out.iter().all(|known| known != trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Body of the first ``` fence, tolerating a `json` language tag.
fn extract_code_fence(raw: &str) -> Option<String> {
    let mut sections = raw.split("```");
    let _before = sections.next()?;
    let body = sections.next()?.trim();
    let body = body
        .strip_prefix("json")
        .or_else(|| body.strip_prefix("JSON"))
        .unwrap_or(body)
        .trim();
    if body.starts_with('{') || body.starts_with('[') {
        Some(body.to_string())
    } else {
        None
    }
}

/// First balanced `{...}` (or `[...]`) region, string-aware.
fn extract_first_balanced(raw: &str, open: char, close: char) -> Option<String> {
    let start = raw.find(open)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + idx + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove commas that directly precede a closing brace or bracket.
fn strip_trailing_commas(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if ch == '"' {
            in_string = true;
            out.push(ch);
            i += 1;
            continue;
        }
        if ch == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(ch);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses() {
        let raw = r#"{"dialogue": "Halt!", "mutations": [], "intents": []}"#;
        assert!(matches!(try_structured(raw), StructuredAttempt::Strict(_)));
    }

    #[test]
    fn prose_wrapped_json_repairs() {
        let raw = r#"The guard responds: {"dialogue": "Halt!"} and that is all."#;
        match try_structured(raw) {
            StructuredAttempt::Repaired(reply) => assert_eq!(reply.dialogue, "Halt!"),
            _ => panic!("expected repaired parse"),
        }
    }

    #[test]
    fn code_fence_repairs() {
        let raw = "```json\n{\"dialogue\": \"Halt!\"}\n```";
        assert!(matches!(try_structured(raw), StructuredAttempt::Repaired(_)));
    }

    #[test]
    fn single_quotes_and_trailing_commas_repair() {
        let raw = r#"{'dialogue': 'Halt!', 'mutations': [],}"#;
        match try_structured(raw) {
            StructuredAttempt::Repaired(reply) => assert_eq!(reply.dialogue, "Halt!"),
            _ => panic!("expected repaired parse"),
        }
    }

    #[test]
    fn garbage_fails_cleanly() {
        assert!(matches!(try_structured("<<<broken>>>"), StructuredAttempt::Failed));
    }

    #[test]
    fn mutations_deserialize_through_tagged_enum() {
        let raw = r#"{
            "dialogue": "so be it",
            "mutations": [
                {"op": "append_episodic", "content": "player threatened me", "significance": 0.7},
                {"op": "write_canonical", "subject": "tower-destroyed", "value": false}
            ]
        }"#;
        match try_structured(raw) {
            StructuredAttempt::Strict(reply) => {
                assert_eq!(reply.mutations.len(), 2);
                assert!(matches!(
                    reply.mutations[1],
                    MutationRequest::WriteCanonical { .. }
                ));
            }
            _ => panic!("expected strict parse"),
        }
    }

    #[test]
    fn schema_carries_id() {
        assert_eq!(reply_schema()["$id"], REPLY_SCHEMA_ID);
    }

    #[test]
    fn balanced_extraction_ignores_braces_in_strings() {
        let raw = r#"note {"dialogue": "brace } inside"} tail"#;
        let extracted = extract_first_balanced(raw, '{', '}').unwrap();
        assert!(extracted.ends_with('}'));
        assert!(extracted.contains("brace } inside"));
    }
}
