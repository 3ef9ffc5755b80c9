//! Pattern mode: marker-line extraction for free-form generator output.
//!
//! Documented wire forms (case-insensitive markers, one per line):
//!
//! ```text
//! DIALOGUE: <text>
//! MUTATION: episodic.append "<content>" significance=<f> tags=<a,b>
//! MUTATION: belief.<subject> := "<statement>" confidence=<+f>
//! MUTATION: relationship.<subject>.<target> += <f>
//! MUTATION: canonical.<subject> := <json>
//! MUTATION: intent.<type> target=<t> payload=<json>
//! INTENT: <type> target=<t> payload=<json>
//! FUNCTION_CALL: <name> <json-args>
//! ```
//!
//! Lines with no marker are dialogue. Unparseable marker bodies become parse
//! notes, never errors; the parser is total.

use llamabrain_types::{FunctionCall, MutationRequest, WorldIntent};
use regex::Regex;
use serde_json::Value;

/// Default significance for episodic appends that do not state one.
const DEFAULT_EPISODIC_SIGNIFICANCE: f64 = 0.5;

pub(crate) struct PatternExtraction {
    pub dialogue: String,
    pub mutations: Vec<MutationRequest>,
    pub intents: Vec<WorldIntent>,
    pub function_calls: Vec<FunctionCall>,
    pub notes: Vec<String>,
}

pub(crate) struct PatternParser {
    marker: Regex,
    episodic_quoted: Regex,
    episodic_bare: Regex,
    belief: Regex,
    relationship: Regex,
    canonical: Regex,
    intent_mutation: Regex,
    intent: Regex,
    function_call: Regex,
}

impl PatternParser {
    pub fn new() -> Self {
        // The patterns are fixed strings; compilation cannot fail, but the
        // constructor stays infallible by construction rather than unwraps
        // scattered at use sites.
        Self {
            marker: compile(r"(?i)^\s*(DIALOGUE|MUTATION|INTENT|FUNCTION_CALL)\s*:\s*(.*)$"),
            episodic_quoted: compile(
                r#"(?i)^episodic(?:\.append)?\s+"(?P<content>[^"]*)"\s*(?:significance\s*=\s*(?P<sig>[+-]?[0-9]*\.?[0-9]+))?\s*(?:tags\s*=\s*(?P<tags>\S+))?\s*$"#,
            ),
            episodic_bare: compile(
                r"(?i)^episodic(?:\.append)?\s+(?P<content>.+?)(?:\s+significance\s*=\s*(?P<sig>[+-]?[0-9]*\.?[0-9]+))?(?:\s+tags\s*=\s*(?P<tags>\S+))?\s*$",
            ),
            belief: compile(
                r#"(?i)^belief\.(?P<subject>[^\s:=]+)\s*:?=\s*"?(?P<statement>[^"]*?)"?\s*(?:confidence\s*=\s*(?P<delta>[+-]?[0-9]*\.?[0-9]+))?\s*$"#,
            ),
            relationship: compile(
                r"(?i)^relationship\.(?P<subject>[^\s.]+)\.(?P<target>[^\s.]+)\s*\+=\s*(?P<delta>[+-]?[0-9]*\.?[0-9]+)\s*$",
            ),
            canonical: compile(r"(?i)^canonical\.(?P<subject>[^\s:=]+)\s*:?=\s*(?P<value>.+)$"),
            intent_mutation: compile(
                r"(?i)^intent\.(?P<type>\S+)\s+target\s*=\s*(?P<target>\S+)(?:\s+payload\s*=\s*(?P<payload>.+))?\s*$",
            ),
            intent: compile(
                r"(?i)^(?P<type>[\w.\-]+)\s+target\s*=\s*(?P<target>\S+)(?:\s+payload\s*=\s*(?P<payload>.+))?\s*$",
            ),
            function_call: compile(
                r"(?i)^(?P<name>[\w.\-]+)\s*(?:\(\s*(?P<parens>.*?)\s*\)|\s+(?P<bare>\S.*))?\s*$",
            ),
        }
    }

    pub fn extract(&self, text: &str) -> PatternExtraction {
        let mut dialogue_parts: Vec<String> = Vec::new();
        let mut mutations = Vec::new();
        let mut intents = Vec::new();
        let mut function_calls = Vec::new();
        let mut notes = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(caps) = self.marker.captures(line) else {
                dialogue_parts.push(line.to_string());
                continue;
            };
            let marker = caps.get(1).map(|m| m.as_str().to_uppercase()).unwrap_or_default();
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

            match marker.as_str() {
                "DIALOGUE" => dialogue_parts.push(body.to_string()),
                "MUTATION" => match self.parse_mutation(body) {
                    Some(MutationRequest::EmitWorldIntent(intent)) => intents.push(intent),
                    Some(mutation) => mutations.push(mutation),
                    None => notes.push(format!("unparseable mutation: {body}")),
                },
                "INTENT" => match self.parse_intent(body) {
                    Some(intent) => intents.push(intent),
                    None => notes.push(format!("unparseable intent: {body}")),
                },
                "FUNCTION_CALL" => match self.parse_function_call(body) {
                    Some(call) => function_calls.push(call),
                    None => notes.push(format!("unparseable function call: {body}")),
                },
                _ => dialogue_parts.push(line.to_string()),
            }
        }

        PatternExtraction {
            dialogue: dialogue_parts.join(" "),
            mutations,
            intents,
            function_calls,
            notes,
        }
    }

    fn parse_mutation(&self, body: &str) -> Option<MutationRequest> {
        if let Some(caps) = self
            .episodic_quoted
            .captures(body)
            .or_else(|| self.episodic_bare.captures(body))
        {
            let content = caps.name("content")?.as_str().to_string();
            let significance = caps
                .name("sig")
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(DEFAULT_EPISODIC_SIGNIFICANCE);
            let tags = caps
                .name("tags")
                .map(|m| m.as_str().split(',').map(str::to_string).collect())
                .unwrap_or_default();
            return Some(MutationRequest::AppendEpisodic {
                content,
                significance,
                tags,
            });
        }

        if let Some(caps) = self.belief.captures(body) {
            return Some(MutationRequest::TransformBelief {
                subject: caps.name("subject")?.as_str().to_string(),
                statement: caps.name("statement")?.as_str().to_string(),
                confidence_delta: caps
                    .name("delta")
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .unwrap_or(0.0),
            });
        }

        if let Some(caps) = self.relationship.captures(body) {
            return Some(MutationRequest::TransformRelationship {
                subject: caps.name("subject")?.as_str().to_string(),
                target: caps.name("target")?.as_str().to_string(),
                delta: caps.name("delta")?.as_str().parse::<f64>().ok()?,
            });
        }

        if let Some(caps) = self.canonical.captures(body) {
            let raw_value = caps.name("value")?.as_str().trim();
            let value = serde_json::from_str::<Value>(raw_value)
                .unwrap_or_else(|_| Value::String(raw_value.to_string()));
            return Some(MutationRequest::WriteCanonical {
                subject: caps.name("subject")?.as_str().to_string(),
                value,
            });
        }

        if let Some(caps) = self.intent_mutation.captures(body) {
            return Some(MutationRequest::EmitWorldIntent(WorldIntent {
                intent_type: caps.name("type")?.as_str().to_string(),
                target: caps.name("target")?.as_str().to_string(),
                payload: parse_payload(caps.name("payload").map(|m| m.as_str())),
            }));
        }

        None
    }

    fn parse_intent(&self, body: &str) -> Option<WorldIntent> {
        let caps = self.intent.captures(body)?;
        Some(WorldIntent {
            intent_type: caps.name("type")?.as_str().to_string(),
            target: caps.name("target")?.as_str().to_string(),
            payload: parse_payload(caps.name("payload").map(|m| m.as_str())),
        })
    }

    fn parse_function_call(&self, body: &str) -> Option<FunctionCall> {
        let caps = self.function_call.captures(body)?;
        let args_text = caps
            .name("parens")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str());
        Some(FunctionCall {
            name: caps.name("name")?.as_str().to_string(),
            args: parse_payload(args_text),
        })
    }
}

fn parse_payload(raw: Option<&str>) -> Value {
    match raw {
        Some(text) => serde_json::from_str(text.trim()).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Fixed patterns; reachable only by a typo caught in tests.
        Err(_) => Regex::new(r"$^").unwrap_or_else(|_| unreachable!()),
    }
}
