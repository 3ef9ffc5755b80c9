//! The normalization contract. Every field that reaches a [`ParsedOutput`]
//! passes through here, so two textually different but equivalent generator
//! responses produce identical parses.

use unicode_normalization::UnicodeNormalization;

/// Trailing tokens models append that carry no content.
const SENTINELS: &[&str] = &["</s>", "<|im_end|>", "<|eot_id|>"];

/// Strip trailing sentinel tokens and trailing whitespace, repeatedly.
pub fn strip_sentinels(text: &str) -> &str {
    let mut out = text;
    loop {
        let trimmed = out.trim_end();
        let mut stripped = trimmed;
        for sentinel in SENTINELS {
            if let Some(rest) = stripped.strip_suffix(sentinel) {
                stripped = rest;
            }
        }
        if stripped.len() == trimmed.len() && trimmed.len() == out.len() {
            return out;
        }
        out = stripped;
    }
}

/// Dialogue normalization: NFC, trim, collapse internal whitespace runs
/// (newlines included) to single spaces.
pub fn normalize_dialogue(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    nfc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Free-text payload normalization: like dialogue, plus double quotes become
/// single quotes so the canonical wire form can always quote the payload.
pub fn normalize_payload_text(text: &str) -> String {
    normalize_dialogue(text).replace('"', "'")
}

/// Subject keys are single ASCII tokens over `[a-z0-9_-]`: lowercased, with
/// every other character mapped to a dash. The restriction keeps subjects
/// parseable in every wire position (`belief.<subject>`,
/// `relationship.<subject>.<target>`) and makes normalization idempotent.
pub fn normalize_subject(subject: &str) -> String {
    let mapped: String = subject
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if mapped.is_empty() {
        "unnamed".to_string()
    } else {
        mapped
    }
}

/// Function-call names keep their case but are restricted to the wire
/// charset `[A-Za-z0-9_.-]`; anything else maps to a dash.
pub fn normalize_call_name(name: &str) -> String {
    let mapped: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if mapped.is_empty() {
        "unnamed".to_string()
    } else {
        mapped
    }
}

/// Quantize a numeric field to four decimal places. Keeps
/// `parse(serialize(parse(x)))` a fixpoint: the wire form prints four
/// decimals, so parsed numbers must already live on that grid.
pub fn quantize(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Tag list normalization: tokens only, empties dropped.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .flat_map(|t| t.split(','))
        .map(normalize_subject)
        .filter(|t| !t.is_empty())
        .collect()
}
