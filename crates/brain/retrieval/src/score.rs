use std::collections::BTreeSet;

use llamabrain_expectancy::ConstraintSet;
use llamabrain_types::InteractionContext;

/// Lowercase alphanumeric tokens of a text. The relevance measure is defined
/// over these tokens and nothing else.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Query signals extracted once per interaction: the player input tokens and
/// the trigger tags of every active constraint.
#[derive(Clone, Debug)]
pub struct RetrievalSignals {
    query_tokens: BTreeSet<String>,
}

impl RetrievalSignals {
    pub fn from_context(ctx: &InteractionContext, constraints: &ConstraintSet) -> Self {
        let mut query_tokens: BTreeSet<String> =
            tokenize(&ctx.player_input).into_iter().collect();
        for tag in constraints.trigger_tags() {
            query_tokens.extend(tokenize(tag));
        }
        for tag in &ctx.custom_tags {
            query_tokens.extend(tokenize(tag));
        }
        Self { query_tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.query_tokens.is_empty()
    }

    /// Fraction of query tokens present in `text` (plus `tags`), in [0,1].
    pub fn overlap(&self, text: &str, tags: &[String]) -> f64 {
        if self.query_tokens.is_empty() {
            return 0.0;
        }
        let mut candidate: BTreeSet<String> = tokenize(text).into_iter().collect();
        for tag in tags {
            candidate.extend(tokenize(tag));
        }
        let matched = self
            .query_tokens
            .iter()
            .filter(|t| candidate.contains(*t))
            .count();
        matched as f64 / self.query_tokens.len() as f64
    }
}

/// Convenience wrapper for one-off relevance checks.
pub fn relevance_overlap(query: &str, candidate: &str) -> f64 {
    let query_tokens: BTreeSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens: BTreeSet<String> = tokenize(candidate).into_iter().collect();
    let matched = query_tokens
        .iter()
        .filter(|t| candidate_tokens.contains(*t))
        .count();
    matched as f64 / query_tokens.len() as f64
}
