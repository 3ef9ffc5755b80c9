use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What a constraint demands of the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// The output must NOT match the predicate.
    Prohibition,
    /// The output MUST match the predicate.
    Requirement,
    /// Explicitly allowed behavior; prompt guidance only, never validated.
    Permission,
}

/// How strongly a violation counts against the output.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recorded, never rejects.
    Soft,
    /// Fails the report; the retry policy escalates.
    Hard,
    /// Invalidates the whole output regardless of other passes.
    Critical,
}

impl Severity {
    /// One step up the ladder; retry escalation replaces a violated
    /// constraint with a stricter copy.
    pub fn escalated(&self) -> Severity {
        match self {
            Severity::Soft => Severity::Hard,
            Severity::Hard | Severity::Critical => Severity::Critical,
        }
    }
}

/// Identifier of a validation predicate registered with the gate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PredicateId(pub String);

impl PredicateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PredicateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a constraint came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub rule_id: String,
    pub trigger_tag: String,
}

impl Provenance {
    pub fn new(rule_id: impl Into<String>, trigger_tag: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            trigger_tag: trigger_tag.into(),
        }
    }
}

/// A declarative rule emitted by the expectancy layer. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub severity: Severity,
    /// Natural-language text injected into the assembled prompt.
    pub prompt_injection: String,
    /// Predicate the validation gate executes for this constraint.
    pub predicate: PredicateId,
    /// Contribution to the world-state key filter used by retrieval.
    #[serde(default)]
    pub world_state_keys: Vec<String>,
    pub provenance: Provenance,
}

impl Constraint {
    pub fn new(
        kind: ConstraintKind,
        severity: Severity,
        prompt_injection: impl Into<String>,
        predicate: PredicateId,
        provenance: Provenance,
    ) -> Self {
        Self {
            kind,
            severity,
            prompt_injection: prompt_injection.into(),
            predicate,
            world_state_keys: Vec::new(),
            provenance,
        }
    }

    pub fn with_world_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.world_state_keys = keys.into_iter().collect();
        self
    }
}

/// An ordered sequence of constraints, de-duplicated by `(kind, predicate)`.
///
/// On a duplicate key the higher-severity constraint wins; at equal severity
/// the earlier one stays. The winner keeps the original position so ordering
/// is independent of which rule fired first with what severity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    entries: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, constraint: Constraint) {
        let key = (constraint.kind, constraint.predicate.clone());
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|c| (c.kind, c.predicate.clone()) == key)
        {
            if constraint.severity > existing.severity {
                *existing = constraint;
            }
            return;
        }
        self.entries.push(constraint);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the retry-escalated set: this set plus additional hard
    /// requirements, de-duplicated under the same policy.
    pub fn escalated(&self, extra: impl IntoIterator<Item = Constraint>) -> ConstraintSet {
        let mut next = self.clone();
        for constraint in extra {
            next.insert(constraint);
        }
        next
    }

    /// Union of the explicit world-state key lists carried by constraints.
    /// `None` means no constraint restricts world state: include everything.
    pub fn world_key_filter(&self) -> Option<BTreeSet<String>> {
        let keys: BTreeSet<String> = self
            .entries
            .iter()
            .flat_map(|c| c.world_state_keys.iter().cloned())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(keys)
        }
    }

    /// Trigger tags of all constraints, used as relevance signals.
    pub fn trigger_tags(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|c| c.provenance.trigger_tag.as_str())
            .collect()
    }
}

impl FromIterator<Constraint> for ConstraintSet {
    fn from_iter<T: IntoIterator<Item = Constraint>>(iter: T) -> Self {
        let mut set = ConstraintSet::new();
        for constraint in iter {
            set.insert(constraint);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(
        kind: ConstraintKind,
        severity: Severity,
        predicate: &str,
        rule: &str,
    ) -> Constraint {
        Constraint::new(
            kind,
            severity,
            format!("injection for {predicate}"),
            PredicateId::new(predicate),
            Provenance::new(rule, "test"),
        )
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Soft < Severity::Hard);
        assert!(Severity::Hard < Severity::Critical);
    }

    #[test]
    fn duplicate_key_keeps_higher_severity_in_place() {
        let mut set = ConstraintSet::new();
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Soft,
            "mention-player",
            "rule-a",
        ));
        set.insert(constraint(
            ConstraintKind::Prohibition,
            Severity::Hard,
            "no-lore-spoilers",
            "rule-b",
        ));
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Critical,
            "mention-player",
            "rule-c",
        ));

        assert_eq!(set.len(), 2);
        let first = set.iter().next().unwrap();
        assert_eq!(first.severity, Severity::Critical);
        assert_eq!(first.provenance.rule_id, "rule-c");
    }

    #[test]
    fn equal_severity_first_wins() {
        let mut set = ConstraintSet::new();
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Hard,
            "mention-player",
            "rule-a",
        ));
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Hard,
            "mention-player",
            "rule-b",
        ));

        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().provenance.rule_id, "rule-a");
    }

    #[test]
    fn same_predicate_different_kind_both_kept() {
        let mut set = ConstraintSet::new();
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Hard,
            "topic",
            "rule-a",
        ));
        set.insert(constraint(
            ConstraintKind::Prohibition,
            Severity::Hard,
            "topic",
            "rule-b",
        ));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn world_key_filter_unions() {
        let mut set = ConstraintSet::new();
        set.insert(
            constraint(ConstraintKind::Permission, Severity::Soft, "a", "rule-a")
                .with_world_keys(["gate-open".to_string()]),
        );
        set.insert(
            constraint(ConstraintKind::Permission, Severity::Soft, "b", "rule-b")
                .with_world_keys(["gate-open".to_string(), "weather".to_string()]),
        );

        let keys = set.world_key_filter().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("weather"));
    }

    #[test]
    fn no_keys_means_no_filter() {
        let mut set = ConstraintSet::new();
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Hard,
            "a",
            "rule-a",
        ));
        assert!(set.world_key_filter().is_none());
    }

    #[test]
    fn escalated_does_not_mutate_original() {
        let mut set = ConstraintSet::new();
        set.insert(constraint(
            ConstraintKind::Requirement,
            Severity::Hard,
            "a",
            "rule-a",
        ));
        let escalated = set.escalated([constraint(
            ConstraintKind::Requirement,
            Severity::Hard,
            "b",
            "retry",
        )]);
        assert_eq!(set.len(), 1);
        assert_eq!(escalated.len(), 2);
    }
}
