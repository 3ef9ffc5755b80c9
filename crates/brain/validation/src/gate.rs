use std::collections::BTreeSet;

use llamabrain_expectancy::{ConstraintKind, Severity};
use llamabrain_memory::{ContradictionPolicy, MemoryContent};
use llamabrain_parser::ParsedOutput;
use llamabrain_retrieval::StateSnapshot;
use llamabrain_types::{Authority, MutationRequest};
use serde_json::Value;
use tracing::{debug, warn};

use crate::predicates::PredicateRegistry;
use crate::report::{FailureCode, ItemRef, ValidationFailure, ValidationReport};

/// Gate policy.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GateConfig {
    /// Highest authority the pipeline grants to generator-derived mutations.
    pub granted_authority: Authority,
    /// Belief-contradiction handling; `Flag` records, `Reject` drops the item.
    pub contradiction_policy: ContradictionPolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            granted_authority: Authority::GeneratorDerived,
            contradiction_policy: ContradictionPolicy::Flag,
        }
    }
}

/// The five-layer gate. Layers run in fixed order; every layer records all
/// of its findings before the next one runs.
pub struct ValidationGate {
    registry: PredicateRegistry,
    intent_whitelist: BTreeSet<String>,
    config: GateConfig,
}

impl ValidationGate {
    pub fn new(registry: PredicateRegistry, config: GateConfig) -> Self {
        Self {
            registry,
            intent_whitelist: BTreeSet::new(),
            config,
        }
    }

    pub fn with_intent_whitelist(mut self, intents: impl IntoIterator<Item = String>) -> Self {
        self.intent_whitelist = intents.into_iter().collect();
        self
    }

    pub fn register_intent_type(&mut self, intent_type: impl Into<String>) {
        self.intent_whitelist.insert(intent_type.into());
    }

    /// Decide which parsed elements may mutate state. Pure: identical
    /// `(output, snapshot)` always produce an identical report.
    pub fn validate(&self, output: &ParsedOutput, snapshot: &StateSnapshot) -> ValidationReport {
        let mut failures: Vec<ValidationFailure> = Vec::new();
        let mut rejected_mutations: BTreeSet<usize> = BTreeSet::new();
        let mut rejected_intents: BTreeSet<usize> = BTreeSet::new();

        self.check_structural(output, &mut failures, &mut rejected_mutations, &mut rejected_intents);
        self.check_constraints(output, snapshot, &mut failures);
        self.check_canonical(output, snapshot, &mut failures, &mut rejected_mutations);
        self.check_authority(output, &mut failures, &mut rejected_mutations);
        self.check_intents(output, &mut failures, &mut rejected_intents);

        let critical = failures.iter().any(|f| f.severity == Severity::Critical);
        let hard_constraint = failures.iter().any(|f| {
            f.severity >= Severity::Hard
                && matches!(
                    f.code,
                    FailureCode::RequirementUnmet { .. }
                        | FailureCode::ProhibitionViolated { .. }
                        | FailureCode::UnknownPredicate { .. }
                )
        });
        let passed = !critical && !hard_constraint;

        let (approved_mutations, approved_intents) = if critical {
            (Vec::new(), Vec::new())
        } else {
            (
                output
                    .proposed_mutations
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !rejected_mutations.contains(i))
                    .map(|(_, m)| m.clone())
                    .collect(),
                output
                    .world_intents
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !rejected_intents.contains(i))
                    .map(|(_, intent)| intent.clone())
                    .collect(),
            )
        };

        if !failures.is_empty() {
            warn!(
                failures = failures.len(),
                passed,
                "validation recorded failures"
            );
        } else {
            debug!("validation clean pass");
        }

        ValidationReport {
            passed,
            approved_mutations,
            approved_intents,
            failures,
        }
    }

    /// Layer 1: required fields present, numeric enums in range.
    fn check_structural(
        &self,
        output: &ParsedOutput,
        failures: &mut Vec<ValidationFailure>,
        rejected_mutations: &mut BTreeSet<usize>,
        rejected_intents: &mut BTreeSet<usize>,
    ) {
        for (index, proposed) in output.proposed_mutations.iter().enumerate() {
            let item = ItemRef::Mutation(index);
            match &proposed.request {
                MutationRequest::AppendEpisodic {
                    content,
                    significance,
                    ..
                } => {
                    if content.is_empty() {
                        rejected_mutations.insert(index);
                        failures.push(structural_missing("content", item));
                    }
                    if !(0.0..=1.0).contains(significance) {
                        rejected_mutations.insert(index);
                        failures.push(structural_range("significance", *significance, item));
                    }
                }
                MutationRequest::TransformBelief {
                    subject,
                    statement,
                    confidence_delta,
                } => {
                    if subject.is_empty() {
                        rejected_mutations.insert(index);
                        failures.push(structural_missing("subject", item));
                    }
                    if statement.is_empty() {
                        rejected_mutations.insert(index);
                        failures.push(structural_missing("statement", item));
                    }
                    if !(-1.0..=1.0).contains(confidence_delta) {
                        rejected_mutations.insert(index);
                        failures.push(structural_range(
                            "confidence_delta",
                            *confidence_delta,
                            item,
                        ));
                    }
                }
                MutationRequest::TransformRelationship { subject, target, delta } => {
                    if subject.is_empty() || target.is_empty() {
                        rejected_mutations.insert(index);
                        failures.push(structural_missing("subject/target", item));
                    }
                    if !(-1.0..=1.0).contains(delta) {
                        rejected_mutations.insert(index);
                        failures.push(structural_range("delta", *delta, item));
                    }
                }
                MutationRequest::EmitWorldIntent(intent) => {
                    if intent.intent_type.is_empty() {
                        rejected_mutations.insert(index);
                        failures.push(structural_missing("intent_type", item));
                    }
                }
                MutationRequest::WriteCanonical { subject, .. } => {
                    if subject.is_empty() {
                        rejected_mutations.insert(index);
                        failures.push(structural_missing("subject", item));
                    }
                }
            }
        }

        for (index, intent) in output.world_intents.iter().enumerate() {
            if intent.intent_type.is_empty() || intent.target.is_empty() {
                rejected_intents.insert(index);
                failures.push(structural_missing(
                    "intent_type/target",
                    ItemRef::Intent(index),
                ));
            }
        }
    }

    /// Layer 2: every active Requirement must hold, every Prohibition must
    /// not. Predicates run against the snapshot; Permissions are skipped.
    fn check_constraints(
        &self,
        output: &ParsedOutput,
        snapshot: &StateSnapshot,
        failures: &mut Vec<ValidationFailure>,
    ) {
        for constraint in snapshot.constraints.iter() {
            let verdict = match constraint.kind {
                ConstraintKind::Permission => continue,
                _ => self.registry.evaluate(&constraint.predicate, snapshot, output),
            };
            match (constraint.kind, verdict) {
                (_, None) => failures.push(ValidationFailure {
                    code: FailureCode::UnknownPredicate {
                        predicate: constraint.predicate.clone(),
                    },
                    severity: constraint.severity,
                    item: ItemRef::Output,
                    message: format!("no predicate registered for {}", constraint.predicate),
                    constraint: Some(constraint.clone()),
                }),
                (ConstraintKind::Requirement, Some(false)) => failures.push(ValidationFailure {
                    code: FailureCode::RequirementUnmet {
                        predicate: constraint.predicate.clone(),
                    },
                    severity: constraint.severity,
                    item: ItemRef::Output,
                    message: format!("requirement {} not satisfied", constraint.predicate),
                    constraint: Some(constraint.clone()),
                }),
                (ConstraintKind::Prohibition, Some(true)) => failures.push(ValidationFailure {
                    code: FailureCode::ProhibitionViolated {
                        predicate: constraint.predicate.clone(),
                    },
                    severity: constraint.severity,
                    item: ItemRef::Output,
                    message: format!("prohibition {} violated", constraint.predicate),
                    constraint: Some(constraint.clone()),
                }),
                _ => {}
            }
        }
    }

    /// Layer 3: nothing writes to the canonical store, and beliefs that
    /// directly negate a canonical fact are flagged (or rejected, by policy).
    fn check_canonical(
        &self,
        output: &ParsedOutput,
        snapshot: &StateSnapshot,
        failures: &mut Vec<ValidationFailure>,
        rejected_mutations: &mut BTreeSet<usize>,
    ) {
        for (index, proposed) in output.proposed_mutations.iter().enumerate() {
            match &proposed.request {
                MutationRequest::WriteCanonical { subject, .. } => {
                    rejected_mutations.insert(index);
                    failures.push(ValidationFailure {
                        code: FailureCode::CanonicalFactProtected {
                            subject: subject.clone(),
                        },
                        severity: Severity::Hard,
                        item: ItemRef::Mutation(index),
                        message: format!("canonical fact {subject:?} is load-time only"),
                        constraint: None,
                    });
                }
                MutationRequest::TransformBelief { subject, statement, .. } => {
                    let Some(value) = snapshot.canonical_value(subject) else {
                        continue;
                    };
                    if statement != &canonical_value_text(value) {
                        let severity = match self.config.contradiction_policy {
                            ContradictionPolicy::Flag => Severity::Soft,
                            ContradictionPolicy::Reject => Severity::Hard,
                        };
                        if self.config.contradiction_policy == ContradictionPolicy::Reject {
                            rejected_mutations.insert(index);
                        }
                        failures.push(ValidationFailure {
                            code: FailureCode::CanonicalContradiction {
                                subject: subject.clone(),
                            },
                            severity,
                            item: ItemRef::Mutation(index),
                            message: format!("belief on {subject:?} contradicts canon"),
                            constraint: None,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    /// Layer 4: claimed authority must not exceed the granted tier.
    fn check_authority(
        &self,
        output: &ParsedOutput,
        failures: &mut Vec<ValidationFailure>,
        rejected_mutations: &mut BTreeSet<usize>,
    ) {
        for (index, proposed) in output.proposed_mutations.iter().enumerate() {
            if proposed.claimed_authority > self.config.granted_authority {
                rejected_mutations.insert(index);
                failures.push(ValidationFailure {
                    code: FailureCode::AuthorityExceeded {
                        claimed: proposed.claimed_authority,
                        granted: self.config.granted_authority,
                    },
                    severity: Severity::Hard,
                    item: ItemRef::Mutation(index),
                    message: format!(
                        "claimed {} exceeds granted {}",
                        proposed.claimed_authority, self.config.granted_authority
                    ),
                    constraint: None,
                });
            }
        }
    }

    /// Layer 5: world intents must carry registered types.
    fn check_intents(
        &self,
        output: &ParsedOutput,
        failures: &mut Vec<ValidationFailure>,
        rejected_intents: &mut BTreeSet<usize>,
    ) {
        for (index, intent) in output.world_intents.iter().enumerate() {
            if !self.intent_whitelist.contains(&intent.intent_type) {
                rejected_intents.insert(index);
                failures.push(ValidationFailure {
                    code: FailureCode::UnknownIntentType {
                        intent_type: intent.intent_type.clone(),
                    },
                    severity: Severity::Hard,
                    item: ItemRef::Intent(index),
                    message: format!("intent type {:?} is not registered", intent.intent_type),
                    constraint: None,
                });
            }
        }
    }
}

fn structural_missing(field: &str, item: ItemRef) -> ValidationFailure {
    ValidationFailure {
        code: FailureCode::MissingRequiredField {
            field: field.to_string(),
        },
        severity: Severity::Hard,
        item,
        message: format!("required field {field:?} missing or empty"),
        constraint: None,
    }
}

fn structural_range(field: &str, value: f64, item: ItemRef) -> ValidationFailure {
    ValidationFailure {
        code: FailureCode::ValueOutOfRange {
            field: field.to_string(),
            value,
        },
        severity: Severity::Hard,
        item,
        message: format!("{field} = {value} outside its range"),
        constraint: None,
    }
}

fn canonical_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
