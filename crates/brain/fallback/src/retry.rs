use llamabrain_expectancy::{Constraint, ConstraintKind, ConstraintSet, Provenance};
use llamabrain_generator::GeneratorError;
use llamabrain_types::derive_attempt_seed;
use llamabrain_validation::{FailureCode, ValidationReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Retry bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Why the pipeline gave up on generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    AttemptsExhausted,
    GeneratorTerminal(String),
    BudgetExhausted,
}

/// Next step after an attempt.
#[derive(Clone, Debug)]
pub enum RetryDecision {
    Commit,
    Retry {
        /// 0-based index of the attempt about to run.
        attempt: u32,
        seed: u64,
        constraints: ConstraintSet,
    },
    Fallback(FallbackReason),
}

/// Pure decision logic for the retry state machine.
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Decision after validation of attempt `attempt` (0-based).
    pub fn after_validation(
        &self,
        attempt: u32,
        base_seed: u64,
        constraints: &ConstraintSet,
        report: &ValidationReport,
    ) -> RetryDecision {
        if report.passed {
            return RetryDecision::Commit;
        }
        let next = attempt + 1;
        if next >= self.config.max_attempts {
            info!(attempt, "validation failed on final attempt; falling back");
            return RetryDecision::Fallback(FallbackReason::AttemptsExhausted);
        }
        let escalated = escalate_constraints(constraints, report);
        debug!(
            attempt = next,
            constraints = escalated.len(),
            "retrying with escalated constraints"
        );
        RetryDecision::Retry {
            attempt: next,
            seed: derive_attempt_seed(base_seed, next),
            constraints: escalated,
        }
    }

    /// Decision after a generator failure on attempt `attempt` (0-based).
    pub fn after_generator_error(
        &self,
        attempt: u32,
        base_seed: u64,
        constraints: &ConstraintSet,
        error: &GeneratorError,
    ) -> RetryDecision {
        if !error.is_retryable() {
            info!(error = %error, "terminal generator error; falling back");
            return RetryDecision::Fallback(FallbackReason::GeneratorTerminal(error.to_string()));
        }
        let next = attempt + 1;
        if next >= self.config.max_attempts {
            info!(attempt, error = %error, "generator failed on final attempt; falling back");
            return RetryDecision::Fallback(FallbackReason::AttemptsExhausted);
        }
        RetryDecision::Retry {
            attempt: next,
            seed: derive_attempt_seed(base_seed, next),
            constraints: constraints.clone(),
        }
    }
}

/// Turn the report's blocking constraint failures into stricter copies:
/// same predicate, escalated severity, an imperative injection. The
/// constraint-set dedup rule (higher severity wins, in place) swaps them in.
fn escalate_constraints(constraints: &ConstraintSet, report: &ValidationReport) -> ConstraintSet {
    let mut extra: Vec<Constraint> = Vec::new();
    for failure in report.blocking_constraint_failures() {
        let Some(original) = &failure.constraint else {
            continue;
        };
        // A predicate nobody registered cannot be satisfied by rewording.
        if matches!(failure.code, FailureCode::UnknownPredicate { .. }) {
            continue;
        }
        let injection = match original.kind {
            ConstraintKind::Requirement => format!("You must: {}", original.prompt_injection),
            ConstraintKind::Prohibition => {
                format!("You must not: {}", original.prompt_injection)
            }
            ConstraintKind::Permission => continue,
        };
        extra.push(
            Constraint::new(
                original.kind,
                original.severity.escalated(),
                injection,
                original.predicate.clone(),
                Provenance::new("retry-escalation", "retry"),
            )
            .with_world_keys(original.world_state_keys.iter().cloned()),
        );
    }
    constraints.escalated(extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamabrain_expectancy::{PredicateId, Severity};
    use llamabrain_validation::{ItemRef, ValidationFailure};

    fn requirement(predicate: &str, severity: Severity) -> Constraint {
        Constraint::new(
            ConstraintKind::Requirement,
            severity,
            "Address the player, Ada, by name.",
            PredicateId::new(predicate),
            Provenance::new("mention-player", "player_utterance"),
        )
    }

    fn failed_report(constraint: &Constraint) -> ValidationReport {
        ValidationReport {
            passed: false,
            approved_mutations: vec![],
            approved_intents: vec![],
            failures: vec![ValidationFailure {
                code: FailureCode::RequirementUnmet {
                    predicate: constraint.predicate.clone(),
                },
                severity: constraint.severity,
                item: ItemRef::Output,
                message: "unmet".into(),
                constraint: Some(constraint.clone()),
            }],
        }
    }

    #[test]
    fn pass_commits() {
        let policy = RetryPolicy::default();
        let report = ValidationReport::clean_pass(vec![], vec![]);
        assert!(matches!(
            policy.after_validation(0, 7, &ConstraintSet::new(), &report),
            RetryDecision::Commit
        ));
    }

    #[test]
    fn failure_escalates_and_reseeds() {
        let policy = RetryPolicy::default();
        let constraint = requirement("dialogue-mentions-player", Severity::Hard);
        let constraints: ConstraintSet = [constraint.clone()].into_iter().collect();
        let report = failed_report(&constraint);

        match policy.after_validation(0, 7, &constraints, &report) {
            RetryDecision::Retry {
                attempt,
                seed,
                constraints,
            } => {
                assert_eq!(attempt, 1);
                assert_ne!(seed, 7);
                assert_eq!(seed, derive_attempt_seed(7, 1));
                // Same predicate, escalated severity, imperative injection.
                assert_eq!(constraints.len(), 1);
                let escalated = constraints.iter().next().unwrap();
                assert_eq!(escalated.severity, Severity::Critical);
                assert!(escalated.prompt_injection.starts_with("You must:"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn attempts_exhaust_to_fallback() {
        let policy = RetryPolicy::new(RetryConfig { max_attempts: 3 });
        let constraint = requirement("dialogue-mentions-player", Severity::Hard);
        let constraints: ConstraintSet = [constraint.clone()].into_iter().collect();
        let report = failed_report(&constraint);

        assert!(matches!(
            policy.after_validation(2, 7, &constraints, &report),
            RetryDecision::Fallback(FallbackReason::AttemptsExhausted)
        ));
    }

    #[test]
    fn terminal_generator_error_skips_remaining_attempts() {
        let policy = RetryPolicy::default();
        let decision = policy.after_generator_error(
            0,
            7,
            &ConstraintSet::new(),
            &GeneratorError::SchemaRejection("grammar".into()),
        );
        assert!(matches!(
            decision,
            RetryDecision::Fallback(FallbackReason::GeneratorTerminal(_))
        ));
    }

    #[test]
    fn retryable_generator_error_retries_with_same_constraints() {
        let policy = RetryPolicy::default();
        let constraints: ConstraintSet =
            [requirement("p", Severity::Hard)].into_iter().collect();
        match policy.after_generator_error(
            0,
            7,
            &constraints,
            &GeneratorError::Timeout { elapsed_ms: 100 },
        ) {
            RetryDecision::Retry {
                attempt,
                constraints: next,
                ..
            } => {
                assert_eq!(attempt, 1);
                assert_eq!(next.len(), constraints.len());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn timeout_on_final_attempt_falls_back() {
        let policy = RetryPolicy::new(RetryConfig { max_attempts: 3 });
        assert!(matches!(
            policy.after_generator_error(
                2,
                7,
                &ConstraintSet::new(),
                &GeneratorError::Timeout { elapsed_ms: 100 }
            ),
            RetryDecision::Fallback(FallbackReason::AttemptsExhausted)
        ));
    }
}
