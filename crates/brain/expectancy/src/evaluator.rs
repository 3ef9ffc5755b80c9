use std::sync::Arc;

use llamabrain_types::InteractionContext;
use tracing::debug;

use crate::constraint::{Constraint, ConstraintSet};

/// Metadata record for a registered rule.
#[derive(Clone, Debug)]
pub struct RuleMeta {
    pub id: String,
    /// Lower runs earlier. Ties broken by rule id.
    pub priority: i32,
    pub description: String,
}

impl RuleMeta {
    pub fn new(id: impl Into<String>, priority: i32, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority,
            description: description.into(),
        }
    }
}

type RuleFn = Arc<dyn Fn(&InteractionContext) -> Option<Constraint> + Send + Sync>;

/// A pure evaluation function plus its metadata.
#[derive(Clone)]
pub struct ExpectancyRule {
    pub meta: RuleMeta,
    eval: RuleFn,
}

impl ExpectancyRule {
    pub fn new(
        meta: RuleMeta,
        eval: impl Fn(&InteractionContext) -> Option<Constraint> + Send + Sync + 'static,
    ) -> Self {
        Self {
            meta,
            eval: Arc::new(eval),
        }
    }

    pub fn evaluate(&self, ctx: &InteractionContext) -> Option<Constraint> {
        (self.eval)(ctx)
    }
}

impl std::fmt::Debug for ExpectancyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectancyRule").field("meta", &self.meta).finish()
    }
}

/// Table-driven evaluator: iterates registered rules in `(priority, id)`
/// order and folds their emissions into a [`ConstraintSet`]. Pure; no I/O,
/// no suspension.
#[derive(Clone, Debug, Default)]
pub struct ExpectancyEvaluator {
    rules: Vec<ExpectancyRule>,
}

impl ExpectancyEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: ExpectancyRule) {
        self.rules.push(rule);
        self.rules
            .sort_by(|a, b| (a.meta.priority, &a.meta.id).cmp(&(b.meta.priority, &b.meta.id)));
    }

    pub fn with_rule(mut self, rule: ExpectancyRule) -> Self {
        self.register(rule);
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn evaluate(&self, ctx: &InteractionContext) -> ConstraintSet {
        let mut set = ConstraintSet::new();
        for rule in &self.rules {
            if let Some(constraint) = rule.evaluate(ctx) {
                debug!(
                    rule = %rule.meta.id,
                    predicate = %constraint.predicate,
                    severity = ?constraint.severity,
                    "expectancy rule fired"
                );
                set.insert(constraint);
            }
        }
        set
    }
}
