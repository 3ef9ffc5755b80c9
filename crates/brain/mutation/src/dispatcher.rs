use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use llamabrain_types::WorldIntent;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Handler-side failure. Carried into the audit record, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("intent handler failed: {0}")]
pub struct IntentError(pub String);

/// A game-system callback for one intent type.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, intent: &WorldIntent) -> Result<(), IntentError>;
}

/// What happened to one dispatched intent.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered,
    HandlerFailed(String),
    NoHandler,
}

/// One dispatch attempt, recorded for the audit trail.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchRecord {
    pub intent: WorldIntent,
    pub outcome: DispatchOutcome,
}

impl DispatchRecord {
    pub fn failed(&self) -> bool {
        self.outcome != DispatchOutcome::Delivered
    }
}

/// Publishes approved world intents to registered handlers, keyed by
/// `intent_type`. Best-effort: a failing handler is recorded and skipped.
#[derive(Clone, Default)]
pub struct WorldIntentDispatcher {
    handlers: HashMap<String, Arc<dyn IntentHandler>>,
}

impl WorldIntentDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, intent_type: impl Into<String>, handler: Arc<dyn IntentHandler>) {
        self.handlers.insert(intent_type.into(), handler);
    }

    pub fn with_handler(
        mut self,
        intent_type: impl Into<String>,
        handler: Arc<dyn IntentHandler>,
    ) -> Self {
        self.register(intent_type, handler);
        self
    }

    /// Registered types, used to seed the validation gate's whitelist.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn dispatch(&self, intents: &[WorldIntent]) -> Vec<DispatchRecord> {
        let mut records = Vec::with_capacity(intents.len());
        for intent in intents {
            let outcome = match self.handlers.get(&intent.intent_type) {
                Some(handler) => match handler.handle(intent).await {
                    Ok(()) => {
                        debug!(intent_type = %intent.intent_type, target = %intent.target, "intent delivered");
                        DispatchOutcome::Delivered
                    }
                    Err(e) => {
                        warn!(intent_type = %intent.intent_type, error = %e, "intent handler failed");
                        DispatchOutcome::HandlerFailed(e.0)
                    }
                },
                None => {
                    warn!(intent_type = %intent.intent_type, "no handler registered");
                    DispatchOutcome::NoHandler
                }
            };
            records.push(DispatchRecord {
                intent: intent.clone(),
                outcome,
            });
        }
        records
    }
}

impl std::fmt::Debug for WorldIntentDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldIntentDispatcher")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IntentHandler for CountingHandler {
        async fn handle(&self, _intent: &WorldIntent) -> Result<(), IntentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl IntentHandler for FailingHandler {
        async fn handle(&self, _intent: &WorldIntent) -> Result<(), IntentError> {
            Err(IntentError("door jammed".into()))
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_handler() {
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let dispatcher =
            WorldIntentDispatcher::new().with_handler("open_door", handler.clone());

        let records = dispatcher
            .dispatch(&[WorldIntent::new("open_door", "north-gate", serde_json::Value::Null)])
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, DispatchOutcome::Delivered);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_recorded_and_do_not_stop_later_intents() {
        let counting = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = WorldIntentDispatcher::new()
            .with_handler("open_door", Arc::new(FailingHandler))
            .with_handler("ring_bell", counting.clone());

        let records = dispatcher
            .dispatch(&[
                WorldIntent::new("open_door", "gate", serde_json::Value::Null),
                WorldIntent::new("ring_bell", "tower", serde_json::Value::Null),
            ])
            .await;

        assert!(matches!(
            records[0].outcome,
            DispatchOutcome::HandlerFailed(_)
        ));
        assert_eq!(records[1].outcome, DispatchOutcome::Delivered);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_handler_is_recorded() {
        let dispatcher = WorldIntentDispatcher::new();
        let records = dispatcher
            .dispatch(&[WorldIntent::new("warp", "moon", serde_json::Value::Null)])
            .await;
        assert_eq!(records[0].outcome, DispatchOutcome::NoHandler);
        assert!(records[0].failed());
    }
}
