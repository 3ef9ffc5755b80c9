use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use llamabrain_audit::{AuditLog, AuditRecord, InteractionFailure, ReplayPackage};
use llamabrain_expectancy::{ConstraintSet, ExpectancyEvaluator, ExpectancyRule};
use llamabrain_fallback::{
    FallbackCatalog, FallbackReason, FallbackSystem, RetryDecision, RetryPolicy,
};
use llamabrain_generator::{Generator, GeneratorBackend, OutputMode};
use llamabrain_memory::{MemoryError, MemorySystem, NpcMemory};
use llamabrain_mutation::{
    IntentHandler, MutationController, MutationError, WorldIntentDispatcher,
};
use llamabrain_parser::{reply_schema, OutputParser, ParsedOutput};
use llamabrain_prompt::PromptAssembler;
use llamabrain_retrieval::ContextRetriever;
use llamabrain_types::{
    derive_attempt_seed, CancelSignal, ContentHash, DialogueTurn, InteractionContext,
    ModelFingerprint, NpcId, RecordId, TriggerReason,
};
use llamabrain_validation::{GateConfig, PredicateRegistry, ValidationGate, ValidationReport};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::persona::Persona;
use crate::result::{BrainError, InteractionResult};

/// Per-NPC mutable runtime state, guarded by that NPC's interaction lock.
#[derive(Debug, Default)]
struct NpcState {
    interaction_count: u64,
    history: Vec<DialogueTurn>,
}

const HISTORY_RETENTION: usize = 64;

/// Assembles a [`BrainRuntime`]. Rules, predicates, intent handlers,
/// personas, fallback lines, and canonical facts are all fixed at build
/// time; the runtime itself is immutable afterwards.
pub struct BrainBuilder {
    config: RuntimeConfig,
    backend: Arc<dyn GeneratorBackend>,
    evaluator: ExpectancyEvaluator,
    predicates: PredicateRegistry,
    dispatcher: WorldIntentDispatcher,
    fallback: FallbackCatalog,
    personas: HashMap<NpcId, Persona>,
    canonical: Vec<(NpcId, Vec<(String, serde_json::Value)>)>,
}

impl BrainBuilder {
    pub fn new(backend: Arc<dyn GeneratorBackend>, config: RuntimeConfig) -> Self {
        Self {
            config,
            backend,
            evaluator: ExpectancyEvaluator::new(),
            predicates: PredicateRegistry::with_builtins(),
            dispatcher: WorldIntentDispatcher::new(),
            fallback: FallbackCatalog::new(),
            personas: HashMap::new(),
            canonical: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: ExpectancyRule) -> Self {
        self.evaluator.register(rule);
        self
    }

    pub fn predicate(
        mut self,
        id: impl Into<String>,
        predicate: impl Fn(&llamabrain_retrieval::StateSnapshot, &ParsedOutput) -> bool
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.predicates.register(id, predicate);
        self
    }

    pub fn intent_handler(
        mut self,
        intent_type: impl Into<String>,
        handler: Arc<dyn IntentHandler>,
    ) -> Self {
        self.dispatcher.register(intent_type, handler);
        self
    }

    pub fn fallback_catalog(mut self, catalog: FallbackCatalog) -> Self {
        self.fallback = catalog;
        self
    }

    pub fn persona(mut self, npc: NpcId, persona: Persona) -> Self {
        self.personas.insert(npc, persona);
        self
    }

    /// Designer facts for one NPC, loaded and sealed at build time.
    pub fn canonical_facts(
        mut self,
        npc: NpcId,
        facts: Vec<(String, serde_json::Value)>,
    ) -> Self {
        self.canonical.push((npc, facts));
        self
    }

    pub fn build(self) -> Result<BrainRuntime, BrainError> {
        let memory = Arc::new(MemorySystem::new(self.config.memory.clone()));
        for (npc, facts) in self.canonical {
            let handle = memory.handle(&npc)?;
            let mut guard = handle.write().map_err(|_| MemoryError::LockPoisoned)?;
            guard.load_canonical(facts)?;
        }

        let gate = ValidationGate::new(
            self.predicates,
            GateConfig {
                granted_authority: self.config.gate.granted_authority,
                contradiction_policy: self.config.gate.contradiction_policy,
            },
        )
        .with_intent_whitelist(self.dispatcher.registered_types());

        let generator = Generator::new(self.backend, &self.config.generator);
        let retry = RetryPolicy::new(self.config.retry.clone());
        let retriever = ContextRetriever::new(self.config.retrieval.clone());

        Ok(BrainRuntime {
            retriever,
            generator,
            parser: OutputParser::new(),
            gate,
            mutator: MutationController::new(self.config.gate.granted_authority),
            dispatcher: self.dispatcher,
            retry,
            fallback: FallbackSystem::new(self.fallback),
            audit: Arc::new(AuditLog::new()),
            evaluator: self.evaluator,
            personas: self.personas,
            default_persona: Persona::default(),
            npc_states: AsyncMutex::new(HashMap::new()),
            memory,
            config: self.config,
        })
    }
}

/// Where an attempt loop ended up.
enum AttemptOutcome {
    Validated {
        parsed: ParsedOutput,
        report: ValidationReport,
        prompt_hash: ContentHash,
        attempts: u32,
    },
    Fallback {
        reason: FallbackReason,
        report: Option<ValidationReport>,
        prompt_hash: Option<ContentHash>,
        attempts: u32,
    },
}

/// The runtime: one `submit` per interaction, everything else wired at
/// build time.
pub struct BrainRuntime {
    config: RuntimeConfig,
    memory: Arc<MemorySystem>,
    evaluator: ExpectancyEvaluator,
    retriever: ContextRetriever,
    generator: Generator,
    parser: OutputParser,
    gate: ValidationGate,
    mutator: MutationController,
    dispatcher: WorldIntentDispatcher,
    retry: RetryPolicy,
    fallback: FallbackSystem,
    audit: Arc<AuditLog>,
    personas: HashMap<NpcId, Persona>,
    default_persona: Persona,
    npc_states: AsyncMutex<HashMap<NpcId, Arc<AsyncMutex<NpcState>>>>,
}

impl BrainRuntime {
    pub fn builder(backend: Arc<dyn GeneratorBackend>, config: RuntimeConfig) -> BrainBuilder {
        BrainBuilder::new(backend, config)
    }

    pub fn audit_log(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    pub fn memory(&self) -> Arc<MemorySystem> {
        self.memory.clone()
    }

    pub fn model_fingerprint(&self) -> ModelFingerprint {
        self.generator.fingerprint()
    }

    /// Export the audit log as a self-describing replay package.
    pub fn export_package(
        &self,
        game_version: impl Into<String>,
        scene: impl Into<String>,
    ) -> ReplayPackage {
        ReplayPackage::new(
            game_version,
            scene,
            self.model_fingerprint(),
            self.audit.snapshot(),
        )
    }

    /// Run one interaction end to end.
    ///
    /// `seed` is the interaction's base seed; retries derive theirs from it.
    /// All stages for one NPC are serialized behind that NPC's lock; the
    /// wall-clock budget routes to the fallback hierarchy on expiry.
    pub async fn submit(
        &self,
        ctx: InteractionContext,
        seed: u64,
        cancel: &CancelSignal,
    ) -> Result<InteractionResult, BrainError> {
        self.check_input(&ctx)?;

        let state_handle = self.npc_state(&ctx.npc_id).await;
        let mut state = state_handle.lock().await;
        let memory_handle = self.memory.handle(&ctx.npc_id)?;

        let (memory_hash_before, canonical_hash_before) = {
            let guard = memory_handle
                .read()
                .map_err(|_| MemoryError::LockPoisoned)?;
            (guard.memory_hash(), guard.canonical_hash())
        };

        info!(
            npc = %ctx.npc_id,
            trigger = %ctx.trigger_reason,
            interaction = state.interaction_count + 1,
            "interaction started"
        );

        let budget = Duration::from_millis(self.config.limits.interaction_timeout_ms);
        let outcome = match tokio::time::timeout(
            budget,
            self.run_attempts(&ctx, seed, cancel, &state, &memory_handle),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                self.audit_failure(&ctx, seed, &state, memory_hash_before, canonical_hash_before, &error);
                return Err(error);
            }
            Err(_) => {
                warn!(npc = %ctx.npc_id, "interaction wall-clock budget exhausted");
                AttemptOutcome::Fallback {
                    reason: FallbackReason::BudgetExhausted,
                    report: None,
                    prompt_hash: None,
                    attempts: 0,
                }
            }
        };

        match outcome {
            AttemptOutcome::Validated {
                parsed,
                report,
                prompt_hash,
                attempts,
            } => {
                self.finish_commit(
                    &ctx,
                    seed,
                    cancel,
                    &mut state,
                    &memory_handle,
                    parsed,
                    report,
                    prompt_hash,
                    attempts,
                    memory_hash_before,
                    canonical_hash_before,
                )
                .await
            }
            AttemptOutcome::Fallback {
                reason,
                report,
                prompt_hash,
                attempts,
            } => Ok(self.finish_fallback(
                &ctx,
                seed,
                &mut state,
                &memory_handle,
                reason,
                report,
                prompt_hash,
                attempts,
                memory_hash_before,
                canonical_hash_before,
            )?),
        }
    }

    fn check_input(&self, ctx: &InteractionContext) -> Result<(), BrainError> {
        if ctx.npc_id.as_str().trim().is_empty() {
            return Err(BrainError::InputInvalid("npc id is blank".into()));
        }
        if ctx.trigger_reason == TriggerReason::PlayerUtterance
            && ctx.player_input.trim().is_empty()
        {
            return Err(BrainError::InputInvalid(
                "player utterance with empty input".into(),
            ));
        }
        let max = self.config.limits.max_player_input_chars;
        if ctx.player_input.chars().count() > max {
            return Err(BrainError::InputInvalid(format!(
                "player input exceeds {max} characters"
            )));
        }
        Ok(())
    }

    async fn npc_state(&self, npc: &NpcId) -> Arc<AsyncMutex<NpcState>> {
        let mut map = self.npc_states.lock().await;
        map.entry(npc.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(NpcState::default())))
            .clone()
    }

    fn persona_for(&self, npc: &NpcId) -> &Persona {
        self.personas.get(npc).unwrap_or(&self.default_persona)
    }

    /// Stages 1–7 with the retry loop. The snapshot is captured once and
    /// reused; only the constraint set changes between attempts.
    async fn run_attempts(
        &self,
        ctx: &InteractionContext,
        seed: u64,
        cancel: &CancelSignal,
        state: &NpcState,
        memory_handle: &Arc<std::sync::RwLock<NpcMemory>>,
    ) -> Result<AttemptOutcome, BrainError> {
        let base_constraints = self.evaluator.evaluate(ctx);
        let persona = self.persona_for(&ctx.npc_id);
        let interaction_count = state.interaction_count + 1;

        let tail_start = state
            .history
            .len()
            .saturating_sub(self.config.limits.history_tail);
        let snapshot = {
            let guard = memory_handle
                .read()
                .map_err(|_| MemoryError::LockPoisoned)?;
            self.retriever.snapshot(
                &guard,
                ctx,
                &base_constraints,
                &persona.system_prompt,
                &state.history[tail_start..],
                interaction_count,
                Utc::now(),
            )
        };

        let assembler = PromptAssembler::new(self.config.budget.clone())
            .with_few_shot(persona.few_shot.clone());

        let mut attempt: u32 = 0;
        let mut constraints: ConstraintSet = base_constraints;
        let mut last_report: Option<ValidationReport> = None;
        let mut last_prompt_hash: Option<ContentHash> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(BrainError::Cancelled);
            }

            let attempt_snapshot = snapshot.with_constraints(constraints.clone());
            let prompt = assembler.assemble(&attempt_snapshot);
            last_prompt_hash = Some(prompt.prompt_hash);
            for warning in &prompt.warnings {
                warn!(npc = %ctx.npc_id, ?warning, "prompt assembly warning");
            }

            let mode = if self.config.structured_output {
                OutputMode::Structured {
                    schema: reply_schema(),
                }
            } else {
                OutputMode::FreeForm
            };
            let attempt_seed = derive_attempt_seed(seed, attempt);

            debug!(npc = %ctx.npc_id, attempt, seed = attempt_seed, "generation attempt");
            match self
                .generator
                .complete(&prompt.text, &self.config.sampling, Some(attempt_seed), mode)
                .await
            {
                Ok(generated) => {
                    let parsed = self.parser.parse(&generated.raw_text, generated.schema_enforced);
                    let report = self.gate.validate(&parsed, &attempt_snapshot);
                    match self.retry.after_validation(attempt, seed, &constraints, &report) {
                        RetryDecision::Commit => {
                            return Ok(AttemptOutcome::Validated {
                                parsed,
                                report,
                                prompt_hash: prompt.prompt_hash,
                                attempts: attempt + 1,
                            });
                        }
                        RetryDecision::Retry {
                            attempt: next,
                            constraints: escalated,
                            ..
                        } => {
                            attempt = next;
                            constraints = escalated;
                            last_report = Some(report);
                        }
                        RetryDecision::Fallback(reason) => {
                            return Ok(AttemptOutcome::Fallback {
                                reason,
                                report: Some(report),
                                prompt_hash: last_prompt_hash,
                                attempts: attempt + 1,
                            });
                        }
                    }
                }
                Err(error) => {
                    match self
                        .retry
                        .after_generator_error(attempt, seed, &constraints, &error)
                    {
                        RetryDecision::Retry {
                            attempt: next,
                            constraints: kept,
                            ..
                        } => {
                            attempt = next;
                            constraints = kept;
                        }
                        RetryDecision::Fallback(reason) => {
                            return Ok(AttemptOutcome::Fallback {
                                reason,
                                report: last_report,
                                prompt_hash: last_prompt_hash,
                                attempts: attempt + 1,
                            });
                        }
                        RetryDecision::Commit => {
                            // A generator error never validates.
                            return Ok(AttemptOutcome::Fallback {
                                reason: FallbackReason::AttemptsExhausted,
                                report: last_report,
                                prompt_hash: last_prompt_hash,
                                attempts: attempt + 1,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Stage 7: transactional commit, intent dispatch, audit.
    #[allow(clippy::too_many_arguments)]
    async fn finish_commit(
        &self,
        ctx: &InteractionContext,
        seed: u64,
        cancel: &CancelSignal,
        state: &mut NpcState,
        memory_handle: &Arc<std::sync::RwLock<NpcMemory>>,
        parsed: ParsedOutput,
        report: ValidationReport,
        prompt_hash: ContentHash,
        attempts: u32,
        memory_hash_before: ContentHash,
        canonical_hash_before: ContentHash,
    ) -> Result<InteractionResult, BrainError> {
        if cancel.is_cancelled() {
            let error = BrainError::Cancelled;
            self.audit_failure(ctx, seed, state, memory_hash_before, canonical_hash_before, &error);
            return Err(error);
        }

        let now = Utc::now();
        let mut mutation_rejected = false;
        let mut applied_entry_ids = Vec::new();
        let mut approved_mutations = report.approved_mutations.clone();

        let commit_result = {
            let mut guard = memory_handle
                .write()
                .map_err(|_| MemoryError::LockPoisoned)?;
            self.mutator.commit(&mut guard, &report.approved_mutations, now)
        };
        match commit_result {
            Ok(outcome) => {
                applied_entry_ids = outcome.committed_ids;
            }
            Err(MutationError::Internal(error)) => {
                let error = BrainError::Internal(error.to_string());
                self.audit_failure(ctx, seed, state, memory_hash_before, canonical_hash_before, &error);
                return Err(error);
            }
            Err(error) => {
                // Degraded success: dialogue delivered, state unchanged.
                warn!(npc = %ctx.npc_id, error = %error, "mutation commit rejected");
                mutation_rejected = true;
                approved_mutations.clear();
            }
        }

        // Best-effort dispatch; never blocks the success signal. A rejected
        // commit suppresses side effects as well.
        let (approved_intents, dispatch_records) = if mutation_rejected {
            (Vec::new(), Vec::new())
        } else {
            let records = self.dispatcher.dispatch(&report.approved_intents).await;
            (report.approved_intents.clone(), records)
        };
        let dispatch_failures: Vec<String> = dispatch_records
            .iter()
            .filter(|r| r.failed())
            .map(|r| format!("{}: {:?}", r.intent.intent_type, r.outcome))
            .collect();

        state.interaction_count += 1;
        push_history(state, ctx, &parsed.dialogue_text);

        let (memory_hash_after, canonical_hash_after) = {
            let guard = memory_handle
                .read()
                .map_err(|_| MemoryError::LockPoisoned)?;
            (guard.memory_hash(), guard.canonical_hash())
        };

        let record = AuditRecord {
            record_id: RecordId::generate(),
            npc_id: ctx.npc_id.clone(),
            interaction_count: state.interaction_count,
            seed,
            attempt_count: attempts,
            player_input: ctx.player_input.clone(),
            memory_hash_before,
            memory_hash_after,
            canonical_hash_before,
            canonical_hash_after,
            prompt_hash,
            output_hash: parsed.output_hash(),
            validation_passed: report.passed,
            approved_mutation_count: approved_mutations.len(),
            fallback_used: false,
            dispatch_failures,
            failure: mutation_rejected.then_some(InteractionFailure::MutationRejected),
            created_at: now,
        };
        let audit_record_id = self.audit.append(record);

        info!(
            npc = %ctx.npc_id,
            attempts,
            mutations = approved_mutations.len(),
            intents = approved_intents.len(),
            degraded = mutation_rejected,
            "interaction committed"
        );

        Ok(InteractionResult {
            dialogue_text: parsed.dialogue_text,
            approved_mutations,
            applied_entry_ids,
            approved_intents,
            dispatch_records,
            validation_report: Some(report),
            fallback_used: false,
            attempt_count: attempts,
            audit_record_id,
        })
    }

    /// Stage 8's terminal state: a designer-authored, dialogue-only answer.
    #[allow(clippy::too_many_arguments)]
    fn finish_fallback(
        &self,
        ctx: &InteractionContext,
        seed: u64,
        state: &mut NpcState,
        memory_handle: &Arc<std::sync::RwLock<NpcMemory>>,
        reason: FallbackReason,
        report: Option<ValidationReport>,
        prompt_hash: Option<ContentHash>,
        attempts: u32,
        memory_hash_before: ContentHash,
        canonical_hash_before: ContentHash,
    ) -> Result<InteractionResult, BrainError> {
        let response = self.fallback.select(&ctx.npc_id, &ctx.trigger_reason, seed);
        let parsed = ParsedOutput::dialogue_only(response.text);

        state.interaction_count += 1;
        push_history(state, ctx, &parsed.dialogue_text);

        // Fallbacks never mutate; the hashes prove it.
        let (memory_hash_after, canonical_hash_after) = {
            let guard = memory_handle
                .read()
                .map_err(|_| MemoryError::LockPoisoned)?;
            (guard.memory_hash(), guard.canonical_hash())
        };

        let record = AuditRecord {
            record_id: RecordId::generate(),
            npc_id: ctx.npc_id.clone(),
            interaction_count: state.interaction_count,
            seed,
            attempt_count: attempts,
            player_input: ctx.player_input.clone(),
            memory_hash_before,
            memory_hash_after,
            canonical_hash_before,
            canonical_hash_after,
            prompt_hash: prompt_hash.unwrap_or_else(|| ContentHash::of_str("")),
            output_hash: parsed.output_hash(),
            validation_passed: report.as_ref().map(|r| r.passed).unwrap_or(false),
            approved_mutation_count: 0,
            fallback_used: true,
            dispatch_failures: Vec::new(),
            failure: match &reason {
                FallbackReason::GeneratorTerminal(_) => Some(InteractionFailure::GeneratorFailure),
                FallbackReason::AttemptsExhausted => report
                    .is_some()
                    .then_some(InteractionFailure::ValidationRejected)
                    .or(Some(InteractionFailure::GeneratorFailure)),
                FallbackReason::BudgetExhausted => Some(InteractionFailure::GeneratorFailure),
            },
            created_at: Utc::now(),
        };
        let audit_record_id = self.audit.append(record);

        info!(npc = %ctx.npc_id, ?reason, tier = ?response.tier, "fallback response delivered");

        Ok(InteractionResult {
            dialogue_text: parsed.dialogue_text,
            approved_mutations: Vec::new(),
            applied_entry_ids: Vec::new(),
            approved_intents: Vec::new(),
            dispatch_records: Vec::new(),
            validation_report: report,
            fallback_used: true,
            attempt_count: attempts,
            audit_record_id,
        })
    }

    /// Caller-facing errors still leave an audit record behind.
    fn audit_failure(
        &self,
        ctx: &InteractionContext,
        seed: u64,
        state: &NpcState,
        memory_hash_before: ContentHash,
        canonical_hash_before: ContentHash,
        error: &BrainError,
    ) {
        let failure = match error {
            BrainError::InputInvalid(_) => InteractionFailure::InputInvalid,
            BrainError::Cancelled => InteractionFailure::Cancelled,
            BrainError::Memory(_) | BrainError::Internal(_) => InteractionFailure::Internal,
        };
        let empty = ContentHash::of_str("");
        self.audit.append(AuditRecord {
            record_id: RecordId::generate(),
            npc_id: ctx.npc_id.clone(),
            interaction_count: state.interaction_count,
            seed,
            attempt_count: 0,
            player_input: ctx.player_input.clone(),
            memory_hash_before,
            memory_hash_after: memory_hash_before,
            canonical_hash_before,
            canonical_hash_after: canonical_hash_before,
            prompt_hash: empty,
            output_hash: empty,
            validation_passed: false,
            approved_mutation_count: 0,
            fallback_used: false,
            dispatch_failures: Vec::new(),
            failure: Some(failure),
            created_at: Utc::now(),
        });
    }
}

fn push_history(state: &mut NpcState, ctx: &InteractionContext, npc_reply: &str) {
    let now = Utc::now();
    if !ctx.player_input.is_empty() {
        state
            .history
            .push(DialogueTurn::player(ctx.player_input.clone(), now));
    }
    if !npc_reply.is_empty() {
        state.history.push(DialogueTurn::npc(npc_reply, now));
    }
    if state.history.len() > HISTORY_RETENTION {
        let excess = state.history.len() - HISTORY_RETENTION;
        state.history.drain(..excess);
    }
}
