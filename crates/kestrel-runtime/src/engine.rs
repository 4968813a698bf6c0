//! `LoopEngine` — the round-based orchestration engine.
//!
//! Drives build-prompt → query-model → execute-actions cycles until the
//! model stops requesting actions, the round budget is exhausted, or
//! execution is cancelled. Rounds are strictly sequential; the actions
//! inside one round run concurrently with per-call failure isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{error, info, instrument};

use kestrel_actions::{
    ActionCatalog, ActionExecutor, ActionHandler, ActionRegistry, ModelQuerier, PromptBuilder,
    RecoveryHook,
};
use kestrel_control::ControlToken;
use kestrel_core::calls::ActionOutcome;
use kestrel_core::events::{BaseEvent, LoopEvent, LoopPhase, LoopProgress};
use kestrel_core::ids::SessionId;
use kestrel_core::reply::ModelReply;
use kestrel_core::rounds::{LoopConfig, LoopResult, Round};
use kestrel_validate::{ValidationLimits, Validator};

use crate::emitter::EventEmitter;
use crate::errors::EngineError;
use crate::identity::{IdentityConfig, IdentityManager, IdentityStats};
use crate::nested::{DelegationConfig, DelegationManager};
use crate::round::{Disposition, RoundDeps, run_round};

/// RAII guard that resets `is_running` to `false` on drop (even on panic).
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// The engine's injected collaborators.
pub struct EngineCollaborators {
    /// Prompt builder.
    pub prompt_builder: Arc<dyn PromptBuilder>,
    /// Action catalog.
    pub catalog: Arc<dyn ActionCatalog>,
    /// Model querier.
    pub querier: Arc<dyn ModelQuerier>,
    /// Action executor.
    pub executor: Arc<dyn ActionExecutor>,
    /// Optional failure-repair boundary.
    pub recovery: Option<Arc<dyn RecoveryHook>>,
}

/// Round-based orchestration engine.
pub struct LoopEngine {
    config: LoopConfig,
    session_id: SessionId,
    prompt_builder: Arc<dyn PromptBuilder>,
    catalog: Arc<dyn ActionCatalog>,
    querier: Arc<dyn ModelQuerier>,
    executor: Arc<dyn ActionExecutor>,
    recovery: Option<Arc<dyn RecoveryHook>>,
    registry: Arc<ActionRegistry>,
    validator: Validator,
    identity: Mutex<IdentityManager>,
    delegation: Arc<DelegationManager>,
    emitter: Arc<EventEmitter>,
    rounds: Mutex<Vec<Round>>,
    progress: Mutex<LoopProgress>,
    is_running: AtomicBool,
    token: Mutex<ControlToken>,
}

impl LoopEngine {
    /// Create an engine with explicit collaborators.
    #[must_use]
    pub fn new(
        config: LoopConfig,
        session_id: SessionId,
        registry: Arc<ActionRegistry>,
        collaborators: EngineCollaborators,
    ) -> Self {
        let validator = Validator::new(
            ValidationLimits {
                max_actions_per_round: config.max_actions_per_round,
                ..Default::default()
            },
            true,
        );
        let identity = IdentityManager::new(IdentityConfig::default());
        let delegation = Arc::new(DelegationManager::new(DelegationConfig {
            base_time_budget_ms: config.time_budget_ms,
            base_max_calls_per_round: config.max_actions_per_round,
            base_max_rounds: config.max_rounds,
            ..Default::default()
        }));
        Self {
            config,
            session_id,
            prompt_builder: collaborators.prompt_builder,
            catalog: collaborators.catalog,
            querier: collaborators.querier,
            executor: collaborators.executor,
            recovery: collaborators.recovery,
            registry,
            validator,
            identity: Mutex::new(identity),
            delegation,
            emitter: Arc::new(EventEmitter::new()),
            rounds: Mutex::new(Vec::new()),
            progress: Mutex::new(LoopProgress::default()),
            is_running: AtomicBool::new(false),
            token: Mutex::new(ControlToken::new()),
        }
    }

    /// Create an engine whose registry doubles as catalog and executor.
    #[must_use]
    pub fn with_registry(
        config: LoopConfig,
        session_id: SessionId,
        registry: Arc<ActionRegistry>,
        prompt_builder: Arc<dyn PromptBuilder>,
        querier: Arc<dyn ModelQuerier>,
    ) -> Self {
        let collaborators = EngineCollaborators {
            prompt_builder,
            catalog: registry.clone(),
            querier,
            executor: registry.clone(),
            recovery: None,
        };
        Self::new(config, session_id, registry, collaborators)
    }

    /// Replace the validator (custom limits / sanitization setting).
    pub fn set_validator(&mut self, validator: Validator) {
        self.validator = validator;
    }

    /// Replace the identity configuration. Existing records are kept.
    pub fn set_identity_config(&mut self, config: IdentityConfig) {
        *self.identity.lock() = IdentityManager::new(config);
    }

    /// Run the loop to completion.
    ///
    /// Returns a [`LoopResult`] on every non-fatal path, with explicit
    /// `cancelled` and `hit_action_limit` flags. Only prompt-build, catalog,
    /// and model-query failures propagate as errors.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn execute_loop(
        &self,
        token: Option<ControlToken>,
    ) -> Result<LoopResult, EngineError> {
        let Some(_guard) = RunGuard::new(&self.is_running) else {
            return Err(EngineError::AlreadyRunning);
        };

        let config_check = self.validator.validate_config(&self.config);
        if !config_check.is_valid() {
            return Err(EngineError::InvalidConfig(config_check.error_summary()));
        }

        let token = token.unwrap_or_default();
        *self.token.lock() = token.clone();
        self.rounds.lock().clear();
        *self.progress.lock() = LoopProgress::default();

        let started = Instant::now();
        let _ = self.emitter.emit(LoopEvent::LoopStart {
            base: BaseEvent::now(self.session_id.as_str()),
        });
        info!("loop started");

        let mut cancelled = false;
        let mut hit_action_limit = false;

        for index in 1..=self.config.max_rounds {
            self.progress.lock().current_round = index;
            let _ = self.emitter.emit(LoopEvent::RoundStart {
                base: BaseEvent::now(self.session_id.as_str()),
                round: index,
            });

            let snapshot = self.rounds.lock().clone();
            let output = match run_round(index, &snapshot, &self.round_deps(), &token).await {
                Ok(output) => output,
                Err(e) => {
                    error!(round = index, error = %e, "loop failed");
                    self.set_phase(LoopPhase::Error);
                    let _ = self.emitter.emit(LoopEvent::LoopEnd {
                        base: BaseEvent::now(self.session_id.as_str()),
                        rounds: index - 1,
                        cancelled: false,
                        hit_action_limit: false,
                        error: Some(e.to_string()),
                    });
                    return Err(e);
                }
            };

            self.rounds.lock().push(output.round);
            self.progress.lock().rounds_completed = index;

            match output.disposition {
                Disposition::Cancelled => {
                    cancelled = true;
                    break;
                }
                Disposition::Complete | Disposition::ModelStop => break,
                Disposition::Continue => {
                    if index == self.config.max_rounds {
                        hit_action_limit = true;
                    }
                }
            }
        }

        self.set_phase(LoopPhase::Completed);

        let rounds = self.rounds.lock().clone();
        let total_action_calls = rounds.iter().map(|r| r.outcomes.len()).sum::<usize>();
        let result = LoopResult {
            final_response: rounds.last().and_then(|r| r.response.response_value.clone()),
            total_duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            total_action_calls: u32::try_from(total_action_calls).unwrap_or(u32::MAX),
            cancelled,
            hit_action_limit,
            rounds,
        };

        let _ = self.emitter.emit(LoopEvent::LoopEnd {
            base: BaseEvent::now(self.session_id.as_str()),
            rounds: u32::try_from(result.rounds.len()).unwrap_or(u32::MAX),
            cancelled,
            hit_action_limit,
            error: None,
        });
        info!(
            rounds = result.rounds.len(),
            actions = result.total_action_calls,
            cancelled,
            hit_action_limit,
            "loop completed"
        );

        Ok(result)
    }

    /// Run exactly one cycle, returning the model reply and the round.
    pub async fn execute_single(
        &self,
        token: Option<ControlToken>,
    ) -> Result<(ModelReply, Round), EngineError> {
        let Some(_guard) = RunGuard::new(&self.is_running) else {
            return Err(EngineError::AlreadyRunning);
        };

        let config_check = self.validator.validate_config(&self.config);
        if !config_check.is_valid() {
            return Err(EngineError::InvalidConfig(config_check.error_summary()));
        }

        let token = token.unwrap_or_default();
        *self.token.lock() = token.clone();

        let index = u32::try_from(self.rounds.lock().len()).unwrap_or(u32::MAX) + 1;
        self.progress.lock().current_round = index;
        let _ = self.emitter.emit(LoopEvent::RoundStart {
            base: BaseEvent::now(self.session_id.as_str()),
            round: index,
        });

        let snapshot = self.rounds.lock().clone();
        let output = run_round(index, &snapshot, &self.round_deps(), &token).await?;

        let reply = output.round.response.clone();
        self.rounds.lock().push(output.round.clone());
        self.progress.lock().rounds_completed = index;

        Ok((reply, output.round))
    }

    // ── control ──

    /// Pause the current invocation's token.
    pub fn pause(&self) {
        self.token.lock().pause();
    }

    /// Resume the current invocation's token.
    pub fn resume(&self) {
        self.token.lock().resume();
    }

    /// Cancel the current invocation's token.
    pub fn cancel(&self) {
        self.token.lock().cancel();
    }

    // ── accessors ──

    /// Whether a loop is currently executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Round currently executing (0 before the first round).
    #[must_use]
    pub fn current_round(&self) -> u32 {
        self.progress.lock().current_round
    }

    /// Rounds recorded so far this invocation.
    #[must_use]
    pub fn rounds(&self) -> Vec<Round> {
        self.rounds.lock().clone()
    }

    /// All outcomes recorded so far, in round order.
    #[must_use]
    pub fn results(&self) -> Vec<ActionOutcome> {
        self.rounds
            .lock()
            .iter()
            .flat_map(|r| r.outcomes.iter().cloned())
            .collect()
    }

    /// Current progress snapshot.
    #[must_use]
    pub fn progress(&self) -> LoopProgress {
        *self.progress.lock()
    }

    /// Identity-record counts by status.
    #[must_use]
    pub fn identity_stats(&self) -> IdentityStats {
        self.identity.lock().stats()
    }

    /// Subscribe to loop events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LoopEvent> {
        self.emitter.subscribe()
    }

    /// The session ID.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// The delegation manager shared with nested sub-loops.
    #[must_use]
    pub fn delegation(&self) -> &Arc<DelegationManager> {
        &self.delegation
    }

    // ── registry pass-through ──

    /// Register an action handler on the injected registry.
    pub fn add_action(&self, handler: Arc<dyn ActionHandler>) {
        self.registry.register(handler);
    }

    /// Remove an action handler from the injected registry.
    pub fn remove_action(&self, name: &str) -> bool {
        self.registry.remove(name).is_some()
    }

    /// Reload the injected registry from its loader.
    pub fn reload_actions(&self) -> Option<usize> {
        self.registry.reload()
    }

    fn round_deps(&self) -> RoundDeps<'_> {
        RoundDeps {
            config: &self.config,
            session_id: self.session_id.as_str(),
            prompt_builder: &self.prompt_builder,
            catalog: &self.catalog,
            querier: &self.querier,
            executor: &self.executor,
            recovery: self.recovery.as_ref(),
            validator: &self.validator,
            identity: &self.identity,
            progress: &self.progress,
            emitter: &self.emitter,
        }
    }

    fn set_phase(&self, phase: LoopPhase) {
        let snapshot = {
            let mut progress = self.progress.lock();
            progress.phase = phase;
            *progress
        };
        let _ = self.emitter.emit(LoopEvent::PhaseChange {
            base: BaseEvent::now(self.session_id.as_str()),
            progress: snapshot,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
