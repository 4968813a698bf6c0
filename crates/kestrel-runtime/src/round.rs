//! Round runner — executes a single cycle: prompt → query → actions.
//!
//! Rounds are strictly sequential; the calls inside one round execute
//! concurrently and each is independently caught. A round never starts its
//! successor — the engine owns the loop and acts on the returned
//! disposition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use kestrel_actions::{
    ActionCatalog, ActionExecutor, CollaboratorError, ModelQuerier, ModelRequest, PromptBuilder,
    PromptContext, RecoveryHook,
};
use kestrel_control::ControlToken;
use kestrel_core::calls::{ActionCall, ActionOutcome, CallStatus, failure_outcome};
use kestrel_core::events::{ActionCallSummary, BaseEvent, LoopEvent, LoopPhase, LoopProgress};
use kestrel_core::reply::{ModelReply, ReplyStatus};
use kestrel_core::rounds::{LoopConfig, Round};
use kestrel_validate::Validator;

use crate::emitter::EventEmitter;
use crate::errors::EngineError;
use crate::executor::{CallDeps, execute_call};
use crate::identity::IdentityManager;

/// How the engine should proceed after a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Actions were executed; the loop continues.
    Continue,
    /// The model requested no actions; the loop completes.
    Complete,
    /// The model reply was not successful; the loop stops.
    ModelStop,
    /// Cancellation was observed; the loop stops with `cancelled = true`.
    Cancelled,
}

/// Everything a round needs from the engine.
pub(crate) struct RoundDeps<'a> {
    pub config: &'a LoopConfig,
    pub session_id: &'a str,
    pub prompt_builder: &'a Arc<dyn PromptBuilder>,
    pub catalog: &'a Arc<dyn ActionCatalog>,
    pub querier: &'a Arc<dyn ModelQuerier>,
    pub executor: &'a Arc<dyn ActionExecutor>,
    pub recovery: Option<&'a Arc<dyn RecoveryHook>>,
    pub validator: &'a Validator,
    pub identity: &'a Mutex<IdentityManager>,
    pub progress: &'a Mutex<LoopProgress>,
    pub emitter: &'a EventEmitter,
}

/// Output of one executed round.
pub(crate) struct RoundOutput {
    pub round: Round,
    pub disposition: Disposition,
}

/// Execute a single round.
#[instrument(skip_all, fields(session_id = deps.session_id, round = index))]
pub(crate) async fn run_round(
    index: u32,
    rounds_so_far: &[Round],
    deps: &RoundDeps<'_>,
    token: &ControlToken,
) -> Result<RoundOutput, EngineError> {
    let round_start = Instant::now();
    let timestamp = chrono::Utc::now().to_rfc3339();

    // 1. Build prompt
    set_phase(deps, LoopPhase::BuildingPrompt);
    if token.wait_if_paused().await.is_err() {
        return Ok(cancelled_round(index, round_start, timestamp));
    }
    let context = PromptContext {
        session_id: deps.session_id,
        rounds: rounds_so_far,
    };
    let progress_snapshot = *deps.progress.lock();
    let prompt = match deps
        .prompt_builder
        .build(&context, &progress_snapshot, token)
        .await
    {
        Ok(p) => p,
        Err(CollaboratorError::Cancelled) => {
            return Ok(cancelled_round(index, round_start, timestamp));
        }
        Err(e) => return Err(e.into()),
    };
    debug!(token_estimate = prompt.token_estimate, "prompt built");

    let available_actions = match deps.catalog.available_actions(token).await {
        Ok(actions) => actions,
        Err(CollaboratorError::Cancelled) => {
            return Ok(cancelled_round(index, round_start, timestamp));
        }
        Err(e) => return Err(e.into()),
    };

    // 2. Query model (bounded retries on retryable failures)
    set_phase(deps, LoopPhase::Fetching);
    let request = ModelRequest {
        messages: prompt.messages,
        available_actions,
        streaming_enabled: deps.config.streaming_enabled,
    };
    let mut retry_count = 0u32;
    let reply = loop {
        match deps.querier.query(&request, token).await {
            Ok(reply) => break reply,
            Err(CollaboratorError::Cancelled) => {
                return Ok(cancelled_round(index, round_start, timestamp));
            }
            Err(e @ CollaboratorError::Query { .. })
                if e.is_retryable() && retry_count < deps.config.max_query_retries =>
            {
                retry_count += 1;
                warn!(retry_count, error = %e, "model query retry");
                tokio::time::sleep(Duration::from_millis(u64::from(retry_count) * 200)).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    // 3. Terminal replies end the loop without executing anything
    if !reply.status.is_success() {
        let disposition = if reply.status == ReplyStatus::Cancelled {
            Disposition::Cancelled
        } else {
            Disposition::ModelStop
        };
        return Ok(RoundOutput {
            round: empty_round(index, reply, retry_count, round_start, timestamp),
            disposition,
        });
    }

    if reply.requested_actions.is_empty() {
        info!(round = index, "model requested no actions");
        return Ok(RoundOutput {
            round: empty_round(index, reply, retry_count, round_start, timestamp),
            disposition: Disposition::Complete,
        });
    }

    // 4. Re-key requested actions to unique ids
    let calls: Vec<ActionCall> = {
        let mut identity = deps.identity.lock();
        reply
            .requested_actions
            .iter()
            .map(|requested| identity.allocate(requested, None))
            .collect()
    };

    let _ = deps.emitter.emit(LoopEvent::ActionBatch {
        base: BaseEvent::now(deps.session_id),
        calls: calls
            .iter()
            .map(|c| ActionCallSummary {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect(),
    });

    // 5. Batch-scoped validation; batch-level problems fail the whole batch
    //    (per-call problems are handled per call by the executor pipeline)
    let batch = deps.validator.validate_batch(&calls);
    let batch_level_error = batch
        .errors()
        .iter()
        .find(|e| e.field == "calls")
        .map(|e| format!("{} ({})", e.message, e.code));
    if let Some(message) = batch_level_error {
        warn!(round = index, %message, "batch rejected");
        let outcomes: Vec<ActionOutcome> = calls
            .iter()
            .map(|c| failure_outcome(c.id.clone(), message.clone(), 0))
            .collect();
        finish_statuses(deps, &outcomes);
        bump_actions_executed(deps, outcomes.len());
        return Ok(RoundOutput {
            round: assemble_round(index, reply, calls, outcomes, retry_count, round_start, timestamp, deps),
            disposition: Disposition::Continue,
        });
    }
    let exec_calls = if batch.is_valid() {
        batch.into_data().unwrap_or_else(|| calls.clone())
    } else {
        calls.clone()
    };

    // 6. Execute all calls concurrently; each independently caught
    set_phase(deps, LoopPhase::ExecutingActions);
    {
        let mut identity = deps.identity.lock();
        for call in &exec_calls {
            let _ = identity.set_status(&call.id, CallStatus::Executing);
        }
    }

    let call_deps = CallDeps {
        executor: deps.executor,
        validator: deps.validator,
        recovery: deps.recovery,
        session_id: deps.session_id,
        emitter: deps.emitter,
        token,
    };
    let all = join_all(exec_calls.iter().map(|call| execute_call(call, &call_deps)));
    let outcomes: Vec<ActionOutcome> = match deps.config.round_timeout_ms {
        Some(timeout_ms) => {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), all).await {
                Ok(outcomes) => outcomes,
                Err(_) => {
                    warn!(round = index, timeout_ms, "round timed out");
                    exec_calls
                        .iter()
                        .map(|c| {
                            failure_outcome(
                                c.id.clone(),
                                format!("Round timed out after {timeout_ms}ms"),
                                timeout_ms,
                            )
                        })
                        .collect()
                }
            }
        }
        None => all.await,
    };

    finish_statuses(deps, &outcomes);
    bump_actions_executed(deps, outcomes.len());

    let disposition = if token.is_cancelled() {
        Disposition::Cancelled
    } else {
        Disposition::Continue
    };

    Ok(RoundOutput {
        round: assemble_round(index, reply, exec_calls, outcomes, retry_count, round_start, timestamp, deps),
        disposition,
    })
}

fn set_phase(deps: &RoundDeps<'_>, phase: LoopPhase) {
    let snapshot = {
        let mut progress = deps.progress.lock();
        progress.phase = phase;
        *progress
    };
    let _ = deps.emitter.emit(LoopEvent::PhaseChange {
        base: BaseEvent::now(deps.session_id),
        progress: snapshot,
    });
}

fn finish_statuses(deps: &RoundDeps<'_>, outcomes: &[ActionOutcome]) {
    let mut identity = deps.identity.lock();
    for outcome in outcomes {
        let status = if outcome.success {
            CallStatus::Completed
        } else {
            CallStatus::Failed
        };
        let _ = identity.set_status(&outcome.call_id, status);
    }
}

fn bump_actions_executed(deps: &RoundDeps<'_>, count: usize) {
    let mut progress = deps.progress.lock();
    progress.actions_executed += u32::try_from(count).unwrap_or(u32::MAX);
}

#[allow(clippy::too_many_arguments)]
fn assemble_round(
    index: u32,
    reply: ModelReply,
    calls: Vec<ActionCall>,
    outcomes: Vec<ActionOutcome>,
    retry_count: u32,
    round_start: Instant,
    timestamp: String,
    deps: &RoundDeps<'_>,
) -> Round {
    let duration_ms = u64::try_from(round_start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let _ = deps.emitter.emit(LoopEvent::RoundEnd {
        base: BaseEvent::now(deps.session_id),
        round: index,
        duration_ms,
        actions_executed: u32::try_from(outcomes.len()).unwrap_or(u32::MAX),
    });
    Round {
        index,
        response: reply,
        calls,
        outcomes,
        retry_count,
        duration_ms,
        timestamp,
    }
}

fn empty_round(
    index: u32,
    reply: ModelReply,
    retry_count: u32,
    round_start: Instant,
    timestamp: String,
) -> Round {
    Round {
        index,
        response: reply,
        calls: Vec::new(),
        outcomes: Vec::new(),
        retry_count,
        duration_ms: u64::try_from(round_start.elapsed().as_millis()).unwrap_or(u64::MAX),
        timestamp,
    }
}

fn cancelled_round(index: u32, round_start: Instant, timestamp: String) -> RoundOutput {
    RoundOutput {
        round: empty_round(index, ModelReply::cancelled(), 0, round_start, timestamp),
        disposition: Disposition::Cancelled,
    }
}
