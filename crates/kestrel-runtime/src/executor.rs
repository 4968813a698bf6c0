//! Per-call execution pipeline.
//!
//! Pipeline: cancellation check → validation → execute → outcome validation
//! → recovery hook → events. Every failure mode lands in a failed
//! [`ActionOutcome`]; nothing here can abort a sibling call or the round.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use kestrel_actions::{ActionExecutor, RecoveryHook};
use kestrel_control::ControlToken;
use kestrel_core::calls::{ActionCall, ActionOutcome, failure_outcome};
use kestrel_core::events::{BaseEvent, LoopEvent};
use kestrel_validate::Validator;

use crate::emitter::EventEmitter;

/// Shared dependencies for executing the calls of one round.
pub(crate) struct CallDeps<'a> {
    pub executor: &'a Arc<dyn ActionExecutor>,
    pub validator: &'a Validator,
    pub recovery: Option<&'a Arc<dyn RecoveryHook>>,
    pub session_id: &'a str,
    pub emitter: &'a EventEmitter,
    pub token: &'a ControlToken,
}

/// Execute a single call through the full pipeline.
#[instrument(skip_all, fields(action_name = %call.name, call_id = %call.id))]
pub(crate) async fn execute_call(call: &ActionCall, deps: &CallDeps<'_>) -> ActionOutcome {
    let start = Instant::now();

    let _ = deps.emitter.emit(LoopEvent::ActionStart {
        base: BaseEvent::now(deps.session_id),
        call_id: call.id.clone(),
        name: call.name.clone(),
    });

    let mut outcome = run_pipeline(call, deps, start).await;

    // Recovery boundary: a hook may rewrite the feedback content of a
    // failure; the outcome stays failed either way.
    if !outcome.success {
        if let (Some(hook), Some(error)) = (deps.recovery, outcome.error.clone()) {
            if let Some(repaired) = hook.on_action_failure(call, &error).await {
                debug!(call_id = %call.id, "recovery hook rewrote failure feedback");
                outcome.content = repaired;
            }
        }
    }

    let _ = deps.emitter.emit(LoopEvent::ActionEnd {
        base: BaseEvent::now(deps.session_id),
        call_id: call.id.clone(),
        name: call.name.clone(),
        duration_ms: outcome.duration_ms,
        success: outcome.success,
    });
    debug!(success = outcome.success, duration_ms = outcome.duration_ms, "action settled");

    outcome
}

async fn run_pipeline(call: &ActionCall, deps: &CallDeps<'_>, start: Instant) -> ActionOutcome {
    // 1. Pause-aware cancellation gate
    if deps.token.wait_if_paused().await.is_err() {
        return failure_outcome(call.id.clone(), "Operation cancelled", elapsed_ms(start));
    }

    // 2. Structural validation (with sanitization)
    let checked = deps.validator.validate_call(call);
    for warning in checked.warnings() {
        warn!(call_id = %call.id, field = %warning.field, code = %warning.code, "call warning");
    }
    if !checked.is_valid() {
        let summary = checked.error_summary();
        return failure_outcome(
            call.id.clone(),
            format!("Invalid action call: {summary}"),
            elapsed_ms(start),
        );
    }
    let effective = checked.into_data().unwrap_or_else(|| call.clone());

    // 3. Execute
    let outcome = deps.executor.execute(&effective, deps.token).await;

    // 4. Outcome validation (result ceiling + sanitization)
    let checked = deps.validator.validate_outcome(&outcome);
    for warning in checked.warnings() {
        warn!(call_id = %call.id, field = %warning.field, code = %warning.code, "outcome warning");
    }
    if checked.is_valid() {
        checked.into_data().unwrap_or(outcome)
    } else {
        let summary = checked.error_summary();
        failure_outcome(
            call.id.clone(),
            format!("Invalid action result: {summary}"),
            elapsed_ms(start),
        )
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kestrel_actions::{ActionHandler, ActionRegistry, ActionSpec, HandlerError};
    use kestrel_validate::ValidationLimits;

    struct EchoHandler;

    #[async_trait]
    impl ActionHandler for EchoHandler {
        fn name(&self) -> &str {
            "echo"
        }
        fn spec(&self) -> ActionSpec {
            ActionSpec::new("echo", "Echoes its arguments")
        }
        async fn run(
            &self,
            call: &ActionCall,
            _token: &ControlToken,
        ) -> Result<String, HandlerError> {
            Ok(call.arguments.clone())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ActionHandler for FailingHandler {
        fn name(&self) -> &str {
            "broken"
        }
        fn spec(&self) -> ActionSpec {
            ActionSpec::new("broken", "Always fails")
        }
        async fn run(
            &self,
            _call: &ActionCall,
            _token: &ControlToken,
        ) -> Result<String, HandlerError> {
            Err(HandlerError::Failed {
                message: "disk on fire".into(),
            })
        }
    }

    struct RewriteHook;

    #[async_trait]
    impl RecoveryHook for RewriteHook {
        async fn on_action_failure(&self, _call: &ActionCall, error: &str) -> Option<String> {
            Some(format!("repaired: {error}"))
        }
    }

    fn registry() -> Arc<dyn ActionExecutor> {
        let reg = ActionRegistry::new();
        reg.register(Arc::new(EchoHandler));
        reg.register(Arc::new(FailingHandler));
        Arc::new(reg)
    }

    struct Fixture {
        executor: Arc<dyn ActionExecutor>,
        validator: Validator,
        recovery: Option<Arc<dyn RecoveryHook>>,
        emitter: EventEmitter,
        token: ControlToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                executor: registry(),
                validator: Validator::default(),
                recovery: None,
                emitter: EventEmitter::new(),
                token: ControlToken::new(),
            }
        }

        fn deps(&self) -> CallDeps<'_> {
            CallDeps {
                executor: &self.executor,
                validator: &self.validator,
                recovery: self.recovery.as_ref(),
                session_id: "s1",
                emitter: &self.emitter,
                token: &self.token,
            }
        }
    }

    #[tokio::test]
    async fn successful_execution() {
        let fixture = Fixture::new();
        let call = ActionCall::new("echo", r#"{"text":"hi"}"#);
        let outcome = execute_call(&call, &fixture.deps()).await;
        assert!(outcome.success);
        assert_eq!(outcome.content, r#"{"text":"hi"}"#);
    }

    #[tokio::test]
    async fn handler_failure_becomes_failed_outcome() {
        let fixture = Fixture::new();
        let outcome = execute_call(&ActionCall::new("broken", "{}"), &fixture.deps()).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn invalid_call_blocked_before_execution() {
        let fixture = Fixture::new();
        let outcome = execute_call(&ActionCall::new("", "{}"), &fixture.deps()).await;
        assert!(!outcome.success);
        assert!(outcome.content.contains("Invalid action call"));
        assert!(outcome.content.contains("EMPTY_NAME"));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let fixture = Fixture::new();
        fixture.token.cancel();
        let outcome = execute_call(&ActionCall::new("echo", "{}"), &fixture.deps()).await;
        assert!(!outcome.success);
        assert!(outcome.content.contains("cancelled"));
    }

    #[tokio::test]
    async fn oversized_result_becomes_failure() {
        let mut fixture = Fixture::new();
        fixture.validator = Validator::new(
            ValidationLimits {
                max_result_len: 4,
                ..Default::default()
            },
            false,
        );
        let call = ActionCall::new("echo", r#"{"k":"large"}"#);
        let outcome = execute_call(&call, &fixture.deps()).await;
        assert!(!outcome.success);
        assert!(outcome.content.contains("RESULT_TOO_LONG"));
    }

    #[tokio::test]
    async fn recovery_hook_rewrites_failure_content() {
        let mut fixture = Fixture::new();
        fixture.recovery = Some(Arc::new(RewriteHook));
        let outcome = execute_call(&ActionCall::new("broken", "{}"), &fixture.deps()).await;
        assert!(!outcome.success, "outcome stays failed");
        assert!(outcome.content.starts_with("repaired:"));
    }

    #[tokio::test]
    async fn emits_start_and_end_events() {
        let fixture = Fixture::new();
        let mut rx = fixture.emitter.subscribe();
        let _ = execute_call(&ActionCall::new("echo", "{}"), &fixture.deps()).await;

        let mut saw_start = false;
        let mut saw_end = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                LoopEvent::ActionStart { name, .. } if name == "echo" => saw_start = true,
                LoopEvent::ActionEnd { name, success, .. } if name == "echo" => {
                    assert!(success);
                    saw_end = true;
                }
                _ => {}
            }
        }
        assert!(saw_start);
        assert!(saw_end);
    }
}
