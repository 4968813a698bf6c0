//! Lifecycle events for loop operation.
//!
//! [`LoopEvent`]s are broadcast by the engine so observers (progress UIs,
//! loggers, parent loops watching a delegated child) can follow execution in
//! real time. Events are transient — nothing here is persisted.

use serde::{Deserialize, Serialize};

use crate::ids::CallId;

// ─────────────────────────────────────────────────────────────────────────────
// Base event
// ─────────────────────────────────────────────────────────────────────────────

/// Common fields for all loop events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// Session this event belongs to.
    pub session_id: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl BaseEvent {
    /// Create a new base event with the current UTC timestamp.
    #[must_use]
    pub fn now(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Phase and progress
// ─────────────────────────────────────────────────────────────────────────────

/// Discrete phase of the round state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// Assembling the prompt for the next query.
    BuildingPrompt,
    /// Waiting on the model reply.
    Fetching,
    /// Running the requested actions.
    ExecutingActions,
    /// Loop finished normally.
    Completed,
    /// Loop finished with a fatal error.
    Error,
}

impl LoopPhase {
    /// Stable string form used in progress payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildingPrompt => "building_prompt",
            Self::Fetching => "fetching",
            Self::ExecutingActions => "executing_actions",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl Default for LoopPhase {
    fn default() -> Self {
        Self::BuildingPrompt
    }
}

/// Progress counters reported alongside phase transitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopProgress {
    /// Current phase.
    pub phase: LoopPhase,
    /// Round currently executing (1-based, 0 before the first round).
    pub current_round: u32,
    /// Rounds fully settled so far.
    pub rounds_completed: u32,
    /// Action calls executed so far, across rounds.
    pub actions_executed: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop events
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one call in an action batch event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCallSummary {
    /// Call ID.
    pub id: CallId,
    /// Action name.
    pub name: String,
}

/// High-level loop lifecycle events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// Loop invocation started.
    LoopStart {
        /// Event envelope.
        base: BaseEvent,
    },

    /// A round began.
    RoundStart {
        /// Event envelope.
        base: BaseEvent,
        /// 1-based round index.
        round: u32,
    },

    /// The state machine moved to a new phase.
    PhaseChange {
        /// Event envelope.
        base: BaseEvent,
        /// Progress snapshot including the new phase.
        progress: LoopProgress,
    },

    /// The model requested a batch of actions.
    ActionBatch {
        /// Event envelope.
        base: BaseEvent,
        /// Requested calls.
        calls: Vec<ActionCallSummary>,
    },

    /// One action began executing.
    ActionStart {
        /// Event envelope.
        base: BaseEvent,
        /// Call ID.
        call_id: CallId,
        /// Action name.
        name: String,
    },

    /// One action settled.
    ActionEnd {
        /// Event envelope.
        base: BaseEvent,
        /// Call ID.
        call_id: CallId,
        /// Action name.
        name: String,
        /// Execution duration in milliseconds.
        duration_ms: u64,
        /// Whether it succeeded.
        success: bool,
    },

    /// A round settled (all its actions included).
    RoundEnd {
        /// Event envelope.
        base: BaseEvent,
        /// 1-based round index.
        round: u32,
        /// Round duration in milliseconds.
        duration_ms: u64,
        /// Actions executed this round.
        actions_executed: u32,
    },

    /// Loop invocation finished.
    LoopEnd {
        /// Event envelope.
        base: BaseEvent,
        /// Rounds executed.
        rounds: u32,
        /// Whether the loop was cancelled.
        cancelled: bool,
        /// Whether the round budget was exhausted.
        hit_action_limit: bool,
        /// Fatal error, if the loop failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl LoopEvent {
    /// Stable event type string for filtering and logs.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LoopStart { .. } => "loop_start",
            Self::RoundStart { .. } => "round_start",
            Self::PhaseChange { .. } => "phase_change",
            Self::ActionBatch { .. } => "action_batch",
            Self::ActionStart { .. } => "action_start",
            Self::ActionEnd { .. } => "action_end",
            Self::RoundEnd { .. } => "round_end",
            Self::LoopEnd { .. } => "loop_end",
        }
    }

    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::LoopStart { base }
            | Self::RoundStart { base, .. }
            | Self::PhaseChange { base, .. }
            | Self::ActionBatch { base, .. }
            | Self::ActionStart { base, .. }
            | Self::ActionEnd { base, .. }
            | Self::RoundEnd { base, .. }
            | Self::LoopEnd { base, .. } => &base.session_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
