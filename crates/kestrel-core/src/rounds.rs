//! Round and loop result types, plus loop configuration.

use serde::{Deserialize, Serialize};

use crate::calls::{ActionCall, ActionOutcome};
use crate::reply::ModelReply;

// ─────────────────────────────────────────────────────────────────────────────
// Loop configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a loop engine instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Maximum rounds before the loop stops with `hit_action_limit`.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Maximum action calls the model may request in one round.
    #[serde(default = "default_max_actions_per_round")]
    pub max_actions_per_round: usize,
    /// Whether the model querier should stream incrementally.
    #[serde(default = "default_true")]
    pub streaming_enabled: bool,
    /// Optional wall-clock budget for one round in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_timeout_ms: Option<u64>,
    /// Base time budget handed to nested delegation, in milliseconds.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    /// Retries allowed per model query when the failure is retryable.
    #[serde(default = "default_max_query_retries")]
    pub max_query_retries: u32,
}

const fn default_max_rounds() -> u32 {
    25
}

const fn default_max_actions_per_round() -> usize {
    16
}

const fn default_true() -> bool {
    true
}

const fn default_time_budget_ms() -> u64 {
    120_000
}

const fn default_max_query_retries() -> u32 {
    2
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_actions_per_round: default_max_actions_per_round(),
            streaming_enabled: true,
            round_timeout_ms: None,
            time_budget_ms: default_time_budget_ms(),
            max_query_retries: default_max_query_retries(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Round
// ─────────────────────────────────────────────────────────────────────────────

/// One orchestration cycle: model reply plus the calls it triggered.
///
/// Rounds are accumulated into the final [`LoopResult`] and never mutated
/// after being recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// 1-based round index.
    pub index: u32,
    /// The model reply that opened this round.
    pub response: ModelReply,
    /// Action calls requested this round, in model order.
    pub calls: Vec<ActionCall>,
    /// Outcomes for the calls (settled order, one per call).
    pub outcomes: Vec<ActionOutcome>,
    /// Query retries consumed this round.
    pub retry_count: u32,
    /// Round duration in milliseconds.
    pub duration_ms: u64,
    /// RFC 3339 timestamp of round start.
    pub timestamp: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop result
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot returned by `execute_loop`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopResult {
    /// Final text response from the model, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    /// All rounds, in execution order.
    pub rounds: Vec<Round>,
    /// Total wall-clock duration in milliseconds.
    pub total_duration_ms: u64,
    /// Total action calls executed across all rounds.
    pub total_action_calls: u32,
    /// Whether the loop was cancelled.
    pub cancelled: bool,
    /// Whether the loop stopped because the round budget was exhausted.
    pub hit_action_limit: bool,
}

impl LoopResult {
    /// The final round, if any were executed.
    #[must_use]
    pub fn final_round(&self) -> Option<&Round> {
        self.rounds.last()
    }
}

impl Default for LoopResult {
    fn default() -> Self {
        Self {
            final_response: None,
            rounds: Vec::new(),
            total_duration_ms: 0,
            total_action_calls: 0,
            cancelled: false,
            hit_action_limit: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
