//! Collaborator traits and their payload types.
//!
//! Defines the four contracts the loop engine delegates to — prompt building,
//! action cataloguing, model querying, action execution — plus the
//! [`ActionHandler`] trait the registry dispatches to and the
//! [`RecoveryHook`] failure boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kestrel_control::ControlToken;
use kestrel_core::calls::{ActionCall, ActionOutcome};
use kestrel_core::events::LoopProgress;
use kestrel_core::reply::ModelReply;
use kestrel_core::rounds::Round;
use kestrel_validate::schema::SchemaNode;

use crate::errors::{CollaboratorError, HandlerError};

// ─────────────────────────────────────────────────────────────────────────────
// Prompt building
// ─────────────────────────────────────────────────────────────────────────────

/// One conversation message handed to the model querier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Role string (`system`, `user`, `assistant`, `action_result`).
    pub role: String,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Read-only view of loop state handed to the prompt builder.
#[derive(Clone, Copy, Debug)]
pub struct PromptContext<'a> {
    /// Session the loop belongs to.
    pub session_id: &'a str,
    /// Rounds settled so far, oldest first.
    pub rounds: &'a [Round],
}

/// What the prompt builder produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPayload {
    /// Conversation messages for the querier.
    pub messages: Vec<Message>,
    /// Flattened prompt text (diagnostics, token estimation).
    pub prompt_text: String,
    /// Estimated prompt size in tokens.
    pub token_estimate: u32,
}

/// Builds the prompt for each round.
#[async_trait]
pub trait PromptBuilder: Send + Sync {
    /// Build the prompt from loop state.
    async fn build(
        &self,
        context: &PromptContext<'_>,
        progress: &LoopProgress,
        token: &ControlToken,
    ) -> Result<PromptPayload, CollaboratorError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Action catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Description of one available action, advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Action name (unique within a catalog).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Schema the call arguments must satisfy.
    pub input_schema: SchemaNode,
    /// Free-form grouping tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ActionSpec {
    /// Spec with a permissive empty-object schema and no tags.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: SchemaNode::Object {
                properties: std::collections::BTreeMap::new(),
                required: Vec::new(),
                additional_properties: true,
            },
            tags: Vec::new(),
        }
    }
}

/// Lists the actions available to the model this round.
#[async_trait]
pub trait ActionCatalog: Send + Sync {
    /// Current catalog, in stable order.
    async fn available_actions(
        &self,
        token: &ControlToken,
    ) -> Result<Vec<ActionSpec>, CollaboratorError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Model querying
// ─────────────────────────────────────────────────────────────────────────────

/// One model query request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Actions the model may request.
    pub available_actions: Vec<ActionSpec>,
    /// Whether incremental streaming is requested.
    pub streaming_enabled: bool,
}

/// Queries the model.
#[async_trait]
pub trait ModelQuerier: Send + Sync {
    /// Run one query.
    async fn query(
        &self,
        request: &ModelRequest,
        token: &ControlToken,
    ) -> Result<ModelReply, CollaboratorError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Action execution
// ─────────────────────────────────────────────────────────────────────────────

/// Executes one action call.
///
/// The signature is infallible by design: failures are encoded into the
/// returned outcome so that one action's failure can never abort its
/// siblings or the round.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute one call.
    async fn execute(&self, call: &ActionCall, token: &ControlToken) -> ActionOutcome;
}

/// One registered action implementation.
///
/// Handlers return plain content or a [`HandlerError`]; the registry times
/// the run and converts either into an [`ActionOutcome`].
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action name — the exact string advertised to the model.
    fn name(&self) -> &str;

    /// Schema and description advertised to the model.
    fn spec(&self) -> ActionSpec;

    /// Run the action.
    async fn run(
        &self,
        call: &ActionCall,
        token: &ControlToken,
    ) -> Result<String, HandlerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Recovery hook
// ─────────────────────────────────────────────────────────────────────────────

/// Failure boundary: consulted after an action fails, before the failed
/// outcome is recorded.
///
/// Implementations live outside the engine (e.g. an LLM-assisted argument
/// repairer). Returning `Some(text)` replaces the failed outcome's content
/// fed back to the model; the outcome stays marked failed either way.
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    /// Inspect a failure and optionally produce replacement feedback content.
    async fn on_action_failure(&self, call: &ActionCall, error: &str) -> Option<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
