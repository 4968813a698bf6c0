//! Action call types.
//!
//! An [`ActionCall`] is one model-requested invocation of an external
//! capability. Its lifetime is tracked by an [`ActionRecord`] (owned by the
//! identity manager) and its execution produces an [`ActionOutcome`].

use serde::{Deserialize, Serialize};

use crate::ids::CallId;

// ─────────────────────────────────────────────────────────────────────────────
// Action call
// ─────────────────────────────────────────────────────────────────────────────

/// An action call emitted by the model.
///
/// `arguments` is the serialized JSON payload exactly as the model produced
/// it. `original_id` preserves the model-supplied identifier when the
/// identity manager re-keyed the call (models may reuse ids across rounds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCall {
    /// Internally unique call ID.
    pub id: CallId,
    /// Action name.
    pub name: String,
    /// Serialized JSON argument payload.
    pub arguments: String,
    /// Model-supplied ID, when it differs from `id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
}

impl ActionCall {
    /// Create a call with a fresh unique ID and no original ID.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: CallId::new(),
            name: name.into(),
            arguments: arguments.into(),
            original_id: None,
        }
    }

    /// Parse the serialized arguments as JSON.
    ///
    /// Empty arguments parse as an empty object.
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Call status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a tracked action call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Allocated, not yet dispatched.
    Pending,
    /// Currently executing.
    Executing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Abandoned due to cancellation.
    Cancelled,
}

impl CallStatus {
    /// Whether the call has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Result of executing one action call.
///
/// Failures are encoded here rather than as errors: a failed action becomes
/// a failed outcome fed back to the model, never a loop-level error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Call this outcome belongs to.
    pub call_id: CallId,
    /// Result content returned to the model.
    pub content: String,
    /// Whether execution succeeded.
    pub success: bool,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// Error description when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create a successful outcome.
#[must_use]
pub fn success_outcome(
    call_id: CallId,
    content: impl Into<String>,
    duration_ms: u64,
) -> ActionOutcome {
    ActionOutcome {
        call_id,
        content: content.into(),
        success: true,
        duration_ms,
        error: None,
    }
}

/// Create a failed outcome. The error text doubles as the content fed back
/// to the model.
#[must_use]
pub fn failure_outcome(
    call_id: CallId,
    error: impl Into<String>,
    duration_ms: u64,
) -> ActionOutcome {
    let error = error.into();
    ActionOutcome {
        call_id,
        content: error.clone(),
        success: false,
        duration_ms,
        error: Some(error),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action record
// ─────────────────────────────────────────────────────────────────────────────

/// Bookkeeping record for one allocated call, owned by the identity manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// Internally unique ID.
    pub id: CallId,
    /// Model-supplied ID, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    /// Action name.
    pub name: String,
    /// Serialized argument payload.
    pub arguments: String,
    /// Parent call for nested delegation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CallId>,
    /// Child calls spawned under this one.
    #[serde(default)]
    pub child_ids: Vec<CallId>,
    /// Lifecycle status.
    pub status: CallStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Monotonic allocation sequence (drives history eviction order).
    pub sequence: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_call_has_unique_id() {
        let a = ActionCall::new("read", "{}");
        let b = ActionCall::new("read", "{}");
        assert_ne!(a.id, b.id);
        assert!(a.original_id.is_none());
    }

    #[test]
    fn parse_arguments_object() {
        let call = ActionCall::new("read", r#"{"path":"/tmp/x"}"#);
        let value = call.parse_arguments().unwrap();
        assert_eq!(value["path"], "/tmp/x");
    }

    #[test]
    fn parse_arguments_empty_is_object() {
        let call = ActionCall::new("read", "");
        let value = call.parse_arguments().unwrap();
        assert!(value.as_object().unwrap().is_empty());
    }

    #[test]
    fn parse_arguments_invalid_errors() {
        let call = ActionCall::new("read", "{not json");
        assert!(call.parse_arguments().is_err());
    }

    #[test]
    fn call_serde_roundtrip() {
        let call = ActionCall {
            id: CallId::from("call_1"),
            name: "search".into(),
            arguments: r#"{"q":"rust"}"#.into(),
            original_id: Some("toolu_1".into()),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["originalId"], "toolu_1");
        let back: ActionCall = serde_json::from_value(json).unwrap();
        assert_eq!(call, back);
    }

    #[test]
    fn status_terminal() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::Cancelled.is_terminal());
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::Executing.is_terminal());
    }

    #[test]
    fn status_serde() {
        assert_eq!(
            serde_json::to_string(&CallStatus::Executing).unwrap(),
            "\"executing\""
        );
        assert_eq!(
            serde_json::to_string(&CallStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn success_outcome_has_no_error() {
        let o = success_outcome(CallId::from("c1"), "done", 12);
        assert!(o.success);
        assert!(o.error.is_none());
        assert_eq!(o.duration_ms, 12);
    }

    #[test]
    fn failure_outcome_mirrors_error_in_content() {
        let o = failure_outcome(CallId::from("c1"), "disk full", 3);
        assert!(!o.success);
        assert_eq!(o.content, "disk full");
        assert_eq!(o.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn outcome_serde_skips_none_error() {
        let o = success_outcome(CallId::from("c1"), "ok", 1);
        let json = serde_json::to_value(&o).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["callId"], "c1");
    }

    #[test]
    fn record_serde_roundtrip() {
        let record = ActionRecord {
            id: CallId::from("call_2"),
            original_id: Some("toolu_9".into()),
            name: "fetch".into(),
            arguments: "{}".into(),
            parent_id: Some(CallId::from("call_1")),
            child_ids: vec![CallId::from("call_3")],
            status: CallStatus::Pending,
            created_at: "2026-01-01T00:00:00Z".into(),
            sequence: 7,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ActionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
