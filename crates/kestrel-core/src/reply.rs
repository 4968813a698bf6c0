//! Model reply types — the model-side half of an orchestration round.
//!
//! A [`ModelReply`] is what the model querier collaborator returns: a status,
//! an optional response value, and the actions the model requested. Requested
//! actions carry the model's own ids; the identity manager re-keys them into
//! [`crate::calls::ActionCall`]s before execution.

use serde::{Deserialize, Serialize};

/// Outcome status of one model query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// The model produced a usable reply.
    Success,
    /// The query failed.
    Error,
    /// The query was cancelled mid-flight.
    Cancelled,
}

impl ReplyStatus {
    /// Whether the reply allows the loop to continue.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// An action requested by the model, prior to identity re-keying.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedAction {
    /// Model-supplied ID (may collide or repeat across rounds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Action name.
    pub name: String,
    /// Serialized JSON argument payload.
    pub arguments: String,
}

/// One model reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReply {
    /// Query status.
    pub status: ReplyStatus,
    /// Text response, if the model produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_value: Option<String>,
    /// Actions the model requested this round.
    #[serde(default)]
    pub requested_actions: Vec<RequestedAction>,
}

impl ModelReply {
    /// A successful text-only reply.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Success,
            response_value: Some(value.into()),
            requested_actions: Vec::new(),
        }
    }

    /// A successful reply requesting actions.
    #[must_use]
    pub fn with_actions(actions: Vec<RequestedAction>) -> Self {
        Self {
            status: ReplyStatus::Success,
            response_value: None,
            requested_actions: actions,
        }
    }

    /// A failed reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            response_value: Some(message.into()),
            requested_actions: Vec::new(),
        }
    }

    /// A cancelled reply.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            status: ReplyStatus::Cancelled,
            response_value: None,
            requested_actions: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_reply_is_success() {
        let reply = ModelReply::text("done");
        assert!(reply.status.is_success());
        assert_eq!(reply.response_value.as_deref(), Some("done"));
        assert!(reply.requested_actions.is_empty());
    }

    #[test]
    fn with_actions_carries_requests() {
        let reply = ModelReply::with_actions(vec![RequestedAction {
            id: Some("toolu_1".into()),
            name: "read".into(),
            arguments: "{}".into(),
        }]);
        assert!(reply.status.is_success());
        assert_eq!(reply.requested_actions.len(), 1);
        assert_eq!(reply.requested_actions[0].name, "read");
    }

    #[test]
    fn error_and_cancelled_are_not_success() {
        assert!(!ModelReply::error("boom").status.is_success());
        assert!(!ModelReply::cancelled().status.is_success());
    }

    #[test]
    fn status_serde() {
        assert_eq!(
            serde_json::to_string(&ReplyStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&ReplyStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn reply_serde_roundtrip() {
        let reply = ModelReply::with_actions(vec![RequestedAction {
            id: None,
            name: "search".into(),
            arguments: r#"{"q":"x"}"#.into(),
        }]);
        let json = serde_json::to_string(&reply).unwrap();
        let back: ModelReply = serde_json::from_str(&json).unwrap();
        assert_eq!(reply, back);
    }

    #[test]
    fn requested_actions_default_empty() {
        let reply: ModelReply = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(reply.requested_actions.is_empty());
        assert!(reply.response_value.is_none());
    }
}
