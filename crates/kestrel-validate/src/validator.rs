//! The four-boundary validator.
//!
//! One [`Validator`] instance guards a loop engine: configuration at
//! construction, every call and batch before dispatch, and every outcome
//! before it is fed back to the model. Sanitization is optional and always
//! advisory — a rewrite produces warnings, never errors.

use std::collections::BTreeMap;

use tracing::debug;

use kestrel_core::calls::{ActionCall, ActionOutcome};
use kestrel_core::rounds::LoopConfig;

use crate::sanitize::sanitize_text;
use crate::sensitive::scan_sensitive_keys;
use crate::types::{
    ValidationError, ValidationLimits, ValidationResult, ValidationWarning, codes,
};

/// Validates loop configuration, calls, batches, and outcomes.
#[derive(Clone, Debug)]
pub struct Validator {
    limits: ValidationLimits,
    sanitize_enabled: bool,
}

impl Validator {
    /// Create a validator with the given ceilings.
    #[must_use]
    pub fn new(limits: ValidationLimits, sanitize_enabled: bool) -> Self {
        Self {
            limits,
            sanitize_enabled,
        }
    }

    /// The configured ceilings.
    #[must_use]
    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate a loop configuration.
    pub fn validate_config(&self, config: &LoopConfig) -> ValidationResult<LoopConfig> {
        let mut errors = Vec::new();

        if config.max_rounds == 0 {
            errors.push(ValidationError::new(
                "maxRounds",
                codes::INVALID_CONFIG,
                "round limit must be at least 1",
            ));
        }
        if config.max_actions_per_round == 0 {
            errors.push(ValidationError::new(
                "maxActionsPerRound",
                codes::INVALID_CONFIG,
                "per-round action limit must be at least 1",
            ));
        } else if config.max_actions_per_round > self.limits.max_actions_per_round {
            errors.push(ValidationError::new(
                "maxActionsPerRound",
                codes::INVALID_CONFIG,
                format!(
                    "per-round action limit {} exceeds ceiling {}",
                    config.max_actions_per_round, self.limits.max_actions_per_round
                ),
            ));
        }
        if config.round_timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                "roundTimeoutMs",
                codes::INVALID_CONFIG,
                "round timeout of 0 would fail every round",
            ));
        }
        if config.time_budget_ms == 0 {
            errors.push(ValidationError::new(
                "timeBudgetMs",
                codes::INVALID_CONFIG,
                "time budget must be positive",
            ));
        }

        if errors.is_empty() {
            ValidationResult::valid(config.clone())
        } else {
            ValidationResult::invalid(errors)
        }
    }

    /// Validate (and optionally sanitize) a single action call.
    pub fn validate_call(&self, call: &ActionCall) -> ValidationResult<ActionCall> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut sanitized = false;
        let mut checked = call.clone();

        if self.sanitize_enabled {
            let name = sanitize_text(&checked.name);
            if name.changed {
                warnings.push(ValidationWarning::new(
                    "name",
                    codes::SANITIZED,
                    format!("name rewritten: removed {}", name.removed.join(", ")),
                ));
                checked.name = name.value;
                sanitized = true;
            }
            let arguments = sanitize_text(&checked.arguments);
            if arguments.changed {
                warnings.push(ValidationWarning::new(
                    "arguments",
                    codes::SANITIZED,
                    format!("arguments rewritten: removed {}", arguments.removed.join(", ")),
                ));
                checked.arguments = arguments.value;
                sanitized = true;
            }
        }

        if checked.name.trim().is_empty() {
            errors.push(ValidationError::new(
                "name",
                codes::EMPTY_NAME,
                "action name is empty",
            ));
        } else if checked.name.len() > self.limits.max_name_len {
            errors.push(ValidationError::new(
                "name",
                codes::NAME_TOO_LONG,
                format!(
                    "name length {} exceeds ceiling {}",
                    checked.name.len(),
                    self.limits.max_name_len
                ),
            ));
        }

        if checked.arguments.len() > self.limits.max_arguments_len {
            errors.push(ValidationError::new(
                "arguments",
                codes::ARGUMENTS_TOO_LONG,
                format!(
                    "argument payload {} bytes exceeds ceiling {}",
                    checked.arguments.len(),
                    self.limits.max_arguments_len
                ),
            ));
        }

        match checked.parse_arguments() {
            Ok(parsed) => warnings.extend(scan_sensitive_keys(&parsed, "arguments")),
            Err(e) => errors.push(ValidationError::new(
                "arguments",
                codes::INVALID_ARGUMENTS_JSON,
                format!("argument payload is not valid JSON: {e}"),
            )),
        }

        if sanitized {
            debug!(call_id = %checked.id, "call sanitized");
        }

        let result = if errors.is_empty() {
            ValidationResult::valid(checked)
        } else {
            ValidationResult::invalid(errors)
        };
        result.with_warnings(warnings).with_sanitized(sanitized)
    }

    /// Validate a batch of action calls.
    ///
    /// Duplicate ids across the batch are reported as one aggregated
    /// `DUPLICATE_IDS` error naming every duplicated id.
    pub fn validate_batch(&self, calls: &[ActionCall]) -> ValidationResult<Vec<ActionCall>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut sanitized = false;
        let mut checked = Vec::with_capacity(calls.len());

        if calls.len() > self.limits.max_actions_per_round {
            errors.push(ValidationError::new(
                "calls",
                codes::BATCH_TOO_LARGE,
                format!(
                    "batch of {} exceeds per-round limit {}",
                    calls.len(),
                    self.limits.max_actions_per_round
                ),
            ));
        }

        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for call in calls {
            *seen.entry(call.id.as_str()).or_insert(0) += 1;
        }
        let duplicates: Vec<&str> = seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| *id)
            .collect();
        if !duplicates.is_empty() {
            errors.push(ValidationError::new(
                "calls",
                codes::DUPLICATE_IDS,
                format!("duplicate call ids: {}", duplicates.join(", ")),
            ));
        }

        for (i, call) in calls.iter().enumerate() {
            let result = self.validate_call(call);
            sanitized |= result.sanitized();
            for w in result.warnings() {
                warnings.push(ValidationWarning::new(
                    format!("calls[{i}].{}", w.field),
                    w.code.clone(),
                    w.message.clone(),
                ));
            }
            if result.is_valid() {
                if let Some(call) = result.into_data() {
                    checked.push(call);
                }
            } else {
                for e in result.errors() {
                    errors.push(ValidationError::new(
                        format!("calls[{i}].{}", e.field),
                        e.code.clone(),
                        e.message.clone(),
                    ));
                }
            }
        }

        let result = if errors.is_empty() {
            ValidationResult::valid(checked)
        } else {
            ValidationResult::invalid(errors)
        };
        result.with_warnings(warnings).with_sanitized(sanitized)
    }

    /// Validate (and optionally sanitize) an action outcome.
    pub fn validate_outcome(&self, outcome: &ActionOutcome) -> ValidationResult<ActionOutcome> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut sanitized = false;
        let mut checked = outcome.clone();

        if self.sanitize_enabled {
            let content = sanitize_text(&checked.content);
            if content.changed {
                warnings.push(ValidationWarning::new(
                    "content",
                    codes::SANITIZED,
                    format!("content rewritten: removed {}", content.removed.join(", ")),
                ));
                checked.content = content.value;
                sanitized = true;
            }
        }

        if checked.content.len() > self.limits.max_result_len {
            errors.push(ValidationError::new(
                "content",
                codes::RESULT_TOO_LONG,
                format!(
                    "result content {} bytes exceeds ceiling {}",
                    checked.content.len(),
                    self.limits.max_result_len
                ),
            ));
        }

        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&checked.content) {
            warnings.extend(scan_sensitive_keys(&parsed, "content"));
        }

        let result = if errors.is_empty() {
            ValidationResult::valid(checked)
        } else {
            ValidationResult::invalid(errors)
        };
        result.with_warnings(warnings).with_sanitized(sanitized)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationLimits::default(), true)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
