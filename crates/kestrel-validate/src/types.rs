//! Validation result types and limits.

use serde::{Deserialize, Serialize};

/// Stable error/warning codes.
pub mod codes {
    /// Action name is empty.
    pub const EMPTY_NAME: &str = "EMPTY_NAME";
    /// Action name exceeds the length ceiling.
    pub const NAME_TOO_LONG: &str = "NAME_TOO_LONG";
    /// Serialized arguments exceed the length ceiling.
    pub const ARGUMENTS_TOO_LONG: &str = "ARGUMENTS_TOO_LONG";
    /// Arguments are not valid JSON.
    pub const INVALID_ARGUMENTS_JSON: &str = "INVALID_ARGUMENTS_JSON";
    /// A batch contains duplicated call ids.
    pub const DUPLICATE_IDS: &str = "DUPLICATE_IDS";
    /// A batch exceeds the per-round action ceiling.
    pub const BATCH_TOO_LARGE: &str = "BATCH_TOO_LARGE";
    /// Result content exceeds the length ceiling.
    pub const RESULT_TOO_LONG: &str = "RESULT_TOO_LONG";
    /// A configuration field is out of range.
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    /// Sanitization rewrote a field (warning).
    pub const SANITIZED: &str = "SANITIZED";
    /// A key looks like it carries a secret (warning).
    pub const SENSITIVE_KEY: &str = "SENSITIVE_KEY";
    /// Value has the wrong JSON type.
    pub const TYPE_MISMATCH: &str = "TYPE_MISMATCH";
    /// Numeric value outside the allowed range.
    pub const OUT_OF_RANGE: &str = "OUT_OF_RANGE";
    /// String or array length outside the allowed range.
    pub const LENGTH: &str = "LENGTH";
    /// String does not match the schema pattern.
    pub const PATTERN_MISMATCH: &str = "PATTERN_MISMATCH";
    /// String is not one of the allowed enum values.
    pub const ENUM_MISMATCH: &str = "ENUM_MISMATCH";
    /// A required object field is missing.
    pub const MISSING_REQUIRED: &str = "MISSING_REQUIRED";
    /// An object field is not allowed by the schema.
    pub const ADDITIONAL_PROPERTY: &str = "ADDITIONAL_PROPERTY";
    /// A schema pattern failed to compile.
    pub const INVALID_PATTERN: &str = "INVALID_PATTERN";
}

/// A blocking validation problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Path of the offending field (e.g. `calls[2].name`).
    pub field: String,
    /// Stable code from [`codes`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    /// Create an error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// An advisory finding. Warnings never block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    /// Path of the field.
    pub field: String,
    /// Stable code from [`codes`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of validating one boundary.
///
/// `data` is present only on the valid path — the constructors make an
/// invalid result with data unrepresentable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult<T> {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
    sanitized: bool,
}

impl<T> ValidationResult<T> {
    /// A valid result carrying (possibly sanitized) data.
    #[must_use]
    pub fn valid(data: T) -> Self {
        Self {
            valid: true,
            data: Some(data),
            errors: Vec::new(),
            warnings: Vec::new(),
            sanitized: false,
        }
    }

    /// An invalid result. Never carries data.
    #[must_use]
    pub fn invalid(errors: Vec<ValidationError>) -> Self {
        debug_assert!(!errors.is_empty(), "invalid result needs at least one error");
        Self {
            valid: false,
            data: None,
            errors,
            warnings: Vec::new(),
            sanitized: false,
        }
    }

    /// Attach warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<ValidationWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Mark that sanitization changed the data.
    #[must_use]
    pub fn with_sanitized(mut self, sanitized: bool) -> Self {
        self.sanitized = sanitized;
        self
    }

    /// Whether validation passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The validated data, present only when valid.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Consume the result, returning the data when valid.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Blocking errors, in detection order.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Advisory warnings, in detection order.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Whether sanitization rewrote anything.
    #[must_use]
    pub fn sanitized(&self) -> bool {
        self.sanitized
    }

    /// Join error messages into one line (for failed-outcome content).
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Enforced ceilings for validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLimits {
    /// Maximum action name length in bytes.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
    /// Maximum serialized argument length in bytes.
    #[serde(default = "default_max_arguments_len")]
    pub max_arguments_len: usize,
    /// Maximum result content length in bytes.
    #[serde(default = "default_max_result_len")]
    pub max_result_len: usize,
    /// Maximum actions per round.
    #[serde(default = "default_max_actions_per_round")]
    pub max_actions_per_round: usize,
}

const fn default_max_name_len() -> usize {
    128
}

const fn default_max_arguments_len() -> usize {
    100_000
}

const fn default_max_result_len() -> usize {
    400_000
}

const fn default_max_actions_per_round() -> usize {
    16
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_name_len: default_max_name_len(),
            max_arguments_len: default_max_arguments_len(),
            max_result_len: default_max_result_len(),
            max_actions_per_round: default_max_actions_per_round(),
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
    fn valid_result_carries_data() {
        let r = ValidationResult::valid(42u32);
        assert!(r.is_valid());
        assert_eq!(r.data(), Some(&42));
        assert!(r.errors().is_empty());
        assert!(!r.sanitized());
    }

    #[test]
    fn invalid_result_never_carries_data() {
        let r: ValidationResult<u32> = ValidationResult::invalid(vec![ValidationError::new(
            "name",
            codes::EMPTY_NAME,
            "name is empty",
        )]);
        assert!(!r.is_valid());
        assert!(r.data().is_none());
        assert_eq!(r.errors().len(), 1);
        assert!(r.into_data().is_none());
    }

    #[test]
    fn warnings_do_not_invalidate() {
        let r = ValidationResult::valid("x").with_warnings(vec![ValidationWarning::new(
            "arguments.password",
            codes::SENSITIVE_KEY,
            "key looks sensitive",
        )]);
        assert!(r.is_valid());
        assert_eq!(r.warnings().len(), 1);
    }

    #[test]
    fn sanitized_flag() {
        let r = ValidationResult::valid("clean").with_sanitized(true);
        assert!(r.sanitized());
    }

    #[test]
    fn error_summary_joins_codes() {
        let r: ValidationResult<()> = ValidationResult::invalid(vec![
            ValidationError::new("a", codes::EMPTY_NAME, "empty"),
            ValidationError::new("b", codes::NAME_TOO_LONG, "too long"),
        ]);
        let summary = r.error_summary();
        assert!(summary.contains("EMPTY_NAME"));
        assert!(summary.contains("too long"));
        assert!(summary.contains("; "));
    }

    #[test]
    fn limits_defaults() {
        let limits = ValidationLimits::default();
        assert_eq!(limits.max_name_len, 128);
        assert_eq!(limits.max_arguments_len, 100_000);
        assert_eq!(limits.max_result_len, 400_000);
        assert_eq!(limits.max_actions_per_round, 16);
    }

    #[test]
    fn limits_serde_defaults_apply() {
        let limits: ValidationLimits = serde_json::from_str("{}").unwrap();
        assert_eq!(limits.max_name_len, 128);
    }

    #[test]
    fn result_serde_skips_absent_data() {
        let r: ValidationResult<u32> =
            ValidationResult::invalid(vec![ValidationError::new("f", "C", "m")]);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["valid"], false);
    }
}
