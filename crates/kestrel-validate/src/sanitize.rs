//! Corrective rewriting of unsafe input.
//!
//! Sanitization is non-blocking: it strips script tags, `javascript:`
//! prefixes, residual markup, and control characters, and reports what it
//! removed so the caller can surface warnings. Newlines and tabs survive.

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<script\b[^>]*/?>")
        .expect("script pattern compiles")
});

static JS_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("js prefix pattern compiles"));

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup pattern compiles"));

/// What a sanitization pass did to one string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizeOutcome {
    /// The rewritten value.
    pub value: String,
    /// Whether anything changed.
    pub changed: bool,
    /// Labels of the rewrites applied, in order.
    pub removed: Vec<&'static str>,
}

/// Sanitize one string.
pub fn sanitize_text(input: &str) -> SanitizeOutcome {
    let mut removed = Vec::new();
    let mut value = input.to_owned();

    if SCRIPT_TAG.is_match(&value) {
        value = SCRIPT_TAG.replace_all(&value, "").into_owned();
        removed.push("script_tag");
    }

    if JS_PREFIX.is_match(&value) {
        value = JS_PREFIX.replace_all(&value, "").into_owned();
        removed.push("javascript_prefix");
    }

    if MARKUP.is_match(&value) {
        value = MARKUP.replace_all(&value, "").into_owned();
        removed.push("markup");
    }

    if value.chars().any(is_disallowed_control) {
        value.retain(|c| !is_disallowed_control(c));
        removed.push("control_chars");
    }

    SanitizeOutcome {
        changed: value != input,
        value,
        removed,
    }
}

/// Control characters are stripped except whitespace that carries meaning.
fn is_disallowed_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\r' | '\t')
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
