//! Request signal detection
//!
//! Cheap, deterministic pattern checks used when a caller submits raw input
//! text instead of pre-computed flags. Detection can only raise a flag; it
//! never clears one the caller set.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tiers::RequestContext;

/// Phrases indicating the response must be structured
static STRUCTURED_OUTPUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\bjson\b|\bstructured\b|\bschema\b|\{\s*"|\bparse\b.*\boutput\b"#,
    )
    .expect("structured output pattern is valid")
});

/// Content that should go to a more careful model: credentials, financial
/// details, national ID numbers (9 digits + V/X, or 12 digits) and phone
/// numbers
static SENSITIVE_CONTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bnic\b|\bpassword\b|\bcredit\s*card\b|\bbank\b.*\baccount\b|\bconfidential\b|\bprivate\b|\bsecret\b|\d{9}[vx]|\d{12}|\+94\d{9}|0\d{9}",
    )
    .expect("sensitive content pattern is valid")
});

/// Whether the text asks for structured output
pub fn requires_structured_output(text: &str) -> bool {
    STRUCTURED_OUTPUT_RE.is_match(text)
}

/// Whether the text contains sensitive content
pub fn contains_sensitive_content(text: &str) -> bool {
    SENSITIVE_CONTENT_RE.is_match(text)
}

/// Raise the structured-output and sensitivity flags from the input text
pub fn apply_text_signals(mut context: RequestContext, text: &str) -> RequestContext {
    context.needs_structured_output |= requires_structured_output(text);
    context.sensitivity |= contains_sensitive_content(text);
    context
}
