//! Cleanup and JSON recovery for free-form model output.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

/// Opening fence token models use for JSON blocks.
pub const JSON_FENCE_OPEN: &str = "```json";

/// Closing fence token.
pub const FENCE_CLOSE: &str = "```";

lazy_static! {
    /// Greedy match from the first `{` to the last `}`, across lines.
    static ref BRACE_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// Trim whitespace and strip a surrounding ```` ```json ```` fence.
///
/// Prefix/suffix removal only: the closing fence is stripped only when the
/// opening fence was present.
pub fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    match text.strip_prefix(JSON_FENCE_OPEN) {
        Some(rest) => rest.strip_suffix(FENCE_CLOSE).unwrap_or(rest).trim(),
        None => text,
    }
}

/// Strict parse of the whole text.
pub fn parse_strict(text: &str) -> Option<JsonValue> {
    serde_json::from_str(text).ok()
}

/// The first brace-delimited candidate object in `text`, if any.
pub fn find_brace_object(text: &str) -> Option<&str> {
    BRACE_OBJECT.find(text).map(|m| m.as_str())
}

/// Strict parse of the brace-delimited candidate in `text`.
pub fn parse_embedded(text: &str) -> Option<JsonValue> {
    find_brace_object(text).and_then(parse_strict)
}
