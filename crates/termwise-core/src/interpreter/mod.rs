//! Response interpretation.
//!
//! Turns raw model output into a [`StructuredAnalysis`]. Interpretation never
//! fails: output that cannot be parsed or does not satisfy the analysis
//! schema resolves to [`StructuredAnalysis::fallback`].
//!
//! Recovery tiers, in order:
//! 1. trim and strip a ```` ```json ```` fence
//! 2. strict parse of the remaining text
//! 3. strict parse of the greedy `{ ... }` substring
//! 4. fallback structure

mod extract;
mod schema;

pub use extract::{find_brace_object, strip_fences};
pub use schema::{validate_analysis_schema, SchemaError};

use serde_json::Value as JsonValue;

use crate::analysis::StructuredAnalysis;

/// Why interpretation fell back to the placeholder structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Neither the text nor an embedded `{ ... }` span parsed as JSON
    Unparseable,

    /// JSON parsed but did not match the analysis schema
    SchemaViolation(Vec<String>),
}

/// Which tier produced the returned analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretationOutcome {
    /// The cleaned text parsed directly
    Parsed,

    /// An object was recovered from surrounding noise
    Extracted,

    /// Output was unusable; the fallback structure was returned
    Fallback(FallbackReason),
}

impl InterpretationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, InterpretationOutcome::Fallback(_))
    }
}

/// An analysis together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Interpretation {
    pub analysis: StructuredAnalysis,
    pub outcome: InterpretationOutcome,
}

/// Interpret raw model output, discarding the outcome.
///
/// `original_text` is the caller's pre-truncation input; it is only used to
/// build the fallback summary.
pub fn interpret(raw: &str, original_text: &str) -> StructuredAnalysis {
    interpret_detailed(raw, original_text).analysis
}

/// Interpret raw model output and report which tier succeeded.
pub fn interpret_detailed(raw: &str, original_text: &str) -> Interpretation {
    let cleaned = strip_fences(raw);

    let (value, tier) = match extract::parse_strict(cleaned) {
        Some(value) => (value, InterpretationOutcome::Parsed),
        None => match extract::parse_embedded(cleaned) {
            Some(value) => (value, InterpretationOutcome::Extracted),
            None => {
                tracing::debug!(raw_len = raw.len(), "Model output contained no parseable JSON");
                return fallback(original_text, FallbackReason::Unparseable);
            }
        },
    };

    match validate(value) {
        Ok(analysis) => Interpretation {
            analysis,
            outcome: tier,
        },
        Err(violations) => {
            tracing::debug!(?violations, "Model output failed schema validation");
            fallback(original_text, FallbackReason::SchemaViolation(violations))
        }
    }
}

fn validate(value: JsonValue) -> Result<StructuredAnalysis, Vec<String>> {
    validate_analysis_schema(&value)?;
    serde_json::from_value(value).map_err(|e| vec![e.to_string()])
}

fn fallback(original_text: &str, reason: FallbackReason) -> Interpretation {
    Interpretation {
        analysis: StructuredAnalysis::fallback(original_text),
        outcome: InterpretationOutcome::Fallback(reason),
    }
}
