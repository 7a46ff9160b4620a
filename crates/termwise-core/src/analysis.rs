//! Structured analysis types.
//!
//! These are the only shapes that leave the engine. Field names are part of
//! the wire format and must not be renamed.

use serde::{Deserialize, Serialize};

/// Document type reported when model output could not be understood.
pub const UNKNOWN_DOCUMENT_TYPE: &str = "Unknown Document";

/// Number of characters of the original input embedded in a fallback summary.
pub const FALLBACK_EXCERPT_CHARS: usize = 200;

/// A layperson-readable breakdown of a legal or policy document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuredAnalysis {
    /// What kind of document this is (e.g., "Privacy Policy")
    pub document_type: String,

    /// One-paragraph overview of the document's purpose
    pub overall_summary: String,

    /// Significant terms with plain-language definitions
    pub key_terms: Vec<KeyTerm>,

    /// One summary per distinct section, in document order
    pub sectional_summaries: Vec<SectionSummary>,
}

/// A significant term and what it means in plain language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyTerm {
    pub term: String,
    pub definition: String,
}

/// Summary of a single section of the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionSummary {
    /// Descriptive title for the section
    pub section_title: String,

    /// Comprehensive summary of the section's content
    pub detailed_summary: String,

    /// Shorter plain-language variant; only some backends produce it
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub simple_summary: String,
}

impl StructuredAnalysis {
    /// The deterministic placeholder returned when model output is unusable.
    ///
    /// Embeds the first [`FALLBACK_EXCERPT_CHARS`] characters of the original
    /// (pre-truncation) input so a reader can still tell what was submitted.
    pub fn fallback(original_text: &str) -> Self {
        let excerpt: String = original_text.chars().take(FALLBACK_EXCERPT_CHARS).collect();
        Self {
            document_type: UNKNOWN_DOCUMENT_TYPE.to_string(),
            overall_summary: format!(
                "Failed to generate summary. The document appears to be: {}...",
                excerpt
            ),
            key_terms: Vec::new(),
            sectional_summaries: Vec::new(),
        }
    }

    /// Whether this is the "Unknown Document" placeholder.
    pub fn is_fallback(&self) -> bool {
        self.document_type == UNKNOWN_DOCUMENT_TYPE
            && self.key_terms.is_empty()
            && self.sectional_summaries.is_empty()
    }
}

impl KeyTerm {
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            definition: definition.into(),
        }
    }
}

impl SectionSummary {
    /// Create a section summary without a simple variant.
    pub fn new(section_title: impl Into<String>, detailed_summary: impl Into<String>) -> Self {
        Self {
            section_title: section_title.into(),
            detailed_summary: detailed_summary.into(),
            simple_summary: String::new(),
        }
    }

    pub fn with_simple_summary(mut self, simple_summary: impl Into<String>) -> Self {
        self.simple_summary = simple_summary.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_shape() {
        let fallback = StructuredAnalysis::fallback("Privacy Policy for Example Inc.");
        assert_eq!(fallback.document_type, "Unknown Document");
        assert!(fallback.key_terms.is_empty());
        assert!(fallback.sectional_summaries.is_empty());
        assert!(fallback.overall_summary.contains("Privacy Policy for Example Inc."));
        assert!(fallback.is_fallback());
    }

    #[test]
    fn test_fallback_excerpt_is_capped_by_characters() {
        let text = "é".repeat(500);
        let fallback = StructuredAnalysis::fallback(&text);
        let embedded = fallback.overall_summary.matches('é').count();
        assert_eq!(embedded, FALLBACK_EXCERPT_CHARS);
    }

    #[test]
    fn test_serialized_field_names() {
        let analysis = StructuredAnalysis {
            document_type: "Terms of Service".to_string(),
            overall_summary: "Rules for using the service.".to_string(),
            key_terms: vec![KeyTerm::new("Account", "Your login with the service")],
            sectional_summaries: vec![SectionSummary::new("Termination", "Either side may end it.")],
        };

        let value = serde_json::to_value(&analysis).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert!(object.contains_key("document_type"));
        assert!(object.contains_key("overall_summary"));
        assert!(object.contains_key("key_terms"));
        assert!(object.contains_key("sectional_summaries"));

        // Empty simple_summary is omitted
        let section = &value["sectional_summaries"][0];
        assert!(section.get("simple_summary").is_none());
    }

    #[test]
    fn test_simple_summary_defaults_to_empty() {
        let section: SectionSummary = serde_json::from_value(serde_json::json!({
            "section_title": "Cookies",
            "detailed_summary": "The site stores small files on your device."
        }))
        .unwrap();
        assert!(section.simple_summary.is_empty());

        let section = section.with_simple_summary("They use cookies.");
        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value["simple_summary"], "They use cookies.");
    }
}
