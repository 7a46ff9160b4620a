//! Prompt construction for document analysis.
//!
//! The instruction text is fixed; only the document body varies. Two dialects
//! carry the same instructions:
//! - `Chat`: instructions in a separate system turn (local chat models)
//! - `SingleTurn`: instructions embedded in the user turn (hosted text endpoints)

use serde::{Deserialize, Serialize};

/// Default character cap applied to input text before prompting.
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 3000;

/// Marker appended to truncated input.
pub const TRUNCATION_MARKER: &str = "...";

/// Instructions establishing the analyst role and the required JSON shape.
pub const ANALYST_INSTRUCTIONS: &str = r#"You are an expert legal analyst who specializes in explaining complex documents to a layperson.
Your task is to analyze documents and provide a structured, easy-to-understand breakdown in a valid JSON format.

The JSON object must have exactly the following four keys:
1. "document_type": A string identifying the type of document (e.g., "Privacy Policy", "Terms of Service").
2. "overall_summary": A string providing a brief, one-paragraph overview of the document's main purpose.
3. "key_terms": An array of objects. Each object must have two keys:
    - "term": A string containing a significant keyword or phrase (e.g., "Personal Information").
    - "definition": A string explaining what that term means in simple language.
4. "sectional_summaries": An array of objects. Each object must represent a distinct section of the document and have two keys:
    - "section_title": A string with a descriptive title for that section.
    - "detailed_summary": A string providing a comprehensive summary of the section's content.

Generate ONLY the JSON object as described, with no additional text before or after.
Do not wrap the JSON in markdown code fences."#;

/// How instructions are laid out across turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDialect {
    /// Separate system turn followed by a user turn
    Chat,

    /// A single user turn carrying both instructions and document
    SingleTurn,
}

/// A prompt ready to hand to an inference backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt {
    /// System turn (absent in the single-turn dialect)
    pub system: Option<String>,

    /// User turn
    pub user: String,
}

impl Prompt {
    /// Render as one text block for transports without roles.
    pub fn flatten(&self) -> String {
        match &self.system {
            Some(system) => format!("{}\n\n{}", system, self.user),
            None => self.user.clone(),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
///
/// Counts Unicode scalar values, not bytes and not tokens. Text at or under
/// the cap is returned unchanged.
pub fn truncate_input(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&text[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => text.to_string(),
    }
}

/// Builds analysis prompts for one dialect and input cap.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_input_length: usize,
    dialect: PromptDialect,
}

impl PromptBuilder {
    pub fn new(max_input_length: usize, dialect: PromptDialect) -> Self {
        Self {
            max_input_length,
            dialect,
        }
    }

    pub fn dialect(&self) -> PromptDialect {
        self.dialect
    }

    pub fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    /// Whether `text` would be truncated by [`build`](Self::build).
    pub fn would_truncate(&self, text: &str) -> bool {
        text.chars().nth(self.max_input_length).is_some()
    }

    /// Build the prompt for `text`.
    pub fn build(&self, text: &str) -> Prompt {
        let document = truncate_input(text, self.max_input_length);
        let request = format!(
            "Please analyze the following document:\n\n{}\n\nJSON Response:",
            document
        );

        match self.dialect {
            PromptDialect::Chat => Prompt {
                system: Some(ANALYST_INSTRUCTIONS.to_string()),
                user: request,
            },
            PromptDialect::SingleTurn => Prompt {
                system: None,
                user: format!("{}\n\n{}", ANALYST_INSTRUCTIONS, request),
            },
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_LENGTH, PromptDialect::Chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_input_untouched() {
        let text = "This Privacy Policy explains what we collect.";
        assert_eq!(truncate_input(text, 3000), text);
    }

    #[test]
    fn test_long_input_truncated_with_marker() {
        let text = "a".repeat(3500);
        let truncated = truncate_input(&text, 3000);
        assert_eq!(truncated.chars().count(), 3000 + TRUNCATION_MARKER.len());
        assert!(truncated.ends_with("..."));
        assert!(truncated.starts_with(&"a".repeat(3000)));
    }

    #[test]
    fn test_exact_length_is_not_truncated() {
        let text = "b".repeat(3000);
        assert_eq!(truncate_input(&text, 3000), text);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "§".repeat(10);
        let truncated = truncate_input(&text, 4);
        assert_eq!(truncated, "§§§§...");
    }

    #[test]
    fn test_chat_dialect_separates_system_turn() {
        let prompt = PromptBuilder::new(3000, PromptDialect::Chat).build("Cookie Policy");
        let system = prompt.system.as_deref().unwrap();
        assert!(system.contains("\"document_type\""));
        assert!(system.contains("\"sectional_summaries\""));
        assert!(prompt.user.contains("Cookie Policy"));
        assert!(prompt.user.ends_with("JSON Response:"));
        assert!(!prompt.user.contains("expert legal analyst"));
    }

    #[test]
    fn test_single_turn_dialect_embeds_instructions() {
        let prompt = PromptBuilder::new(3000, PromptDialect::SingleTurn).build("Cookie Policy");
        assert!(prompt.system.is_none());
        assert!(prompt.user.starts_with(ANALYST_INSTRUCTIONS));
        assert!(prompt.user.contains("Cookie Policy"));
    }

    #[test]
    fn test_dialects_carry_equivalent_instructions() {
        let chat = PromptBuilder::new(100, PromptDialect::Chat).build("Terms");
        let single = PromptBuilder::new(100, PromptDialect::SingleTurn).build("Terms");
        assert_eq!(chat.flatten(), single.flatten());
    }

    #[test]
    fn test_instructions_name_all_required_keys() {
        for key in [
            "document_type",
            "overall_summary",
            "key_terms",
            "term",
            "definition",
            "sectional_summaries",
            "section_title",
            "detailed_summary",
        ] {
            assert!(
                ANALYST_INSTRUCTIONS.contains(&format!("\"{}\"", key)),
                "instructions missing key {}",
                key
            );
        }
        assert!(ANALYST_INSTRUCTIONS.contains("no additional text"));
        assert!(ANALYST_INSTRUCTIONS.contains("code fences"));
    }

    #[test]
    fn test_builder_truncates_document() {
        let builder = PromptBuilder::new(10, PromptDialect::Chat);
        let text = "0123456789ABCDEF";
        assert!(builder.would_truncate(text));
        let prompt = builder.build(text);
        assert!(prompt.user.contains("0123456789..."));
        assert!(!prompt.user.contains("ABCDEF"));
    }

    proptest! {
        #[test]
        fn prop_truncation_is_bounded(text in ".{0,400}", max in 0usize..300) {
            let truncated = truncate_input(&text, max);
            prop_assert!(truncated.chars().count() <= max + TRUNCATION_MARKER.chars().count());
        }

        #[test]
        fn prop_truncation_is_idempotent_at_cap(text in ".{0,400}", max in 0usize..300) {
            let capped: String = text.chars().take(max).collect();
            prop_assert_eq!(truncate_input(&capped, max), capped.clone());
        }

        #[test]
        fn prop_truncation_keeps_prefix(text in ".{0,400}", max in 0usize..300) {
            let truncated = truncate_input(&text, max);
            let kept: String = text.chars().take(max).collect();
            prop_assert!(truncated.starts_with(&kept));
        }
    }
}
