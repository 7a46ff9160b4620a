//! # termwise-core
//!
//! Deterministic building blocks for Termwise document analysis.
//!
//! This crate owns the two pure halves of the analysis pipeline:
//! - **Prompt construction**: truncation policy and the fixed JSON contract
//! - **Response interpretation**: fence stripping, JSON recovery, schema
//!   validation, and the fallback structure
//!
//! ## Key Guarantees
//!
//! 1. **No model calls**: nothing here performs I/O or inference
//! 2. **Total interpretation**: [`interpret`] always returns a well-typed
//!    [`StructuredAnalysis`], never an error
//! 3. **Deterministic**: same input always produces the same prompt and the
//!    same interpretation
//!
//! ## Example
//!
//! ```rust
//! use termwise_core::{interpret, PromptBuilder, PromptDialect};
//!
//! let builder = PromptBuilder::new(3000, PromptDialect::Chat);
//! let prompt = builder.build("This Cookie Policy explains...");
//! assert!(prompt.system.is_some());
//!
//! let raw = r#"Sure! {"document_type": "Cookie Policy", "overall_summary": "...",
//!              "key_terms": [], "sectional_summaries": []}"#;
//! let analysis = interpret(raw, "This Cookie Policy explains...");
//! assert_eq!(analysis.document_type, "Cookie Policy");
//! ```

pub mod analysis;
pub mod interpreter;
pub mod prompt;

pub use analysis::{KeyTerm, SectionSummary, StructuredAnalysis, UNKNOWN_DOCUMENT_TYPE};
pub use interpreter::{
    interpret, interpret_detailed, FallbackReason, Interpretation, InterpretationOutcome,
};
pub use prompt::{
    truncate_input, Prompt, PromptBuilder, PromptDialect, DEFAULT_MAX_INPUT_LENGTH,
    TRUNCATION_MARKER,
};
