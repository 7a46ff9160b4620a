//! # termwise-runtime
//!
//! Inference backends and the document analysis engine for Termwise.
//!
//! `termwise-core` builds prompts and interprets model output without doing
//! any I/O. This crate adds the part that actually runs a model:
//!
//! - [`InferenceBackend`]: the single seam where model calls happen
//!   - [`LocalBackend`]: in-process llama-family model (`local` feature)
//!   - [`RemoteBackend`]: hosted text-generation endpoint (`remote` feature)
//! - [`DocumentAnalysisEngine`]: prompt -> generate -> interpret
//! - [`BackendConfig`]: environment/file configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use termwise_runtime::{BackendConfig, DocumentAnalysisEngine};
//!
//! let config = BackendConfig::from_env()?;
//! let engine = DocumentAnalysisEngine::from_config(&config)?;
//! engine.warm_up().await?;
//!
//! let analysis = engine.analyze(&document_text).await?;
//! println!("{}", serde_json::to_string_pretty(&analysis)?);
//! ```

pub mod backends;
pub mod cache;
pub mod config;
pub mod engine;

pub use backends::{
    backend_from_config, ApiCredential, BackendError, CredentialSource, ExecutionProfile,
    InferenceBackend, LocalBackend, RemoteBackend,
};
pub use backends::local::ChatTemplate;
pub use cache::{AnalysisCache, CacheKey};
pub use config::{BackendConfig, BackendKind, ConfigError};
pub use engine::{DocumentAnalysisEngine, DocumentAnalysisEngineBuilder, EngineError};

pub use termwise_core::{KeyTerm, SectionSummary, StructuredAnalysis};
