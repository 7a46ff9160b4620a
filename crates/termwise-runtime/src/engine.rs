//! Document analysis engine.
//!
//! Composes prompt construction, one backend call and interpretation:
//!
//! ```text
//! text -> PromptBuilder::build -> InferenceBackend::generate -> interpret -> StructuredAnalysis
//! ```
//!
//! Output the model gets wrong is absorbed by the interpreter and returned
//! as the fallback analysis. Backend failures are never absorbed: they are
//! returned to the caller as [`BackendError`] so "the model produced
//! nonsense" stays distinguishable from "the model was unreachable".

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use termwise_core::{
    interpret_detailed, InterpretationOutcome, PromptBuilder, StructuredAnalysis,
    DEFAULT_MAX_INPUT_LENGTH,
};

use crate::backends::{backend_from_config, BackendError, InferenceBackend};
use crate::cache::{AnalysisCache, CacheKey};
use crate::config::{BackendConfig, ConfigError};

/// Errors from constructing an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Backend not configured: {0}")]
    BackendNotConfigured(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Turns free-form documents into [`StructuredAnalysis`] values.
///
/// `Send + Sync`; share it behind an `Arc` to serve concurrent requests.
pub struct DocumentAnalysisEngine {
    backend: Arc<dyn InferenceBackend>,
    prompts: PromptBuilder,
    cache: Option<AnalysisCache>,
}

impl DocumentAnalysisEngine {
    /// Create an engine over `backend`. The prompt dialect follows the backend.
    pub fn new(backend: Arc<dyn InferenceBackend>, max_input_length: usize) -> Self {
        let prompts = PromptBuilder::new(max_input_length, backend.dialect());
        Self {
            backend,
            prompts,
            cache: None,
        }
    }

    /// Validate `config` and build the backend it selects.
    pub fn from_config(config: &BackendConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let backend = backend_from_config(config)?;

        let mut engine = Self::new(backend, config.max_input_length);
        if config.cache_capacity > 0 {
            engine.cache = Some(AnalysisCache::new(config.cache_capacity, config.cache_ttl));
        }

        tracing::info!(
            backend = engine.backend.name(),
            model = %config.model_name,
            max_input_length = config.max_input_length,
            cache_capacity = config.cache_capacity,
            "Document analysis engine ready"
        );
        Ok(engine)
    }

    pub fn builder() -> DocumentAnalysisEngineBuilder {
        DocumentAnalysisEngineBuilder::new()
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn prompt_builder(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Initialize the backend eagerly (e.g. load the local model).
    pub async fn warm_up(&self) -> Result<(), BackendError> {
        let started = Instant::now();
        self.backend.warm_up().await?;
        tracing::info!(
            backend = self.backend.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backend warmed up"
        );
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    /// Analyze one document.
    ///
    /// Returns a complete analysis (possibly the fallback structure) or the
    /// backend's fatal error.
    pub async fn analyze(&self, text: &str) -> Result<StructuredAnalysis, BackendError> {
        let backend = self.backend.name();
        let truncated = self.prompts.would_truncate(text);
        let prompt = self.prompts.build(text);

        tracing::debug!(
            backend,
            input_chars = text.chars().count(),
            truncated,
            "Analyzing document"
        );

        let key = self.cache.as_ref().map(|_| CacheKey::new(backend, &prompt));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key).await {
                tracing::debug!(backend, "Analysis served from cache");
                return Ok(hit);
            }
        }

        let started = Instant::now();
        let raw = self.backend.generate(&prompt).await.inspect_err(|e| {
            tracing::warn!(
                backend,
                kind = e.kind(),
                error = %e,
                "Backend generation failed"
            );
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let interpretation = interpret_detailed(&raw, text);
        match &interpretation.outcome {
            InterpretationOutcome::Fallback(reason) => {
                tracing::warn!(
                    backend,
                    elapsed_ms,
                    output_chars = raw.chars().count(),
                    reason = ?reason,
                    "Model output unusable, returning fallback analysis"
                );
            }
            outcome => {
                tracing::info!(
                    backend,
                    elapsed_ms,
                    outcome = ?outcome,
                    document_type = %interpretation.analysis.document_type,
                    "Document analyzed"
                );
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.insert(key, interpretation.analysis.clone()).await;
                }
            }
        }

        Ok(interpretation.analysis)
    }
}

/// Builder for [`DocumentAnalysisEngine`].
pub struct DocumentAnalysisEngineBuilder {
    backend: Option<Arc<dyn InferenceBackend>>,
    max_input_length: usize,
    cache: Option<AnalysisCache>,
}

impl DocumentAnalysisEngineBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            cache: None,
        }
    }

    /// Set the inference backend.
    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the input character cap.
    pub fn max_input_length(mut self, max_input_length: usize) -> Self {
        self.max_input_length = max_input_length;
        self
    }

    /// Enable result caching.
    pub fn cache(mut self, cache: AnalysisCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<DocumentAnalysisEngine, EngineError> {
        let backend = self
            .backend
            .ok_or_else(|| EngineError::BackendNotConfigured("No backend set".to_string()))?;

        let mut engine = DocumentAnalysisEngine::new(backend, self.max_input_length);
        engine.cache = self.cache;
        Ok(engine)
    }
}

impl Default for DocumentAnalysisEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
