//! Inference backend abstractions.
//!
//! A backend turns a [`Prompt`] into raw generated text. Two variants exist:
//! - [`LocalBackend`]: in-process execution of a (optionally quantized) model
//! - [`RemoteBackend`]: a hosted text-generation endpoint
//!
//! Backends never leak their own error types; everything crosses this
//! boundary as a [`BackendError`].
//!
//! ## Security
//!
//! The remote backend loads its credential through the [`secrets`] module.
//! See [`ApiCredential`] for the handling rules.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use termwise_core::{Prompt, PromptDialect};
use thiserror::Error;

use crate::config::{BackendConfig, BackendKind};

pub mod local;
pub mod remote;
pub mod secrets;

pub use local::{ExecutionProfile, LocalBackend};
pub use remote::RemoteBackend;
pub use secrets::{ApiCredential, CredentialSource};

/// Sampling temperature used for generation.
pub const SAMPLING_TEMPERATURE: f64 = 0.7;

/// Nucleus sampling threshold used for generation.
pub const SAMPLING_TOP_P: f64 = 0.95;

/// Fatal backend failures.
///
/// These mean no text was produced at all. They are surfaced to the engine's
/// caller and never converted into a fallback analysis.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The capability cannot be reached (missing credential, model failed to load)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Execution exceeded its deadline
    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// The backend failed mid-execution or returned a malformed envelope
    #[error("Generation failed: {message}")]
    GenerationFailure {
        message: String,
        /// HTTP status, when the failure came from a remote response
        status: Option<u16>,
        /// Response body, kept for diagnostics
        body: Option<String>,
    },
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::GenerationFailure {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// A failure carrying the remote status and body.
    pub fn http_failure(status: u16, body: impl Into<String>) -> Self {
        Self::GenerationFailure {
            message: format!("inference endpoint returned HTTP {}", status),
            status: Some(status),
            body: Some(body.into()),
        }
    }

    /// Short stable name of the error kind, for logs and exit codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::GenerationTimeout(_) => "generation_timeout",
            Self::GenerationFailure { .. } => "generation_failure",
        }
    }

    /// Whether an external caller may reasonably retry.
    ///
    /// An unavailable backend stays unavailable until configuration changes.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::BackendUnavailable(_))
    }
}

/// Backend abstraction allows swapping inference implementations.
///
/// This is the ONLY place where model calls are made. Prompt building and
/// response interpretation never call it.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Execute a prompt and return the raw continuation text.
    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError>;

    /// Prompt dialect this backend expects.
    fn dialect(&self) -> PromptDialect;

    /// Cheap readiness probe; never runs a generation.
    async fn health_check(&self) -> bool;

    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Resolve lazily-initialized state before serving requests.
    async fn warm_up(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Create the backend selected by `config.backend`.
pub fn backend_from_config(
    config: &BackendConfig,
) -> Result<Arc<dyn InferenceBackend>, BackendError> {
    match config.backend {
        BackendKind::Local => Ok(Arc::new(LocalBackend::new(config.clone()))),
        BackendKind::Remote => Ok(Arc::new(RemoteBackend::from_config(config)?)),
    }
}
