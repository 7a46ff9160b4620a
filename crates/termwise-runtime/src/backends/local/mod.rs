//! In-process inference backend.
//!
//! The model handle is created lazily on the first [`generate`] (or eagerly
//! via [`warm_up`]) under single-flight initialization: concurrent first
//! callers wait for one load. A failed load is not cached, so the next
//! request tries again.
//!
//! The load belongs to the caller that started it. If that caller is
//! dropped before the load finishes (a client disconnect, an outer
//! `tokio::time::timeout`), the work is discarded and the next caller loads
//! the model again. Long-running services should call [`warm_up`] once at
//! startup, before accepting requests.
//!
//! Loading and generation are CPU/GPU-bound and run on tokio's blocking
//! pool. Generations are serialized behind a mutex; both the wait for the
//! mutex and each decoding step respect the generation deadline.
//!
//! [`generate`]: InferenceBackend::generate
//! [`warm_up`]: InferenceBackend::warm_up

use async_trait::async_trait;
use termwise_core::{Prompt, PromptDialect};

use super::{BackendError, InferenceBackend};
use crate::config::BackendConfig;

mod model;
mod profile;
mod template;

#[cfg(feature = "local")]
pub use model::{Generator, LoadedModel};
pub use model::{new_token_budget, GenerationParams, ModelFiles, WeightFiles, MIN_NEW_TOKENS};
pub use profile::{AttentionKernel, ComputePrecision, DeviceKind, ExecutionProfile};
pub use template::ChatTemplate;

/// Turns located model files into a ready [`Generator`]. Runs on the
/// blocking pool.
#[cfg(feature = "local")]
pub type ModelLoader = std::sync::Arc<
    dyn Fn(&ModelFiles, &ExecutionProfile, ChatTemplate) -> Result<Box<dyn Generator>, BackendError>
        + Send
        + Sync,
>;

#[cfg(feature = "local")]
type ModelHandle = std::sync::Arc<parking_lot::Mutex<Box<dyn Generator>>>;

/// Runs an instruction-tuned llama-family model in this process.
pub struct LocalBackend {
    config: BackendConfig,
    profile: ExecutionProfile,
    #[cfg(feature = "local")]
    loader: ModelLoader,
    #[cfg(feature = "local")]
    handle: tokio::sync::OnceCell<ModelHandle>,
}

impl LocalBackend {
    /// Create the backend. Probes hardware once; does not touch model files.
    pub fn new(config: BackendConfig) -> Self {
        let profile = ExecutionProfile::detect(&config);
        Self::with_profile(config, profile)
    }

    /// Create the backend with an already-resolved profile.
    pub fn with_profile(config: BackendConfig, profile: ExecutionProfile) -> Self {
        Self {
            config,
            profile,
            #[cfg(feature = "local")]
            loader: std::sync::Arc::new(load_weights),
            #[cfg(feature = "local")]
            handle: tokio::sync::OnceCell::new(),
        }
    }

    /// Replace how the model is built from its files.
    ///
    /// Must be set before the first load; the default reads GGUF or
    /// safetensors weights with candle.
    #[cfg(feature = "local")]
    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&ModelFiles, &ExecutionProfile, ChatTemplate) -> Result<Box<dyn Generator>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.loader = std::sync::Arc::new(loader);
        self
    }

    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    /// Whether the model handle has been created.
    pub fn is_loaded(&self) -> bool {
        #[cfg(feature = "local")]
        {
            self.handle.initialized()
        }
        #[cfg(not(feature = "local"))]
        {
            false
        }
    }

    #[cfg(feature = "local")]
    async fn handle(&self) -> Result<ModelHandle, BackendError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let files = ModelFiles::locate(&self.config, self.profile.quantized)
                    .map_err(BackendError::unavailable)?;
                let profile = self.profile;
                let template = self.config.chat_template;
                let loader = std::sync::Arc::clone(&self.loader);
                let started = std::time::Instant::now();

                tracing::info!(
                    model = %self.config.model_name,
                    profile = %profile,
                    "Loading local model"
                );

                let loaded = tokio::task::spawn_blocking(move || loader(&files, &profile, template))
                    .await
                    .map_err(|e| BackendError::unavailable(format!("model load task failed: {}", e)))?
                    .inspect_err(|e| {
                        tracing::warn!(model = %self.config.model_name, error = %e, "Local model load failed");
                    })?;

                tracing::info!(
                    model = %self.config.model_name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Local model loaded"
                );

                Ok::<_, BackendError>(std::sync::Arc::new(parking_lot::Mutex::new(loaded)))
            })
            .await?;
        Ok(handle.clone())
    }

    #[cfg(feature = "local")]
    async fn run(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let timeout = self.config.generation_timeout;
        let handle = self.handle().await?;

        let deadline = std::time::Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| BackendError::failure(format!("generation timeout {:?} is out of range", timeout)))?;
        let text = self.config.chat_template.render(prompt);
        let params = GenerationParams {
            max_new_tokens: self.config.max_new_tokens as usize,
            context_length: self.config.context_length,
            seed: self.config.sampling_seed.unwrap_or_else(fresh_seed),
            deadline,
            timeout,
        };

        tokio::task::spawn_blocking(move || {
            let mut model = handle
                .try_lock_until(deadline)
                .ok_or(BackendError::GenerationTimeout(timeout))?;
            model.generate(&text, params)
        })
        .await
        .map_err(|e| BackendError::failure(format!("generation task failed: {}", e)))?
    }

    #[cfg(not(feature = "local"))]
    async fn run(&self, _prompt: &Prompt) -> Result<String, BackendError> {
        Err(not_compiled())
    }
}

#[cfg(feature = "local")]
fn load_weights(
    files: &ModelFiles,
    profile: &ExecutionProfile,
    template: ChatTemplate,
) -> Result<Box<dyn Generator>, BackendError> {
    let model = LoadedModel::load(files, profile, template)?;
    Ok(Box::new(model))
}

#[cfg(feature = "local")]
fn fresh_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(not(feature = "local"))]
fn not_compiled() -> BackendError {
    BackendError::unavailable("local inference is not compiled in (enable the `local` feature)")
}

#[async_trait]
impl InferenceBackend for LocalBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.run(prompt).await
    }

    fn dialect(&self) -> PromptDialect {
        PromptDialect::Chat
    }

    async fn health_check(&self) -> bool {
        if !cfg!(feature = "local") {
            return false;
        }
        if self.is_loaded() {
            return true;
        }
        match ModelFiles::locate(&self.config, self.profile.quantized) {
            Ok(_) => true,
            Err(reason) => {
                tracing::debug!(%reason, "Local model files not ready");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "local"
    }

    /// Load the model now. Call at startup so a cancelled request never
    /// abandons a half-finished load.
    async fn warm_up(&self) -> Result<(), BackendError> {
        #[cfg(feature = "local")]
        {
            self.handle().await.map(|_| ())
        }
        #[cfg(not(feature = "local"))]
        {
            Err(not_compiled())
        }
    }
}
