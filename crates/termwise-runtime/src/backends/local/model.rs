//! Model files on disk and the loaded model handle.

use std::path::{Path, PathBuf};

use crate::backends::BackendError;
use crate::config::BackendConfig;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const MODEL_CONFIG_FILE: &str = "config.json";

/// Files making up one local model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub weights: WeightFiles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightFiles {
    /// Single quantized GGUF file
    Gguf(PathBuf),
    /// Full-precision safetensors shards plus the architecture config
    Safetensors {
        config: PathBuf,
        shards: Vec<PathBuf>,
    },
}

impl ModelFiles {
    /// Find the model files for `config` without reading them.
    pub fn locate(config: &BackendConfig, quantized: bool) -> Result<Self, String> {
        let root = config.model_path();
        if !root.is_dir() {
            return Err(format!("model directory {} not found", root.display()));
        }

        let tokenizer = require_file(&root, TOKENIZER_FILE)?;

        let weights = if quantized {
            WeightFiles::Gguf(require_file(&root, &config.gguf_file)?)
        } else {
            let model_config = require_file(&root, MODEL_CONFIG_FILE)?;
            let shards = safetensor_shards(&root)?;
            if shards.is_empty() {
                return Err(format!("no .safetensors files in {}", root.display()));
            }
            WeightFiles::Safetensors {
                config: model_config,
                shards,
            }
        };

        Ok(Self { tokenizer, weights })
    }
}

fn require_file(root: &Path, name: &str) -> Result<PathBuf, String> {
    let path = root.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("missing model file {}", path.display()))
    }
}

fn safetensor_shards(root: &Path) -> Result<Vec<PathBuf>, String> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| format!("cannot list {}: {}", root.display(), e))?;
    let mut shards: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "safetensors"))
        .collect();
    shards.sort();
    Ok(shards)
}

/// Per-request generation settings.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub context_length: usize,
    pub seed: u64,
    pub deadline: std::time::Instant,
    pub timeout: std::time::Duration,
}

/// Fewest new tokens a generation may be squeezed to before it is refused.
pub const MIN_NEW_TOKENS: usize = 64;

/// Number of tokens to generate after a prompt of `prompt_tokens`.
///
/// The configured `max_new_tokens` is shrunk to whatever room the context
/// window has left. Fails only when that room is below [`MIN_NEW_TOKENS`]
/// (or below `max_new_tokens`, when that is smaller still).
pub fn new_token_budget(
    prompt_tokens: usize,
    max_new_tokens: usize,
    context_length: usize,
) -> Result<usize, BackendError> {
    let room = context_length.saturating_sub(prompt_tokens);
    let budget = room.min(max_new_tokens);

    if budget == 0 || budget < MIN_NEW_TOKENS.min(max_new_tokens) {
        return Err(BackendError::failure(format!(
            "prompt of {} tokens leaves {} of {} context tokens for generation",
            prompt_tokens, room, context_length
        )));
    }

    if budget < max_new_tokens {
        tracing::warn!(
            prompt_tokens,
            max_new_tokens,
            budget,
            context_length,
            "Clamping new-token budget to fit the context window"
        );
    }
    Ok(budget)
}

/// Continues a rendered prompt. Implemented by [`LoadedModel`]; the backend
/// serializes calls behind a mutex.
#[cfg(feature = "local")]
pub trait Generator: Send {
    fn generate(&mut self, text: &str, params: GenerationParams) -> Result<String, BackendError>;
}

#[cfg(feature = "local")]
pub use loaded::LoadedModel;

#[cfg(feature = "local")]
mod loaded {
    use candle_core::quantized::gguf_file;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::generation::LogitsProcessor;
    use candle_transformers::models::llama::{self, Cache, Llama, LlamaConfig};
    use candle_transformers::models::quantized_llama;
    use std::time::Instant;
    use tokenizers::Tokenizer;

    use super::{GenerationParams, Generator, ModelFiles, WeightFiles};
    use crate::backends::local::profile::{ComputePrecision, DeviceKind, ExecutionProfile};
    use crate::backends::local::ChatTemplate;
    use crate::backends::{BackendError, SAMPLING_TEMPERATURE, SAMPLING_TOP_P};

    enum Weights {
        Quantized(quantized_llama::ModelWeights),
        Full {
            model: Llama,
            config: llama::Config,
            dtype: DType,
        },
    }

    /// Tokenizer plus executable model. Not thread-safe for generation;
    /// the backend wraps it in a mutex.
    pub struct LoadedModel {
        tokenizer: Tokenizer,
        weights: Weights,
        device: Device,
        stop_ids: Vec<u32>,
    }

    impl LoadedModel {
        /// Read tokenizer and weights from disk. Blocking.
        pub fn load(
            files: &ModelFiles,
            profile: &ExecutionProfile,
            template: ChatTemplate,
        ) -> Result<Self, BackendError> {
            let device = match profile.device {
                DeviceKind::Accelerator => Device::new_cuda(0).map_err(load_error)?,
                DeviceKind::Cpu => Device::Cpu,
            };

            let tokenizer = Tokenizer::from_file(&files.tokenizer)
                .map_err(|e| BackendError::unavailable(format!("tokenizer: {}", e)))?;

            let weights = match &files.weights {
                WeightFiles::Gguf(path) => {
                    let mut file = std::fs::File::open(path).map_err(|e| {
                        BackendError::unavailable(format!("{}: {}", path.display(), e))
                    })?;
                    let content = gguf_file::Content::read(&mut file).map_err(load_error)?;
                    let model = quantized_llama::ModelWeights::from_gguf(content, &mut file, &device)
                        .map_err(load_error)?;
                    Weights::Quantized(model)
                }
                WeightFiles::Safetensors { config, shards } => {
                    let raw = std::fs::read(config).map_err(|e| {
                        BackendError::unavailable(format!("{}: {}", config.display(), e))
                    })?;
                    let llama_config: LlamaConfig = serde_json::from_slice(&raw)
                        .map_err(|e| BackendError::unavailable(format!("model config: {}", e)))?;
                    let config = llama_config.into_config(profile.uses_flash_attention());
                    let dtype = match profile.precision {
                        ComputePrecision::Bf16 => DType::BF16,
                        ComputePrecision::F32 => DType::F32,
                    };
                    // SAFETY: the shards are not modified while mapped.
                    let vb = unsafe { VarBuilder::from_mmaped_safetensors(shards.as_slice(), dtype, &device) }
                        .map_err(load_error)?;
                    let model = Llama::load(vb, &config).map_err(load_error)?;
                    Weights::Full {
                        model,
                        config,
                        dtype,
                    }
                }
            };

            let stop_ids = template
                .stop_tokens()
                .iter()
                .filter_map(|token| tokenizer.token_to_id(token))
                .collect::<Vec<_>>();
            if stop_ids.is_empty() {
                tracing::warn!(
                    ?template,
                    "Tokenizer has none of the template stop tokens; generation stops at max_new_tokens"
                );
            }

            Ok(Self {
                tokenizer,
                weights,
                device,
                stop_ids,
            })
        }

        /// Sample a continuation of `text`, returning only the new tokens.
        pub fn generate(
            &mut self,
            text: &str,
            params: GenerationParams,
        ) -> Result<String, BackendError> {
            let encoding = self
                .tokenizer
                .encode(text, false)
                .map_err(|e| BackendError::failure(format!("tokenization failed: {}", e)))?;
            let prompt_ids = encoding.get_ids().to_vec();

            let budget = super::new_token_budget(
                prompt_ids.len(),
                params.max_new_tokens,
                params.context_length,
            )?;

            let mut cache = match &self.weights {
                Weights::Full { config, dtype, .. } => {
                    Some(Cache::new(true, *dtype, config, &self.device).map_err(generation_error)?)
                }
                Weights::Quantized(_) => None,
            };

            let mut sampler = LogitsProcessor::new(
                params.seed,
                Some(SAMPLING_TEMPERATURE),
                Some(SAMPLING_TOP_P),
            );

            let mut generated: Vec<u32> = Vec::with_capacity(budget);
            let mut input: Vec<u32> = prompt_ids.clone();
            let mut index_pos = 0;

            for _ in 0..budget {
                if Instant::now() >= params.deadline {
                    return Err(BackendError::GenerationTimeout(params.timeout));
                }

                let tensor = Tensor::new(input.as_slice(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(generation_error)?;

                let logits = match (&mut self.weights, cache.as_mut()) {
                    (Weights::Quantized(model), _) => model.forward(&tensor, index_pos),
                    (Weights::Full { model, .. }, Some(cache)) => {
                        model.forward(&tensor, index_pos, cache)
                    }
                    (Weights::Full { .. }, None) => {
                        return Err(BackendError::failure("missing attention cache"))
                    }
                }
                .and_then(|l| l.squeeze(0))
                .and_then(|l| l.to_dtype(DType::F32))
                .map_err(generation_error)?;

                let next = sampler.sample(&logits).map_err(generation_error)?;
                index_pos += input.len();

                if self.stop_ids.contains(&next) {
                    break;
                }
                generated.push(next);
                input = vec![next];
            }

            tracing::debug!(
                prompt_tokens = prompt_ids.len(),
                generated_tokens = generated.len(),
                "Local generation finished"
            );

            self.tokenizer
                .decode(&generated, true)
                .map_err(|e| BackendError::failure(format!("detokenization failed: {}", e)))
        }
    }

    impl Generator for LoadedModel {
        fn generate(
            &mut self,
            text: &str,
            params: GenerationParams,
        ) -> Result<String, BackendError> {
            LoadedModel::generate(self, text, params)
        }
    }

    fn load_error(e: candle_core::Error) -> BackendError {
        BackendError::unavailable(format!("model load failed: {}", e))
    }

    fn generation_error(e: candle_core::Error) -> BackendError {
        BackendError::failure(format!("model execution failed: {}", e))
    }
}
