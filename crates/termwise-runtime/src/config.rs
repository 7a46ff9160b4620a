//! Backend configuration.
//!
//! [`BackendConfig`] is resolved once at startup and is read-only afterwards.
//! It can be loaded from environment variables or from a YAML/JSON file;
//! every field has a default. Credentials are never stored here: the config
//! only names the environment variable the remote backend reads.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use termwise_core::DEFAULT_MAX_INPUT_LENGTH;
use thiserror::Error;

use crate::backends::local::ChatTemplate;

/// Longest accepted `generation_timeout`.
pub const MAX_GENERATION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Which inference backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process model execution
    Local,
    /// Hosted text-generation endpoint
    Remote,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Process-wide backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend variant (`INFERENCE_BACKEND`)
    pub backend: BackendKind,

    /// Model identifier (`MODEL_NAME`); a hub id for the remote endpoint and
    /// a directory under `model_dir` for local execution
    pub model_name: String,

    /// Root directory holding local model files (`MODEL_DIR`)
    pub model_dir: PathBuf,

    /// GGUF weights file inside the model directory (`GGUF_FILE`)
    pub gguf_file: String,

    /// Prefer accelerator hardware when present (`USE_GPU`)
    pub use_gpu: bool,

    /// Character cap applied before prompting (`MAX_INPUT_LENGTH`)
    pub max_input_length: usize,

    /// Output token cap (`MAX_NEW_TOKENS`)
    pub max_new_tokens: u32,

    /// Local model context window in tokens (`CONTEXT_LENGTH`)
    pub context_length: usize,

    /// Load quantized GGUF weights instead of full safetensors (`QUANTIZE_MODEL`)
    pub quantize_model: bool,

    /// Request the accelerated attention kernel (`USE_FLASH_ATTENTION_2`)
    pub use_flash_attention_2: bool,

    /// Chat template for the local model (`CHAT_TEMPLATE`)
    pub chat_template: ChatTemplate,

    /// Fixed sampling seed (`SAMPLING_SEED`); random per request when unset
    pub sampling_seed: Option<u64>,

    /// Deadline for a single generation (`GENERATION_TIMEOUT`, e.g. "5m")
    #[serde(with = "duration_human")]
    pub generation_timeout: Duration,

    /// Hosted endpoint (`REMOTE_INFERENCE_URL`); derived from `model_name` when unset
    pub remote_url: Option<String>,

    /// Environment variable holding the remote bearer token (`API_TOKEN_ENV`)
    pub api_token_env: String,

    /// Maximum cached analyses; 0 disables caching (`ANALYSIS_CACHE_CAPACITY`)
    pub cache_capacity: u64,

    /// Lifetime of cached analyses (`ANALYSIS_CACHE_TTL`)
    #[serde(with = "duration_human")]
    pub cache_ttl: Duration,
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            model_name: "mistralai/Mistral-7B-Instruct-v0.2".to_string(),
            model_dir: PathBuf::from("models"),
            gguf_file: "model.gguf".to_string(),
            use_gpu: true,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            max_new_tokens: 2048,
            context_length: 4096,
            quantize_model: true,
            use_flash_attention_2: false,
            chat_template: ChatTemplate::Mistral,
            sampling_seed: None,
            generation_timeout: Duration::from_secs(300),
            remote_url: None,
            api_token_env: "HF_API_TOKEN".to_string(),
            cache_capacity: 0,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl BackendConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a YAML or JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML (or JSON, which is valid YAML).
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build from an arbitrary key lookup (environment, test maps).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("INFERENCE_BACKEND") {
            config.backend = parse_value("INFERENCE_BACKEND", &v)?;
        }
        if let Some(v) = lookup("MODEL_NAME") {
            config.model_name = v;
        }
        if let Some(v) = lookup("MODEL_DIR") {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GGUF_FILE") {
            config.gguf_file = v;
        }
        if let Some(v) = lookup("USE_GPU") {
            config.use_gpu = parse_bool("USE_GPU", &v)?;
        }
        if let Some(v) = lookup("MAX_INPUT_LENGTH") {
            config.max_input_length = parse_value("MAX_INPUT_LENGTH", &v)?;
        }
        if let Some(v) = lookup("MAX_NEW_TOKENS") {
            config.max_new_tokens = parse_value("MAX_NEW_TOKENS", &v)?;
        }
        if let Some(v) = lookup("CONTEXT_LENGTH") {
            config.context_length = parse_value("CONTEXT_LENGTH", &v)?;
        }
        if let Some(v) = lookup("QUANTIZE_MODEL") {
            config.quantize_model = parse_bool("QUANTIZE_MODEL", &v)?;
        }
        if let Some(v) = lookup("USE_FLASH_ATTENTION_2") {
            config.use_flash_attention_2 = parse_bool("USE_FLASH_ATTENTION_2", &v)?;
        }
        if let Some(v) = lookup("CHAT_TEMPLATE") {
            config.chat_template = parse_value("CHAT_TEMPLATE", &v)?;
        }
        if let Some(v) = lookup("SAMPLING_SEED") {
            config.sampling_seed = Some(parse_value("SAMPLING_SEED", &v)?);
        }
        if let Some(v) = lookup("GENERATION_TIMEOUT") {
            config.generation_timeout = parse_duration("GENERATION_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("REMOTE_INFERENCE_URL") {
            config.remote_url = Some(v);
        }
        if let Some(v) = lookup("API_TOKEN_ENV") {
            config.api_token_env = v;
        }
        if let Some(v) = lookup("ANALYSIS_CACHE_CAPACITY") {
            config.cache_capacity = parse_value("ANALYSIS_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("ANALYSIS_CACHE_TTL") {
            config.cache_ttl = parse_duration("ANALYSIS_CACHE_TTL", &v)?;
        }

        Ok(config)
    }

    /// Reject configurations no backend can serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "model_name must not be empty".to_string(),
            ));
        }
        if self.max_input_length == 0 {
            return Err(ConfigError::ValidationError(
                "max_input_length must be greater than 0".to_string(),
            ));
        }
        if self.max_new_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_new_tokens must be greater than 0".to_string(),
            ));
        }
        if self.generation_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "generation_timeout must be greater than 0".to_string(),
            ));
        }
        if self.generation_timeout > MAX_GENERATION_TIMEOUT {
            return Err(ConfigError::ValidationError(format!(
                "generation_timeout must be at most {}",
                humantime::format_duration(MAX_GENERATION_TIMEOUT)
            )));
        }
        if self.backend == BackendKind::Local
            && self.max_new_tokens as usize >= self.context_length
        {
            return Err(ConfigError::ValidationError(format!(
                "max_new_tokens ({}) must be smaller than context_length ({})",
                self.max_new_tokens, self.context_length
            )));
        }
        if let Some(url) = &self.remote_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(
                    "remote_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Directory holding the local model files.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_name)
    }

    /// Endpoint the remote backend posts to.
    pub fn remote_endpoint(&self) -> String {
        match &self.remote_url {
            Some(url) => url.clone(),
            None => format!(
                "https://api-inference.huggingface.co/models/{}",
                self.model_name
            ),
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
