//! Execution profile for the local backend.
//!
//! Hardware capability is probed once, when the backend is constructed.
//! Missing capabilities degrade silently to the baseline path; nothing here
//! is an error.

use serde::Serialize;
use std::fmt;

use crate::config::BackendConfig;

/// Where tensors live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Accelerator,
    Cpu,
}

/// Floating point precision used for compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputePrecision {
    Bf16,
    F32,
}

/// Attention kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionKernel {
    Flash,
    Eager,
}

/// Resolved device, weight format, precision and attention kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionProfile {
    pub device: DeviceKind,
    pub quantized: bool,
    pub precision: ComputePrecision,
    pub attention: AttentionKernel,
}

impl ExecutionProfile {
    /// Probe the current host and resolve against `config`.
    pub fn detect(config: &BackendConfig) -> Self {
        let profile = Self::resolve(
            config,
            accelerator_present(),
            cfg!(feature = "flash-attn"),
        );
        tracing::info!(
            device = ?profile.device,
            quantized = profile.quantized,
            precision = ?profile.precision,
            attention = ?profile.attention,
            "Resolved local execution profile"
        );
        profile
    }

    /// Resolve from explicit capability flags.
    pub fn resolve(config: &BackendConfig, accelerator: bool, flash_compiled: bool) -> Self {
        let device = if config.use_gpu && accelerator {
            DeviceKind::Accelerator
        } else {
            DeviceKind::Cpu
        };

        let precision = match device {
            DeviceKind::Accelerator => ComputePrecision::Bf16,
            DeviceKind::Cpu => ComputePrecision::F32,
        };

        let quantized = config.quantize_model;

        let flash_usable =
            flash_compiled && device == DeviceKind::Accelerator && !quantized;
        let attention = if config.use_flash_attention_2 && flash_usable {
            AttentionKernel::Flash
        } else {
            if config.use_flash_attention_2 {
                tracing::info!(
                    flash_compiled,
                    accelerator = device == DeviceKind::Accelerator,
                    quantized,
                    "Accelerated attention unavailable, using eager attention"
                );
            }
            AttentionKernel::Eager
        };

        Self {
            device,
            quantized,
            precision,
            attention,
        }
    }

    pub fn uses_flash_attention(&self) -> bool {
        self.attention == AttentionKernel::Flash
    }
}

impl fmt::Display for ExecutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{}/{:?}",
            self.device,
            self.precision,
            if self.quantized { "quantized" } else { "full" },
            self.attention
        )
    }
}

#[cfg(feature = "local")]
fn accelerator_present() -> bool {
    candle_core::utils::cuda_is_available()
}

#[cfg(not(feature = "local"))]
fn accelerator_present() -> bool {
    false
}
