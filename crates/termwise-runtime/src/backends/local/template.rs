//! Chat templates for instruction-tuned local models.

use serde::{Deserialize, Serialize};
use termwise_core::Prompt;

/// Prompt layout expected by the local model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTemplate {
    /// `[INST] ... [/INST]` turns (Mistral, Llama 2)
    Mistral,
    /// Header-delimited turns (Llama 3)
    Llama3,
}

impl ChatTemplate {
    /// Render a prompt into the model's raw input text.
    pub fn render(&self, prompt: &Prompt) -> String {
        match self {
            ChatTemplate::Mistral => match &prompt.system {
                Some(system) => format!("<s>[INST] {}\n\n{} [/INST]", system, prompt.user),
                None => format!("<s>[INST] {} [/INST]", prompt.user),
            },
            ChatTemplate::Llama3 => {
                let mut out = String::from("<|begin_of_text|>");
                if let Some(system) = &prompt.system {
                    out.push_str("<|start_header_id|>system<|end_header_id|>\n\n");
                    out.push_str(system);
                    out.push_str("<|eot_id|>");
                }
                out.push_str("<|start_header_id|>user<|end_header_id|>\n\n");
                out.push_str(&prompt.user);
                out.push_str("<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n");
                out
            }
        }
    }

    /// Tokens that end the assistant turn.
    pub fn stop_tokens(&self) -> &'static [&'static str] {
        match self {
            ChatTemplate::Mistral => &["</s>"],
            ChatTemplate::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
        }
    }
}

impl std::str::FromStr for ChatTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mistral" => Ok(Self::Mistral),
            "llama3" | "llama-3" => Ok(Self::Llama3),
            other => Err(format!("unknown chat template '{}'", other)),
        }
    }
}
