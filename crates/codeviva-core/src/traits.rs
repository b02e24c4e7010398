//! Core trait definitions for the AI collaborators.
//!
//! `LlmProvider` and `SpeechSynthesizer` are implemented by
//! `codeviva-providers`; `AnswerEvaluator` is implemented in
//! [`crate::evaluation`] and consumed by the exam runner.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::audio::AudioClip;
use crate::model::{ExamResult, Question};

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for generative AI backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate a completion for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Shape the provider should answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Request to generate text from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "gemini-2.5-pro").
    pub model: String,
    /// The main instruction.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Extra text parts sent after the prompt (usually source code).
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            attachments: Vec::new(),
            max_tokens: 2048,
            temperature: 0.7,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_attachment(mut self, text: impl Into<String>) -> Self {
        self.attachments.push(text.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response text.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Whether the model produces speech audio rather than text.
    #[serde(default)]
    pub speech: bool,
}

// ---------------------------------------------------------------------------
// Speech and evaluation traits
// ---------------------------------------------------------------------------

/// Text-to-speech backend used to read questions aloud.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> anyhow::Result<AudioClip>;
}

/// Scores one answer to one question.
///
/// Implementations decide how to degrade; the session only requires that an
/// `Err` is possible and substitutes a zero-score result for it.
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    async fn evaluate(&self, question: &Question, answer: &str) -> anyhow::Result<ExamResult>;
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Pull a JSON payload out of a model response.
///
/// Handles:
/// - ```json``` fenced blocks (preferred)
/// - Generic ``` fenced blocks
/// - Raw JSON with no fences (returned trimmed)
pub fn extract_json_block(response: &str) -> String {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            let block = std::mem::take(&mut current_block);
            if is_json_block {
                json_blocks.push(block);
            } else {
                generic_blocks.push(block);
            }
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    // An unclosed fence still counts; the response was probably cut off
    if in_block && !current_block.is_empty() {
        if is_json_block {
            json_blocks.push(current_block);
        } else {
            generic_blocks.push(current_block);
        }
    }

    if let Some(block) = json_blocks.into_iter().next() {
        return block.trim().to_string();
    }
    if let Some(block) = generic_blocks.into_iter().next() {
        return block.trim().to_string();
    }
    response.trim().to_string()
}

/// Parse a JSON value from a model response, tolerating surrounding prose.
///
/// Tries the fenced/raw payload first, then the slice between the first
/// `open` and the last `close` delimiter.
pub fn parse_json_lenient<T: DeserializeOwned>(response: &str, open: char, close: char) -> Option<T> {
    let payload = extract_json_block(response);
    if let Ok(value) = serde_json::from_str(&payload) {
        return Some(value);
    }

    let start = response.find(open)?;
    let end = response.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}
