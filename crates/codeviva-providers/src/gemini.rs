//! Google Gemini provider (`generateContent`), text and speech.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use codeviva_core::audio::{AudioClip, SPEECH_SAMPLE_RATE};
use codeviva_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, ResponseFormat, SpeechSynthesizer,
    TokenUsage,
};

use crate::error::{check_status, transport_error, ProviderError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";

/// Gemini API provider.
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: &str, base_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    async fn generate_content(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<GeminiResponse, ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, DEFAULT_TIMEOUT_SECS))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("failed to parse response: {e}")))
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

fn request_body(request: &GenerateRequest) -> serde_json::Value {
    let parts: Vec<Part<'_>> = std::iter::once(request.prompt.as_str())
        .chain(request.attachments.iter().map(String::as_str))
        .map(|text| Part { text })
        .collect();

    let mut generation_config = json!({
        "temperature": request.temperature,
        "maxOutputTokens": request.max_tokens,
    });
    if request.response_format == ResponseFormat::Json {
        generation_config["responseMimeType"] = json!("application/json");
    }

    let mut body = json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    });
    if let Some(system) = &request.system_prompt {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();
        let api_response = self
            .generate_content(&request.model, &request_body(request))
            .await?;

        let content = api_response
            .text()
            .ok_or_else(|| ProviderError::MalformedResponse("no text in candidates".into()))?;
        let usage = &api_response.usage_metadata;

        Ok(GenerateResponse {
            content,
            model: api_response
                .model_version
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            token_usage: TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gemini-2.5-pro".into(),
                name: "Gemini 2.5 Pro".into(),
                provider: "gemini".into(),
                max_context: 1_048_576,
                speech: false,
            },
            ModelInfo {
                id: "gemini-2.5-flash".into(),
                name: "Gemini 2.5 Flash".into(),
                provider: "gemini".into(),
                max_context: 1_048_576,
                speech: false,
            },
            ModelInfo {
                id: DEFAULT_SPEECH_MODEL.into(),
                name: "Gemini 2.5 Flash TTS".into(),
                provider: "gemini".into(),
                max_context: 8_192,
                speech: true,
            },
        ]
    }
}

/// Gemini text-to-speech.
pub struct GeminiSpeech {
    provider: GeminiProvider,
    model: String,
    voice: String,
}

impl GeminiSpeech {
    pub fn new(provider: GeminiProvider, model: Option<String>, voice: Option<String>) -> Self {
        Self {
            provider,
            model: model.unwrap_or_else(|| DEFAULT_SPEECH_MODEL.to_string()),
            voice: voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn synthesize(&self, text: &str) -> anyhow::Result<AudioClip> {
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("Read this aloud in a friendly tone: {text}") }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.voice } }
                }
            }
        });

        let api_response = self.provider.generate_content(&self.model, &body).await?;
        let audio = api_response
            .parts()
            .find_map(|p| p.inline_data.as_ref())
            .ok_or_else(|| ProviderError::MalformedResponse("no audio data in response".into()))?;
        tracing::debug!("received {} audio", audio.mime_type);

        AudioClip::from_pcm16_base64(&audio.data, SPEECH_SAMPLE_RATE, 1)
            .context("failed to decode speech audio")
    }
}
