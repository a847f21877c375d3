//! Google Gemini client - structured coach answers and speech synthesis

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use turtle_store::Inspiration;

use super::types::{CoachProvider, DailyPlan, PlanRequest};
use crate::audio::tts::{SpeechSynthesizer, Voice};
use crate::prompts;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Google Gemini client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    speech_model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("text_model", &self.text_model)
            .field("speech_model", &self.speech_model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_text_model(mut self, model: String) -> Self {
        self.text_model = model;
        self
    }

    pub fn with_speech_model(mut self, model: String) -> Self {
        self.speech_model = model;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// POST a generateContent request
    async fn generate(&self, model: &str, body: &Value) -> Result<GeminiApiResponse> {
        debug!("Gemini request: model={}", model);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Gemini API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: GeminiApiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        debug!("Gemini response: candidates={}", api_response.candidates.len());
        Ok(api_response)
    }

    /// Ask the text model for JSON matching `schema`
    async fn generate_json<T: DeserializeOwned>(&self, prompt: &str, schema: Value) -> Result<T> {
        let body = json_request_body(prompt, schema);
        let response = self.generate(&self.text_model, &body).await?;
        parse_json_answer(response)
    }
}

fn json_request_body(prompt: &str, schema: Value) -> Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema,
        },
    })
}

fn speech_request_body(text: &str, voice: Voice) -> Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": text }]
        }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice.name() }
                }
            }
        },
    })
}

/// Text of the first candidate, parsed as JSON
fn parse_json_answer<T: DeserializeOwned>(response: GeminiApiResponse) -> Result<T> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|content| {
            content.parts.into_iter().find_map(|p| match p {
                GeminiPart::Text { text } => Some(text),
                _ => None,
            })
        })
        .ok_or_else(|| anyhow!("Gemini response had no text candidate"))?;

    serde_json::from_str(text.trim()).context("Gemini answer did not match the requested schema")
}

/// Base64 audio of the first candidate, if the service produced any
fn extract_audio(response: GeminiApiResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|p| match p {
            GeminiPart::InlineData { inline_data } => {
                debug!("Gemini audio part: {}", inline_data.mime_type);
                Some(inline_data.data)
            }
            _ => None,
        })
        .filter(|data| !data.is_empty())
}

#[async_trait]
impl CoachProvider for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn daily_plan(&self, request: &PlanRequest) -> Result<DailyPlan> {
        let prompt = prompts::daily_plan_prompt(request)?;
        let plan: DailyPlan = self
            .generate_json(&prompt, prompts::daily_plan_schema())
            .await
            .context("Daily plan request failed")?;
        info!("Received daily plan for {} ({} mode)", request.user_name, request.mode);
        Ok(plan)
    }

    async fn biographies(&self) -> Result<Vec<Inspiration>> {
        let bios: Vec<Inspiration> = self
            .generate_json(prompts::BIOGRAPHIES_PROMPT, prompts::biographies_schema())
            .await
            .context("Biographies request failed")?;
        info!("Received {} biographies", bios.len());
        Ok(bios)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Option<String>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        debug!("Gemini TTS: synthesizing {} chars with voice {}", text.chars().count(), voice);

        let body = speech_request_body(text, voice);
        let response = self.generate(&self.speech_model, &body).await?;
        let audio = extract_audio(response);
        match &audio {
            Some(data) => info!("Gemini TTS: received {} base64 chars of audio", data.len()),
            None => info!("Gemini TTS: response carried no audio"),
        }
        Ok(audio)
    }

    fn name(&self) -> &str {
        "gemini_tts"
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiBlob {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    data: String,
}
