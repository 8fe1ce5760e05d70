use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GeminiSettings;
use crate::insight::TextGenerator;

const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const GENERATION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    status: Option<String>,
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, settings: GeminiSettings) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(GENERATION_TIMEOUT_SECS))
            .build()
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: GEMINI_API_BASE_URL.to_string(),
            api_key: api_key.into(),
            settings,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.settings.model)
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str, temperature: f64) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: self.settings.max_output_tokens,
            },
        };
        tracing::debug!(
            model = %self.settings.model,
            prompt_chars = prompt.len(),
            "requesting gemini generation"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .map_err(|error| GenerationError::Transport(error.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|error| GenerationError::Transport(error.without_url().to_string()))?;

        if !status.is_success() {
            let error = map_error_response(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), error = %error, "gemini request failed");
            return Err(error);
        }

        let text = parse_generate_response(&body)?;
        tracing::info!(model = %self.settings.model, chars = text.len(), "gemini generation complete");
        Ok(text)
    }
}

fn parse_generate_response(body: &str) -> Result<String, GenerationError> {
    let payload: GenerateResponse = serde_json::from_str(body)
        .map_err(|error| GenerationError::InvalidResponse(format!("generate payload: {error}")))?;

    let Some(candidate) = payload.candidates.into_iter().next() else {
        return Err(GenerationError::EmptyResponse(
            "no candidates returned".to_string(),
        ));
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "unknown".to_string());
        return Err(GenerationError::EmptyResponse(format!(
            "candidate carried no text (finish reason: {reason})"
        )));
    }

    Ok(text.trim().to_string())
}

fn map_error_response(status: u16, body: &str) -> GenerationError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|envelope| envelope.error.message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "request failed".to_string()
            } else {
                trimmed.to_string()
            }
        });
    let key_rejected = parsed
        .as_ref()
        .is_some_and(|envelope| envelope.error.status.as_deref() == Some("PERMISSION_DENIED"))
        || message.contains("API key");

    if status == 401 || status == 403 || (status == 400 && key_rejected) {
        return GenerationError::Auth(message);
    }

    GenerationError::Http { status, message }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation service rejected credentials: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
    #[error("empty generation response: {0}")]
    EmptyResponse(String),
}
