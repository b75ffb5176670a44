use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Turns a prompt into text. Every backend honors the same contract.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("gemini") {
            Self::Gemini
        } else {
            Self::OpenAi
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    fn key_variable(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

/// Rejects missing keys and the placeholders shipped in sample `.env` files.
pub fn validate_credentials(config: &GenerationConfig) -> Result<String, Error> {
    let variable = config.kind.key_variable();
    let key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "{} is not configured. Please set {} in your .env file.",
                variable, variable
            ))
        })?;

    let placeholder = key.starts_with("your-")
        || match config.kind {
            ProviderKind::Gemini => key == "your-gemini-api-key-here",
            ProviderKind::OpenAi => key.starts_with("sk-") && key.len() < 20,
        };
    if placeholder {
        return Err(Error::Configuration(format!(
            "{} is not properly configured. Please set {} in your .env file.",
            variable, variable
        )));
    }

    Ok(key.to_string())
}

/// Validates credentials and builds the configured backend.
pub fn build_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>, Error> {
    let api_key = validate_credentials(config)?;
    let generator: Arc<dyn GenerationProvider> = match config.kind {
        ProviderKind::OpenAi => Arc::new(
            OpenAiGenerator::new(
                config.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                api_key,
                config.model.clone(),
            )
            .map_err(|e| Error::Configuration(e.to_string()))?,
        ),
        ProviderKind::Gemini => Arc::new(
            GeminiGenerator::new(api_key, config.model.clone())
                .map_err(|e| Error::Configuration(e.to_string()))?,
        ),
    };
    tracing::info!("Using {} as generation provider", config.kind.as_str());
    Ok(generator)
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")
}

// OpenAI-style chat completions

pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn openai_answer(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("OpenAI response contained no choices"))
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: 500,
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to call OpenAI chat completions")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI request failed: {} - {}", status, error_text);
        }

        let parsed: ChatResponse = response.json().await.context("failed to parse OpenAI response")?;
        openai_answer(parsed)
    }
}

// Gemini-style generateContent

pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            model,
        })
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

fn gemini_answer(response: GeminiResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .find_map(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .ok_or_else(|| anyhow::anyhow!("Gemini response contained no candidates"))?;
    Ok(text.trim().to_string())
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model);
        let body = GeminiRequest {
            contents: vec![GeminiContent { parts: vec![GeminiPart { text: prompt }] }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("failed to call Gemini generateContent")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini request failed: {} - {}", status, error_text);
        }

        let parsed: GeminiResponse = response.json().await.context("failed to parse Gemini response")?;
        gemini_answer(parsed)
    }
}
