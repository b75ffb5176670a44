use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Settings;
use crate::rag::generation::{build_generator, GenerationProvider};

const GOOGLE_TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// External translator. `Ok(None)` means the backend answered without a
/// usable translation.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<Option<String>>;
}

/// Picks the translator named by `translation_provider`. `auto` uses Google
/// when a key is configured and the simulator otherwise.
pub fn build_translator(settings: &Settings) -> Result<Arc<dyn TranslationProvider>> {
    let choice = settings.translation_provider.trim().to_ascii_lowercase();
    let google_key = settings
        .google_translate_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let translator: Arc<dyn TranslationProvider> = match (choice.as_str(), google_key) {
        ("google", None) => {
            anyhow::bail!("GOOGLE_TRANSLATE_API_KEY is required for the google translation provider")
        }
        ("google", Some(key)) | ("auto", Some(key)) => Arc::new(GoogleTranslator::new(key.to_string())?),
        ("llm", _) => {
            let generator = build_generator(&settings.generation_config())?;
            Arc::new(LlmTranslator::new(generator))
        }
        ("simulated", _) | ("auto", None) => Arc::new(SimulatedTranslator),
        (other, _) => anyhow::bail!("Unknown translation provider: {}", other),
    };

    tracing::info!("Using {} translation provider", translator.name());
    Ok(translator)
}

// Google Cloud Translation v2

pub struct GoogleTranslator {
    client: Client,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Deserialize)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}

impl GoogleTranslator {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_endpoint(api_key, GOOGLE_TRANSLATE_URL.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, api_key, endpoint })
    }
}

fn google_translation(body: &str) -> Option<String> {
    let parsed: GoogleResponse = serde_json::from_str(body).ok()?;
    parsed
        .data
        .translations
        .into_iter()
        .next()
        .map(|t| t.translated_text)
}

#[async_trait]
impl TranslationProvider for GoogleTranslator {
    fn name(&self) -> &str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<Option<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("q", text),
                ("target", target_language),
                ("source", source_language),
                ("format", "text"),
            ])
            .send()
            .await
            .context("Google Translate request failed")?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!("Google Translate API error: {} - {}", status, body);
            return Ok(None);
        }

        Ok(google_translation(&body))
    }
}

// Translation through the configured text-generation backend

pub struct LlmTranslator {
    generator: Arc<dyn GenerationProvider>,
}

impl LlmTranslator {
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }
}

pub fn language_name(code: &str) -> &str {
    match code {
        "ur" => "Urdu",
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "zh" => "Chinese",
        "ar" => "Arabic",
        other => other,
    }
}

fn translation_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Translate the following text to {}. Preserve markdown formatting, code blocks and technical terms. Return only the translation.\n\n{}",
        language_name(target_language),
        text
    )
}

#[async_trait]
impl TranslationProvider for LlmTranslator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        _source_language: &str,
    ) -> Result<Option<String>> {
        if target_language == "en" {
            return Ok(Some(text.to_string()));
        }

        let translated = self
            .generator
            .generate(&translation_prompt(text, target_language))
            .await?;
        let translated = translated.trim();
        Ok((!translated.is_empty()).then(|| translated.to_string()))
    }
}

/// Tags the text instead of translating it. Used in development when no
/// translation backend is configured.
pub struct SimulatedTranslator;

#[async_trait]
impl TranslationProvider for SimulatedTranslator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        _source_language: &str,
    ) -> Result<Option<String>> {
        Ok(Some(format!(
            "[TRANSLATED TO {}] {} [TRANSLATION SIMULATION]",
            target_language.to_uppercase(),
            text
        )))
    }
}
