//! Deterministic doubles for providers and clocks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::rag::embeddings::EmbeddingProvider;
use crate::rag::generation::GenerationProvider;
use crate::translation::cache::Clock;
use crate::translation::provider::TranslationProvider;

pub const TEST_DIMENSION: usize = 64;

/// Bag-of-words embedding: each lowercase word bumps one hashed bucket.
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % TEST_DIMENSION as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding model unavailable")
    }
}

/// Fails for any text containing `needle`, embeds the rest like
/// [`HashEmbedder`].
pub struct FlakyEmbedder {
    needle: String,
}

impl FlakyEmbedder {
    pub fn failing_on(needle: &str) -> Self {
        Self { needle: needle.to_string() }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(&self.needle)) {
            anyhow::bail!("embedding failed");
        }
        Ok(texts.iter().map(|t| HashEmbedder::vector_for(t)).collect())
    }
}

pub struct StaticGenerator {
    answer: String,
}

impl StaticGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self { answer: answer.into() }
    }
}

#[async_trait]
impl GenerationProvider for StaticGenerator {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.answer.clone())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl GenerationProvider for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("upstream returned 503")
    }
}

/// Counts calls and returns `"[target] text"`.
#[derive(Default)]
pub struct CountingTranslator {
    calls: AtomicUsize,
}

impl CountingTranslator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for CountingTranslator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn translate(&self, text: &str, target_language: &str, _source_language: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("[{}] {}", target_language, text)))
    }
}

pub struct NoneTranslator;

#[async_trait]
impl TranslationProvider for NoneTranslator {
    fn name(&self) -> &str {
        "none"
    }

    async fn translate(&self, _text: &str, _target_language: &str, _source_language: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

pub struct FailingTranslator;

#[async_trait]
impl TranslationProvider for FailingTranslator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn translate(&self, _text: &str, _target_language: &str, _source_language: &str) -> Result<Option<String>> {
        anyhow::bail!("quota exceeded")
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
