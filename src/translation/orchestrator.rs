use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{TranslateResponse, TranslationSession};
use crate::store::TranslationSessionStore;
use super::cache::TranslationCache;
use super::provider::TranslationProvider;

const SOURCE_LANGUAGE: &str = "en";
const ORIGINAL_REF_CHARS: usize = 100;

/// Cache lookup, external translation on a miss, then cache population and a
/// durable session record.
pub struct TranslationOrchestrator {
    cache: Arc<TranslationCache>,
    provider: Arc<dyn TranslationProvider>,
    sessions: Arc<dyn TranslationSessionStore>,
}

impl TranslationOrchestrator {
    pub fn new(
        cache: Arc<TranslationCache>,
        provider: Arc<dyn TranslationProvider>,
        sessions: Arc<dyn TranslationSessionStore>,
    ) -> Self {
        Self { cache, provider, sessions }
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// `user_id` must already be authenticated and verified.
    ///
    /// The cache is keyed by user, chapter and content only, not by
    /// `target_language`. Within the TTL, a request for another language
    /// returns whatever translation was cached first, with `is_cached`
    /// set. Call [`Self::invalidate`] before switching languages.
    pub async fn translate(
        &self,
        user_id: &str,
        content: &str,
        chapter_id: &str,
        target_language: &str,
    ) -> Result<TranslateResponse> {
        if content.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        if let Some(translated_content) = self.cache.get(user_id, chapter_id, content).await {
            tracing::info!("Translation cache hit for user {} chapter {}", user_id, chapter_id);
            return Ok(TranslateResponse {
                translated_content,
                session_id: Uuid::new_v4(),
                is_cached: true,
            });
        }

        tracing::info!(
            "Translating {} chars to {} with {}",
            content.chars().count(),
            target_language,
            self.provider.name()
        );

        // No single-flight: concurrent misses on one key each reach the provider.
        let translated_content = match self
            .provider
            .translate(content, target_language, SOURCE_LANGUAGE)
            .await
        {
            Ok(Some(translated)) => translated,
            Ok(None) => {
                tracing::warn!("{} returned no translation", self.provider.name());
                format!("[TRANSLATION FAILED] {}", content)
            }
            Err(e) => {
                tracing::error!("Translation error: {}", e);
                format!("[TRANSLATION FAILED: {}] {}", e, content)
            }
        };

        let cache_expires_at = self
            .cache
            .set(user_id, chapter_id, content, &translated_content, None)
            .await;

        let session = TranslationSession {
            session_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            original_content_ref: original_content_ref(content),
            translated_content: translated_content.clone(),
            chapter_reference: chapter_id.to_string(),
            translation_timestamp: Utc::now(),
            is_cached: true,
            cache_expires_at,
        };

        if let Err(e) = self.sessions.create_translation_session(&session).await {
            tracing::error!("Failed to persist translation session {}: {}", session.session_id, e);
        }

        Ok(TranslateResponse {
            translated_content,
            session_id: session.session_id,
            is_cached: false,
        })
    }

    pub async fn invalidate(&self, user_id: &str, chapter_id: &str, content: &str) -> bool {
        self.cache.invalidate(user_id, chapter_id, content).await
    }
}

fn original_content_ref(content: &str) -> String {
    if content.chars().count() > ORIGINAL_REF_CHARS {
        format!("{}...", crate::rag::orchestrator::truncate_chars(content, ORIGINAL_REF_CHARS))
    } else {
        content.to_string()
    }
}
