use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

// RAG query types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub text_snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQueryResponse {
    pub response: String,
    pub sources: Vec<Source>,
    pub session_id: Option<String>,
}

// Translation types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub content: String,
    pub chapter_id: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

pub fn default_target_language() -> String {
    "ur".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translated_content: String,
    pub session_id: Uuid,
    pub is_cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub content: String,
    pub chapter_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub removed: bool,
}

/// Durable audit record written once per translation that reached the
/// external translator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TranslationSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub original_content_ref: String,
    pub translated_content: String,
    pub chapter_reference: String,
    pub translation_timestamp: DateTime<Utc>,
    pub is_cached: bool,
    pub cache_expires_at: DateTime<Utc>,
}

// Chapter types

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chapter {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub order: i32,
    pub word_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: Uuid,
    pub title: String,
    pub order: i32,
    pub word_count: i32,
}

impl From<&Chapter> for ChapterSummary {
    fn from(chapter: &Chapter) -> Self {
        Self {
            id: chapter.id,
            title: chapter.title.clone(),
            order: chapter.order,
            word_count: chapter.word_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChapter {
    pub title: String,
    pub content: String,
    pub order: i32,
}

impl NewChapter {
    pub fn word_count(&self) -> i32 {
        self.content.split_whitespace().count() as i32
    }
}

// Chat history types

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateChatSessionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}
