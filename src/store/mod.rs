//! Relational store contracts.
//!
//! Chapters, translation sessions and chat history are persisted through these
//! traits. `postgres` is the production backend; `memory` backs the tests.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Chapter, ChatMessage, ChatSession, NewChapter, TranslationSession};

#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// `None` when the id is unknown or not a valid chapter id.
    async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>>;

    async fn list_chapters(&self) -> Result<Vec<Chapter>>;

    /// Inserts a chapter, or updates the one with the same title.
    async fn upsert_chapter(&self, chapter: NewChapter) -> Result<Chapter>;
}

#[async_trait]
pub trait TranslationSessionStore: Send + Sync {
    async fn create_translation_session(&self, session: &TranslationSession) -> Result<()>;

    /// Newest first.
    async fn translation_sessions_for_user(&self, user_id: &str) -> Result<Vec<TranslationSession>>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat_session(&self, user_id: Option<String>) -> Result<ChatSession>;

    async fn get_chat_session(&self, id: Uuid) -> Result<Option<ChatSession>>;

    async fn add_chat_message(&self, session_id: Uuid, role: &str, content: &str) -> Result<ChatMessage>;

    /// Oldest first.
    async fn chat_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>>;
}
