use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Chapter, ChatMessage, ChatSession, NewChapter, TranslationSession};
use super::{ChapterStore, ChatStore, TranslationSessionStore};

/// Process-local store with the same contracts as the Postgres backend.
#[derive(Default)]
pub struct MemoryStore {
    chapters: RwLock<Vec<Chapter>>,
    translation_sessions: RwLock<Vec<TranslationSession>>,
    chat_sessions: RwLock<HashMap<Uuid, ChatSession>>,
    chat_messages: RwLock<Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn translation_session_count(&self) -> usize {
        self.translation_sessions.read().await.len()
    }
}

#[async_trait]
impl ChapterStore for MemoryStore {
    async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let chapters = self.chapters.read().await;
        Ok(chapters.iter().find(|c| c.id == id).cloned())
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>> {
        let mut chapters = self.chapters.read().await.clone();
        chapters.sort_by_key(|c| c.order);
        Ok(chapters)
    }

    async fn upsert_chapter(&self, chapter: NewChapter) -> Result<Chapter> {
        let now = Utc::now();
        let word_count = chapter.word_count();
        let mut chapters = self.chapters.write().await;

        if let Some(existing) = chapters.iter_mut().find(|c| c.title == chapter.title) {
            existing.content = chapter.content;
            existing.order = chapter.order;
            existing.word_count = word_count;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = Chapter {
            id: Uuid::new_v4(),
            title: chapter.title,
            content: chapter.content,
            order: chapter.order,
            word_count,
            created_at: now,
            updated_at: now,
        };
        chapters.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl TranslationSessionStore for MemoryStore {
    async fn create_translation_session(&self, session: &TranslationSession) -> Result<()> {
        self.translation_sessions.write().await.push(session.clone());
        Ok(())
    }

    async fn translation_sessions_for_user(&self, user_id: &str) -> Result<Vec<TranslationSession>> {
        let sessions = self.translation_sessions.read().await;
        Ok(sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_chat_session(&self, user_id: Option<String>) -> Result<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            updated_at: now,
        };
        self.chat_sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_chat_session(&self, id: Uuid) -> Result<Option<ChatSession>> {
        Ok(self.chat_sessions.read().await.get(&id).cloned())
    }

    async fn add_chat_message(&self, session_id: Uuid, role: &str, content: &str) -> Result<ChatMessage> {
        let now = Utc::now();
        {
            let mut sessions = self.chat_sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| anyhow::anyhow!("Chat session {} not found", session_id))?;
            session.updated_at = now;
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            role: role.to_string(),
            content: content.to_string(),
            created_at: now,
        };
        self.chat_messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn chat_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        let messages = self.chat_messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }
}
