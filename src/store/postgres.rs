use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::models::{Chapter, ChatMessage, ChatSession, NewChapter, TranslationSession};
use super::{ChapterStore, ChatStore, TranslationSessionStore};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapters (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                "order" INTEGER NOT NULL,
                word_count INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS translation_sessions (
                session_id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                original_content_ref TEXT NOT NULL,
                translated_content TEXT NOT NULL,
                chapter_reference TEXT NOT NULL,
                translation_timestamp TIMESTAMPTZ NOT NULL,
                is_cached BOOLEAN NOT NULL DEFAULT TRUE,
                cache_expires_at TIMESTAMPTZ NOT NULL
            )
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_translation_sessions_user
            ON translation_sessions(user_id, translation_timestamp DESC)
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id UUID PRIMARY KEY,
                user_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id UUID PRIMARY KEY,
                session_id UUID NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages(session_id, created_at)
            "#
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChapterStore for PgStore {
    async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let chapter = sqlx::query_as::<_, Chapter>("SELECT * FROM chapters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(chapter)
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>> {
        let chapters = sqlx::query_as::<_, Chapter>(r#"SELECT * FROM chapters ORDER BY "order""#)
            .fetch_all(&self.pool)
            .await?;

        Ok(chapters)
    }

    async fn upsert_chapter(&self, chapter: NewChapter) -> Result<Chapter> {
        let now = Utc::now();
        let word_count = chapter.word_count();

        let stored = sqlx::query_as::<_, Chapter>(
            r#"
            INSERT INTO chapters (id, title, content, "order", word_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (title) DO UPDATE
            SET content = EXCLUDED.content,
                "order" = EXCLUDED."order",
                word_count = EXCLUDED.word_count,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(chapter.order)
        .bind(word_count)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }
}

#[async_trait]
impl TranslationSessionStore for PgStore {
    async fn create_translation_session(&self, session: &TranslationSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO translation_sessions
            (session_id, user_id, original_content_ref, translated_content, chapter_reference,
             translation_timestamp, is_cached, cache_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        )
        .bind(session.session_id)
        .bind(&session.user_id)
        .bind(&session.original_content_ref)
        .bind(&session.translated_content)
        .bind(&session.chapter_reference)
        .bind(session.translation_timestamp)
        .bind(session.is_cached)
        .bind(session.cache_expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn translation_sessions_for_user(&self, user_id: &str) -> Result<Vec<TranslationSession>> {
        let sessions = sqlx::query_as::<_, TranslationSession>(
            r#"
            SELECT * FROM translation_sessions
            WHERE user_id = $1
            ORDER BY translation_timestamp DESC
            LIMIT 100
            "#
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn create_chat_session(&self, user_id: Option<String>) -> Result<ChatSession> {
        let now = Utc::now();
        let session = sqlx::query_as::<_, ChatSession>(
            r#"
            INSERT INTO chat_sessions (id, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_chat_session(&self, id: Uuid) -> Result<Option<ChatSession>> {
        let session = sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn add_chat_message(&self, session_id: Uuid, role: &str, content: &str) -> Result<ChatMessage> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn chat_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE session_id = $1 ORDER BY created_at"
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
