use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::store::ChapterStore;
use super::embeddings::EmbeddingProvider;
use super::vector_store::VectorIndex;

/// Title used when a hit points at a chapter that no longer exists.
pub const UNKNOWN_CHAPTER: &str = "Unknown Chapter";

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub text: String,
    pub chapter_id: String,
    pub chapter_title: String,
    pub metadata: JsonValue,
    pub score: f32,
}

pub struct Retriever {
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chapters: Arc<dyn ChapterStore>,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chapters: Arc<dyn ChapterStore>,
    ) -> Self {
        Self { embeddings, index, chapters }
    }

    /// Top `k` chunks for `query`, best first. An empty index yields an
    /// empty list.
    pub async fn retrieve(&self, query: &str, k: u64) -> Result<Vec<RetrievalResult>> {
        let query_embedding = self
            .embeddings
            .embed_one(query)
            .await
            .map_err(|e| Error::provider("embedding", e))?;

        let hits = self
            .index
            .query(query_embedding, k)
            .await
            .map_err(|e| Error::provider("vector index", e))?;

        let titles = join_all(hits.iter().map(|hit| self.chapter_title(&hit.chapter_id))).await;

        Ok(hits
            .into_iter()
            .zip(titles)
            .map(|(hit, chapter_title)| RetrievalResult {
                text: hit.text,
                chapter_id: hit.chapter_id,
                chapter_title,
                metadata: hit.metadata,
                score: hit.score,
            })
            .collect())
    }

    async fn chapter_title(&self, chapter_id: &str) -> String {
        match self.chapters.get_chapter(chapter_id).await {
            Ok(Some(chapter)) => chapter.title,
            Ok(None) => UNKNOWN_CHAPTER.to_string(),
            Err(e) => {
                tracing::warn!("Chapter lookup failed for {}: {}", chapter_id, e);
                UNKNOWN_CHAPTER.to_string()
            }
        }
    }
}
