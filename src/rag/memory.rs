//! In-process vector index.
//!
//! Brute-force cosine similarity over records kept in insertion order. Used by
//! the test suites and for local runs without a Qdrant server.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector_store::{EmbeddingRecord, ScoredRecord, VectorIndex};

pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    fn field_matches(record: &EmbeddingRecord, field: &str, value: &str) -> bool {
        match field {
            "chapter_id" => record.chapter_id == value,
            "text" => record.text == value,
            _ => record.metadata.get(field).and_then(|v| v.as_str()) == Some(value),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        if record.vector.len() != self.dimension {
            anyhow::bail!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                record.vector.len()
            );
        }

        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredRecord>> {
        if vector.len() != self.dimension {
            anyhow::bail!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            );
        }

        let records = self.records.read().await;
        let mut hits: Vec<ScoredRecord> = records
            .iter()
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                chapter_id: r.chapter_id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score: Self::cosine_similarity(&vector, &r.vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn delete_where(&self, field: &str, value: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !Self::field_matches(r, field, value));
        tracing::debug!("Deleted {} records where {} = {}", before - records.len(), field, value);
        Ok(())
    }
}
