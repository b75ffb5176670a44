use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// One stored (vector, payload) pair.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub chapter_id: String,
    pub text: String,
    pub metadata: JsonValue,
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub chapter_id: String,
    pub text: String,
    pub metadata: JsonValue,
    pub score: f32,
}

/// Stores embedding records and answers nearest-neighbor queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<()>;

    /// Up to `limit` hits, best first.
    async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredRecord>>;

    /// Removes every record whose payload `field` equals `value`.
    async fn delete_where(&self, field: &str, value: &str) -> Result<()>;
}

pub struct QdrantIndex {
    client: Qdrant,
    collection_name: String,
    dimension: u64,
}

impl QdrantIndex {
    pub async fn new(
        url: &str,
        api_key: Option<String>,
        collection_name: &str,
        dimension: usize,
    ) -> Result<Self> {
        tracing::info!("Building Qdrant client for URL: {}", url);
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Qdrant client build failed: {}", e))?;

        let index = Self {
            client,
            collection_name: collection_name.to_string(),
            dimension: dimension as u64,
        };

        if let Err(e) = index.ensure_collection().await {
            tracing::error!("Qdrant ensure_collection failed: {:?}", e);
            return Err(e);
        }
        tracing::info!("Qdrant collection {} ready", index.collection_name);

        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<()> {
        if !self.client.collection_exists(&self.collection_name).await? {
            tracing::info!("Creating Qdrant collection {}", self.collection_name);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<()> {
        let mut payload_map = JsonMap::new();
        payload_map.insert("text".to_string(), JsonValue::String(record.text));
        payload_map.insert("chapter_id".to_string(), JsonValue::String(record.chapter_id));
        payload_map.insert("metadata".to_string(), record.metadata);
        let point = PointStruct::new(record.id, record.vector, payload_map);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, vec![point]).wait(true))
            .await?;

        Ok(())
    }

    async fn query(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredRecord>> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, vector, limit).with_payload(true),
            )
            .await?;

        let hits = search_result
            .result
            .into_iter()
            .map(|point| {
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(uuid)) => uuid,
                    Some(PointIdOptions::Num(num)) => num.to_string(),
                    None => String::new(),
                };
                let mut payload = point.payload;
                ScoredRecord {
                    id,
                    chapter_id: take_string(&mut payload, "chapter_id"),
                    text: take_string(&mut payload, "text"),
                    metadata: payload
                        .remove("metadata")
                        .map(to_json)
                        .unwrap_or_else(|| JsonValue::Object(JsonMap::new())),
                    score: point.score,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn delete_where(&self, field: &str, value: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(Filter::must([Condition::matches(field, value.to_string())]))
                    .wait(true),
            )
            .await?;

        Ok(())
    }
}

fn take_string(payload: &mut HashMap<String, QdrantValue>, key: &str) -> String {
    match payload.remove(key).and_then(|v| v.kind) {
        Some(Kind::StringValue(s)) => s,
        _ => String::new(),
    }
}

fn to_json(value: QdrantValue) -> JsonValue {
    match value.kind {
        Some(Kind::NullValue(_)) | None => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::IntegerValue(i)) => JsonValue::from(i),
        Some(Kind::DoubleValue(d)) => JsonValue::from(d),
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::ListValue(list)) => JsonValue::Array(list.values.into_iter().map(to_json).collect()),
        Some(Kind::StructValue(st)) => JsonValue::Object(
            st.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ),
    }
}
