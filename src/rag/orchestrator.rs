use std::sync::Arc;

use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::indexer::chunker::chunk_document;
use crate::models::{RagQueryResponse, Source};
use crate::store::ChapterStore;
use super::embeddings::EmbeddingProvider;
use super::generation::{build_generator, GenerationConfig, GenerationProvider};
use super::retriever::{RetrievalResult, Retriever};
use super::vector_store::{EmbeddingRecord, VectorIndex};

pub const NO_CONTEXT_MESSAGE: &str = "I couldn't find relevant information in the textbook for your query. Please try rephrasing your question or consult the textbook directly.";

const SNIPPET_CHARS: usize = 200;
const DEGRADED_CONTEXT_CHARS: usize = 500;

/// How a query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Answered,
    NoContext,
    DegradedAnswer,
    ConfigError,
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub outcome: QueryOutcome,
    pub response: RagQueryResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorState {
    Uninitialized,
    Ready,
    Failed(String),
}

type GeneratorFactory =
    Box<dyn Fn() -> std::result::Result<Arc<dyn GenerationProvider>, Error> + Send + Sync>;

/// Generation backend built on first use.
///
/// Initialization runs at most once even with concurrent first callers; a
/// failure is remembered and reported on every later call.
pub struct LazyGenerator {
    provider_name: String,
    factory: GeneratorFactory,
    cell: OnceCell<std::result::Result<Arc<dyn GenerationProvider>, String>>,
}

impl LazyGenerator {
    pub fn from_config(config: GenerationConfig) -> Self {
        let provider_name = config.kind.as_str().to_string();
        Self::with_factory(provider_name, move || build_generator(&config))
    }

    pub fn with_factory<F>(provider_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> std::result::Result<Arc<dyn GenerationProvider>, Error> + Send + Sync + 'static,
    {
        Self {
            provider_name: provider_name.into(),
            factory: Box::new(factory),
            cell: OnceCell::new(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn state(&self) -> GeneratorState {
        match self.cell.get() {
            None => GeneratorState::Uninitialized,
            Some(Ok(_)) => GeneratorState::Ready,
            Some(Err(message)) => GeneratorState::Failed(message.clone()),
        }
    }

    pub async fn get(&self) -> std::result::Result<Arc<dyn GenerationProvider>, String> {
        self.cell
            .get_or_init(|| async {
                match (self.factory)() {
                    Ok(generator) => Ok(generator),
                    Err(Error::Configuration(message)) => {
                        tracing::error!("Generation provider misconfigured: {}", message);
                        Err(message)
                    }
                    Err(e) => {
                        tracing::error!("Failed to initialize generation provider: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct RagOptions {
    pub top_k: u64,
    pub chunk_overlap: usize,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self { top_k: 3, chunk_overlap: 100 }
    }
}

pub struct RagOrchestrator {
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    generator: LazyGenerator,
    options: RagOptions,
}

impl RagOrchestrator {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chapters: Arc<dyn ChapterStore>,
        generator: LazyGenerator,
        options: RagOptions,
    ) -> Self {
        let retriever = Retriever::new(embeddings.clone(), index.clone(), chapters);
        Self {
            embeddings,
            index,
            retriever,
            generator,
            options,
        }
    }

    pub fn generator_state(&self) -> GeneratorState {
        self.generator.state()
    }

    /// Answers `query` from retrieved textbook context. Never fails: provider
    /// problems come back as a degraded or explanatory response.
    pub async fn process_query(&self, query: &str, session_id: Option<String>) -> RagAnswer {
        let generator = match self.generator.get().await {
            Ok(generator) => generator,
            Err(message) => {
                return RagAnswer {
                    outcome: QueryOutcome::ConfigError,
                    response: RagQueryResponse {
                        response: format!("Configuration error: {}", message),
                        sources: Vec::new(),
                        session_id,
                    },
                };
            }
        };

        tracing::info!("Processing query: {}", truncate_chars(query, 100));

        let results = match self.retriever.retrieve(query, self.options.top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Retrieval failed: {}", e);
                Vec::new()
            }
        };

        if results.is_empty() {
            tracing::warn!("No relevant results found in vector store");
            return RagAnswer {
                outcome: QueryOutcome::NoContext,
                response: RagQueryResponse {
                    response: NO_CONTEXT_MESSAGE.to_string(),
                    sources: Vec::new(),
                    session_id,
                },
            };
        }

        let sources = results.iter().map(source_for).collect::<Vec<_>>();
        let context = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(&context, query);

        match generator.generate(&prompt).await {
            Ok(answer) => {
                tracing::info!("Generated response with {}", generator.name());
                RagAnswer {
                    outcome: QueryOutcome::Answered,
                    response: RagQueryResponse {
                        response: answer,
                        sources,
                        session_id,
                    },
                }
            }
            Err(e) => {
                tracing::error!("Error calling {} API: {:#}", generator.name(), e);
                RagAnswer {
                    outcome: QueryOutcome::DegradedAnswer,
                    response: RagQueryResponse {
                        response: degraded_response(&context, self.generator.provider_name()),
                        sources,
                        session_id,
                    },
                }
            }
        }
    }

    /// Chunks `text`, embeds every chunk and stores it under `chapter_id`.
    /// Returns the ids of the stored records; chunks that fail are logged and
    /// skipped.
    pub async fn process_text_for_embeddings(
        &self,
        text: &str,
        chapter_id: &str,
        chunk_size: usize,
    ) -> Result<Vec<String>> {
        self.store_chunks(text, chapter_id, chunk_size, &JsonMap::new()).await
    }

    /// Like [`Self::process_text_for_embeddings`], with extra metadata copied
    /// onto every record.
    pub async fn store_chunks(
        &self,
        text: &str,
        chapter_id: &str,
        chunk_size: usize,
        extra_metadata: &JsonMap<String, JsonValue>,
    ) -> Result<Vec<String>> {
        tracing::info!(
            "Processing text for embeddings, chapter_id: {}, length: {} chars",
            chapter_id,
            text.chars().count()
        );

        let chunks = chunk_document(chapter_id, text, chunk_size, self.options.chunk_overlap, extra_metadata)?;
        tracing::info!("Created {} chunks for embedding", chunks.len());

        let mut stored = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = match self.embeddings.embed_one(&chunk.text).await {
                Ok(vector) => vector,
                Err(e) => {
                    tracing::error!("Error embedding chunk {}: {}", chunk.chunk_index, e);
                    continue;
                }
            };

            let mut metadata = chunk.extra_metadata.clone();
            metadata.insert("chunk_index".to_string(), json!(chunk.chunk_index));
            metadata.insert("total_chunks".to_string(), json!(chunk.total_chunks));
            metadata.insert("chunk_length".to_string(), json!(chunk.text.chars().count()));

            let id = Uuid::new_v4().to_string();
            let record = EmbeddingRecord {
                id: id.clone(),
                vector,
                chapter_id: chunk.document_id.clone(),
                text: chunk.text,
                metadata: JsonValue::Object(metadata),
            };

            match self.index.upsert(record).await {
                Ok(()) => {
                    tracing::debug!("Stored embedding for chunk {}, point_id: {}", chunk.chunk_index, id);
                    stored.push(id);
                }
                Err(e) => tracing::error!("Error storing chunk {}: {}", chunk.chunk_index, e),
            }
        }

        tracing::info!("Stored {} embeddings for chapter {}", stored.len(), chapter_id);
        Ok(stored)
    }

    /// Replaces every stored record of `chapter_id` with fresh chunks of
    /// `text`.
    pub async fn reindex_chapter(
        &self,
        chapter_id: &str,
        text: &str,
        chunk_size: usize,
        extra_metadata: &JsonMap<String, JsonValue>,
    ) -> Result<Vec<String>> {
        self.index
            .delete_where("chapter_id", chapter_id)
            .await
            .map_err(|e| Error::provider("vector index", e))?;
        self.store_chunks(text, chapter_id, chunk_size, extra_metadata).await
    }
}

pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are an AI assistant for a textbook on Physical AI and Humanoid Robotics.\n\
         Answer the user's question based only on the provided context from the textbook.\n\n\
         Context: {context}\n\n\
         Question: {query}\n\n\
         Please provide a helpful and accurate answer based only on the context provided.\n\
         If the context doesn't contain the information needed to answer the question,\n\
         please say so explicitly.\n\n\
         Format your response in a clear and structured way, using markdown if appropriate."
    )
}

fn degraded_response(context: &str, provider_name: &str) -> String {
    format!(
        "I encountered an issue generating a response. Based on the textbook content:\n\n{}...\n\nFor a complete answer, please ensure your {} API key is properly configured.",
        truncate_chars(context, DEGRADED_CONTEXT_CHARS),
        provider_name
    )
}

fn source_for(result: &RetrievalResult) -> Source {
    let text_snippet = if result.text.chars().count() > SNIPPET_CHARS {
        format!("{}...", truncate_chars(&result.text, SNIPPET_CHARS))
    } else {
        result.text.clone()
    };
    Source {
        title: result.chapter_title.clone(),
        text_snippet,
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => &text[..byte_pos],
        None => text,
    }
}
