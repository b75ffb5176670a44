use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use textbook_rag::api::{router, AppState};
use textbook_rag::config::Settings;
use textbook_rag::rag::embeddings::{EmbeddingProvider, FastEmbedder};
use textbook_rag::rag::vector_store::QdrantIndex;
use textbook_rag::rag::{LazyGenerator, RagOptions, RagOrchestrator};
use textbook_rag::store::postgres::PgStore;
use textbook_rag::store::ChapterStore;
use textbook_rag::translation::cache::TranslationCache;
use textbook_rag::translation::orchestrator::TranslationOrchestrator;
use textbook_rag::translation::provider::build_translator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load()?;

    tracing::info!("Connecting to database");
    let store = Arc::new(PgStore::new(&settings.database_url).await?);
    store.init_schema().await?;

    let rag = match init_rag(&settings, store.clone()).await {
        Ok(rag) => {
            tracing::info!("RAG engine initialized successfully");
            Some(rag)
        }
        Err(e) => {
            tracing::warn!("RAG engine initialization failed (continuing without RAG): {}", e);
            None
        }
    };

    let cache = Arc::new(TranslationCache::new(settings.cache_ttl_hours));
    TranslationCache::start_cleanup(cache.clone(), settings.cache_cleanup_interval());
    let translation = Arc::new(TranslationOrchestrator::new(
        cache,
        build_translator(&settings)?,
        store.clone(),
    ));

    let state = Arc::new(AppState {
        rag,
        translation,
        chapters: store.clone(),
        chats: store.clone(),
        sessions: store,
    });

    let app = router(state, Duration::from_secs(settings.request_timeout_secs));

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    tracing::info!("Textbook backend listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn init_rag(settings: &Settings, chapters: Arc<dyn ChapterStore>) -> Result<Arc<RagOrchestrator>> {
    let model_dir = settings.embedding_model_dir.clone();
    let embeddings = tokio::task::spawn_blocking(move || FastEmbedder::new(model_dir.as_deref())).await??;

    tracing::info!("Connecting to Qdrant: {}", settings.qdrant_url);
    let index = QdrantIndex::new(
        &settings.qdrant_url,
        settings.qdrant_api_key.clone(),
        &settings.collection_name,
        embeddings.dimension(),
    )
    .await?;

    Ok(Arc::new(RagOrchestrator::new(
        Arc::new(embeddings),
        Arc::new(index),
        chapters,
        LazyGenerator::from_config(settings.generation_config()),
        RagOptions {
            top_k: settings.rag_top_k,
            chunk_overlap: settings.chunk_overlap,
        },
    )))
}
