use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Map as JsonMap};

use textbook_rag::config::Settings;
use textbook_rag::indexer::extractor::load_chapter;
use textbook_rag::indexer::walker::{walk_chapters, SupportedFormat};
use textbook_rag::models::NewChapter;
use textbook_rag::rag::embeddings::{EmbeddingProvider, FastEmbedder};
use textbook_rag::rag::vector_store::QdrantIndex;
use textbook_rag::rag::{LazyGenerator, RagOptions, RagOrchestrator};
use textbook_rag::store::postgres::PgStore;
use textbook_rag::store::ChapterStore;

#[derive(Parser, Debug)]
#[command(name = "rag-indexer")]
#[command(about = "Load textbook chapters into the database and the vector index")]
struct Args {
    /// Directory of chapter files (Markdown, text, PDF, DOCX, PPTX)
    #[arg(short, long)]
    dir: PathBuf,

    /// Maximum chunk size in characters (defaults to CHUNK_SIZE)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Overlap between chunks in characters (defaults to CHUNK_OVERLAP)
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Only store chapters in the database, skip embeddings
    #[arg(long)]
    skip_embeddings: bool,
}

struct Indexer {
    chapters: Arc<PgStore>,
    rag: Option<RagOrchestrator>,
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = Settings::load()?;

    if !args.dir.exists() {
        anyhow::bail!("Directory does not exist: {}", args.dir.display());
    }

    let chunk_size = args.chunk_size.unwrap_or(settings.chunk_size);
    let chunk_overlap = args.chunk_overlap.unwrap_or(settings.chunk_overlap);
    if chunk_overlap >= chunk_size {
        anyhow::bail!("Chunk overlap ({}) must be smaller than chunk size ({})", chunk_overlap, chunk_size);
    }

    println!("Connecting to database...");
    let chapters = Arc::new(PgStore::new(&settings.database_url).await?);
    chapters.init_schema().await?;

    let rag = if args.skip_embeddings {
        None
    } else {
        println!("Initializing embedding model...");
        let embeddings = FastEmbedder::new(settings.embedding_model_dir.as_deref())?;

        println!("Connecting to Qdrant at {}...", settings.qdrant_url);
        let index = QdrantIndex::new(
            &settings.qdrant_url,
            settings.qdrant_api_key.clone(),
            &settings.collection_name,
            embeddings.dimension(),
        )
        .await?;

        Some(RagOrchestrator::new(
            Arc::new(embeddings),
            Arc::new(index),
            chapters.clone(),
            LazyGenerator::from_config(settings.generation_config()),
            RagOptions {
                top_k: settings.rag_top_k,
                chunk_overlap,
            },
        ))
    };

    let indexer = Indexer { chapters, rag, chunk_size };

    println!("Scanning directory: {}", args.dir.display());
    let files = walk_chapters(&args.dir);
    println!("Found {} chapter files", files.len());

    if files.is_empty() {
        println!("No supported files found. Exiting.");
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut success_count = 0usize;
    let mut total_records = 0usize;
    let mut failed_files: Vec<(PathBuf, String)> = Vec::new();

    for (position, (path, format)) in files.iter().enumerate() {
        pb.set_message(path.file_name().unwrap_or_default().to_string_lossy().to_string());

        match indexer.index_file(path, *format, position as i32 + 1).await {
            Ok(records) => {
                success_count += 1;
                total_records += records;
            }
            Err(e) => {
                tracing::warn!("Failed to index {}: {}", path.display(), e);
                failed_files.push((path.clone(), e.to_string()));
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Chapters stored:  {}/{}", success_count, files.len());
    println!("  Chapters failed:  {}", failed_files.len());
    println!("  Embeddings:       {}", total_records);
    println!("  Collection:       {}", settings.collection_name);

    if !failed_files.is_empty() {
        println!("\nFailed files:");
        for (path, err) in &failed_files {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}

impl Indexer {
    /// Stores one chapter file and rebuilds its embeddings. Returns the number
    /// of records written to the vector index.
    async fn index_file(&self, path: &Path, format: SupportedFormat, order: i32) -> Result<usize> {
        let chapter_file = load_chapter(path, format)?;
        if chapter_file.text.trim().is_empty() {
            anyhow::bail!("no text extracted");
        }

        let chapter = self
            .chapters
            .upsert_chapter(NewChapter {
                title: chapter_file.title.clone(),
                content: chapter_file.text.clone(),
                order,
            })
            .await?;

        let Some(rag) = self.rag.as_ref() else {
            return Ok(0);
        };

        let mut metadata = JsonMap::new();
        metadata.insert("title".to_string(), json!(chapter.title));
        metadata.insert("source_file".to_string(), json!(path.to_string_lossy()));
        metadata.insert("format".to_string(), json!(format!("{:?}", format)));

        let ids = rag
            .reindex_chapter(&chapter.id.to_string(), &chapter_file.text, self.chunk_size, &metadata)
            .await?;
        Ok(ids.len())
    }
}
