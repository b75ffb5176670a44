use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, InitOptionsUserDefined, TextEmbedding, TokenizerFiles,
    UserDefinedEmbeddingModel,
};

/// Dimensionality of all-MiniLM-L6-v2, fixed for the whole deployment.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Maps text to fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding model returned no vector"))
    }
}

pub struct FastEmbedder {
    model: TextEmbedding,
}

impl FastEmbedder {
    /// Loads the model from `model_dir` when given, otherwise downloads
    /// all-MiniLM-L6-v2 into the fastembed cache.
    pub fn new(model_dir: Option<&str>) -> Result<Self> {
        let model = match model_dir {
            Some(dir) => Self::load_local(Path::new(dir))?,
            None => {
                tracing::info!("Loading all-MiniLM-L6-v2 embedding model...");
                TextEmbedding::try_new(InitOptions {
                    model_name: EmbeddingModel::AllMiniLML6V2,
                    show_download_progress: false,
                    ..Default::default()
                })
                .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e))?
            }
        };

        tracing::info!("Embedding model initialized successfully");
        Ok(Self { model })
    }

    fn load_local(model_dir: &Path) -> Result<TextEmbedding> {
        tracing::info!("Initializing embedding model from {}", model_dir.display());

        if !model_dir.exists() {
            anyhow::bail!("Model directory not found: {}", model_dir.display());
        }

        let read = |name: &str| {
            std::fs::read(model_dir.join(name))
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", name, e))
        };

        let user_model = UserDefinedEmbeddingModel {
            onnx_file: read("model.onnx")?,
            tokenizer_files: TokenizerFiles {
                tokenizer_file: read("tokenizer.json")?,
                config_file: read("config.json")?,
                special_tokens_map_file: read("special_tokens_map.json")?,
                tokenizer_config_file: read("tokenizer_config.json")?,
            },
        };

        TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::default())
            .map_err(|e| anyhow::anyhow!("Failed to initialize embedding model: {}", e))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.model.embed(texts, None)?;
        Ok(embeddings)
    }
}
