//! Retrieval-augmented answering over the textbook.
//!
//! Ingestion chunks chapter text, embeds each chunk and stores it in a
//! [`vector_store::VectorIndex`]. Queries embed the question, pull the nearest
//! chunks and hand them to a [`generation::GenerationProvider`] as context.

pub mod embeddings;
pub mod generation;
pub mod memory;
pub mod orchestrator;
pub mod retriever;
pub mod vector_store;

pub use orchestrator::{LazyGenerator, QueryOutcome, RagAnswer, RagOptions, RagOrchestrator};
