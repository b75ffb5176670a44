pub mod api;
pub mod config;
pub mod error;
pub mod indexer;
pub mod models;
pub mod rag;
pub mod store;
pub mod translation;

#[cfg(test)]
mod testing;
