//! Translation with a per-user cache and a durable audit trail.

pub mod cache;
pub mod orchestrator;
pub mod provider;
