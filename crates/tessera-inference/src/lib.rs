//! # tessera-inference
//!
//! Clients for the services around the ingestion engine.
//!
//! This crate provides:
//! - [`ExtractionClient`]: HTTP client for the extraction service
//!   (`/extract-graph`, `/embed`, `/health`) with retry and backoff
//! - [`OllamaBackend`]: text generation through Ollama's chat API (feature `ollama`)
//! - [`LlmRelationshipInferrer`]: model-backed relationship suggestion over a
//!   batch's entities
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable the Ollama generation backend
//! - `mock`: Enable deterministic mock backends for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_inference::{ExtractionClient, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> tessera_core::Result<()> {
//!     let client = ExtractionClient::new(ExtractionConfig::from_env())?;
//!     let response = client.extract_graph("Alice works at Acme.", None).await?;
//!     let batch = response.into_batch(None);
//!     println!("{} entities", batch.entities.len());
//!     Ok(())
//! }
//! ```

pub mod extraction;
pub mod inferrer;
pub mod relation_prompt;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use tessera_core::*;

pub use extraction::{
    ExtractedEntity, ExtractedRelationship, ExtractionClient, ExtractionConfig,
    ExtractionResponse,
};
pub use inferrer::LlmRelationshipInferrer;
pub use relation_prompt::{parse_inferred_relationships, relationship_inference_prompt};

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;
