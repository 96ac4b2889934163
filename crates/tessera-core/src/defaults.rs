//! Centralized default constants for tessera.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// ENTITY RESOLUTION
// =============================================================================

/// Minimum cosine similarity for an extracted entity to resolve onto an
/// existing node of a candidate label instead of creating a new one.
pub const SIMILARITY_THRESHOLD: f32 = 0.92;

/// Number of vector hits requested per candidate label.
pub const VECTOR_SEARCH_LIMIT: usize = 1;

/// Category assigned to nodes whose entity carries no explicit category.
pub const DEFAULT_CATEGORY: &str = "Generic";

/// Suffix appended to a lower-cased label to form its vector index name.
pub const VECTOR_INDEX_SUFFIX: &str = "_embeddings";

/// Prefix of relationship types that fold property entities onto their owner.
pub const PROPERTY_REL_PREFIX: &str = "HAS_";

/// Prefix of the plural key collecting additional folded property values.
pub const ADDITIONAL_PROPERTY_PREFIX: &str = "additional";

// =============================================================================
// CONTAINER
// =============================================================================

/// Default label of the per-unit container node.
pub const CONTAINER_LABEL: &str = "Document";

/// Relationship type linking the container node to each resolved entity.
pub const CONTAINER_REL_TYPE: &str = "CONTAINS_ENTITY";

// =============================================================================
// RELATIONSHIP INFERENCE
// =============================================================================

/// Confidence assigned to ontology-rule inferred relationships.
pub const INFERENCE_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Multiplier applied to the threshold for model-inferred relationships.
pub const MODEL_CONFIDENCE_FACTOR: f32 = 0.8;

/// Maximum number of inferred relationships returned per batch.
pub const MAX_INFERRED_RELATIONSHIPS: usize = 100;

/// Suffix marking model-inferred relationship names absent from the ontology.
pub const INFERRED_SUFFIX: &str = ":INFERRED";

// =============================================================================
// ONTOLOGY
// =============================================================================

/// Types treated as generic catch-alls when an ontology declares none.
pub const GENERIC_TYPES: &[&str] = &["Entity", "Thing", "Other", "Misc"];

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding vector dimension produced by the extraction service.
pub const EMBED_DIMENSION: usize = 384;

// =============================================================================
// EXTRACTION SERVICE
// =============================================================================

/// Default extraction service base URL.
pub const EXTRACTION_URL: &str = "http://localhost:8000";

/// Timeout for extraction/embedding requests in seconds.
pub const EXTRACTION_TIMEOUT_SECS: u64 = 300;

/// Number of retries after the first failed extraction request.
pub const EXTRACTION_RETRIES: u32 = 3;

/// Base delay for exponential backoff between retries, in milliseconds.
pub const EXTRACTION_BACKOFF_BASE_MS: u64 = 1000;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_confidence_is_strictly_lower() {
        assert!(INFERENCE_CONFIDENCE_THRESHOLD * MODEL_CONFIDENCE_FACTOR < INFERENCE_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn test_similarity_threshold_in_range() {
        assert!(SIMILARITY_THRESHOLD > 0.0 && SIMILARITY_THRESHOLD <= 1.0);
    }
}
