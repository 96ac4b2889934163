//! Core traits for tessera abstractions.
//!
//! These traits define the interfaces that external collaborators must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;

use crate::defaults;
use crate::error::Result;
use crate::models::*;
use crate::ontology::{OntologyEntityType, RelationshipRule};

// =============================================================================
// ONTOLOGY REGISTRY
// =============================================================================

/// Read-only catalog of entity types and relationship rules.
pub trait OntologyRegistry: Send + Sync {
    /// All declared entity types, property types included.
    fn list_entity_types(&self) -> Vec<OntologyEntityType>;

    /// Canonical names of types folded onto owning nodes.
    fn list_property_types(&self) -> Vec<String>;

    /// Canonical names of types with a dedicated vector index.
    fn list_indexable_types(&self) -> Vec<String>;

    /// Super-type chain of a canonical type, nearest first.
    fn super_types_of(&self, type_name: &str) -> Vec<String>;

    /// Declared `(name, source_type, target_type)` rules.
    fn relationship_rules(&self) -> Vec<RelationshipRule>;

    /// Generic catch-all labels whose entities are never persisted.
    fn generic_types(&self) -> Vec<String> {
        defaults::GENERIC_TYPES.iter().map(|s| s.to_string()).collect()
    }
}

// =============================================================================
// GRAPH STORE
// =============================================================================

/// Derive the vector index name of a label: `lower(label) + "_embeddings"`.
pub fn vector_index_name(label: &str) -> String {
    format!("{}{}", label.to_lowercase(), defaults::VECTOR_INDEX_SUFFIX)
}

/// Session-scoped access to the persistent property graph.
///
/// Implementations merge rather than create: writing the same node id or the
/// same `(source, target, type)` edge twice never duplicates it.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Query a vector index for the nodes closest to `embedding`.
    ///
    /// Returns [`crate::Error::IndexNotFound`] when `index_name` does not exist.
    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>>;

    /// Create or update a node. Labels are unioned with existing ones and
    /// properties overlay existing ones; an `embedding` property is stored as
    /// the node's vector. An existing `createdAt` is preserved.
    async fn merge_node(
        &self,
        id: &str,
        labels: &[String],
        properties: PropertyMap,
    ) -> Result<MergeOutcome>;

    /// Create or update an edge. Both endpoints must exist.
    async fn merge_edge(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        properties: Option<PropertyMap>,
    ) -> Result<MergeOutcome>;

    /// Overlay properties onto an existing node.
    async fn update_node_properties(&self, id: &str, properties: PropertyMap) -> Result<()>;

    /// Fetch a node by id.
    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>>;

    /// Create the vector index of `label` if it does not exist yet.
    async fn ensure_vector_index(&self, label: &str, dimension: usize) -> Result<()>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate text constrained to a JSON document.
    ///
    /// Backends without native JSON mode fall back to plain generation.
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Model-backed relationship suggestion over a batch's entities.
///
/// Implementations return raw `(source, target, type)` triples; the inference
/// engine validates endpoints, tags confidence, and renames non-ontology
/// relationship types.
#[async_trait]
pub trait RelationshipInferrer: Send + Sync {
    async fn infer(&self, entities: &[IngestionEntity]) -> Result<Vec<Relationship>>;
}

/// Inferrer that never suggests anything (ontology-rule-only mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInferrer;

#[async_trait]
impl RelationshipInferrer for NoopInferrer {
    async fn infer(&self, _entities: &[IngestionEntity]) -> Result<Vec<Relationship>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_index_name() {
        assert_eq!(vector_index_name("Person"), "person_embeddings");
        assert_eq!(vector_index_name("FinancialInstitution"), "financialinstitution_embeddings");
    }

    #[tokio::test]
    async fn test_noop_inferrer_returns_nothing() {
        let entities = vec![IngestionEntity::new("a", "Alice", "Person")];
        let inferred = NoopInferrer.infer(&entities).await.unwrap();
        assert!(inferred.is_empty());
    }

    #[test]
    fn test_traits_are_object_safe() {
        fn _store(_: &dyn GraphStore) {}
        fn _registry(_: &dyn OntologyRegistry) {}
        fn _inferrer(_: &dyn RelationshipInferrer) {}
        fn _embedder(_: &dyn EmbeddingBackend) {}
        fn _generator(_: &dyn GenerationBackend) {}
    }
}
