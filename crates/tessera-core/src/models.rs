//! Data model for ingestion batches and persisted graph elements.
//!
//! Batch types (`IngestionEntity`, `Relationship`, `IngestionBatch`) live for
//! a single ingestion and are never persisted as-is. Graph types
//! (`GraphNode`, `GraphEdge`) mirror what the graph store owns.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults;

/// Flat property bag attached to entities, nodes, and edges.
pub type PropertyMap = serde_json::Map<String, JsonValue>;

// =============================================================================
// BATCH TYPES
// =============================================================================

/// One extracted entity mention.
///
/// `id` is extractor-local and unstable across runs; `resolved_id` is set
/// once the entity has been mapped onto a persisted node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEntity {
    pub id: String,
    pub name: String,
    /// Raw, pre-canonicalization type label.
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
    /// Nested enrichment payload, flattened onto the node at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_data: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_id: Option<String>,
}

impl IngestionEntity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_enriched_data(mut self, enriched: PropertyMap) -> Self {
        self.enriched_data = Some(enriched);
        self
    }

    /// True when the entity carries a non-empty embedding vector.
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// A `(source, target, type)` triple referencing `IngestionEntity::id`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            rel_type: rel_type.into(),
            properties: None,
        }
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// A relationship candidate produced by the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub confidence: f32,
    /// True for model-derived edges; false for ontology-rule edges.
    pub is_inferred: bool,
}

impl InferredRelationship {
    /// Deduplication key: `(type, source, target)`.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.rel_type, &self.source, &self.target)
    }
}

fn default_container_label() -> String {
    defaults::CONTAINER_LABEL.to_string()
}

/// The coordinating unit a batch was extracted from (document, message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionUnit {
    pub id: String,
    #[serde(default = "default_container_label")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
}

impl IngestionUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: default_container_label(),
            name: None,
            embedding: None,
            properties: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One batch of extractor output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<IngestionUnit>,
    #[serde(default)]
    pub entities: Vec<IngestionEntity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl IngestionBatch {
    pub fn new(entities: Vec<IngestionEntity>, relationships: Vec<Relationship>) -> Self {
        Self {
            unit: None,
            entities,
            relationships,
        }
    }

    pub fn with_unit(mut self, unit: IngestionUnit) -> Self {
        self.unit = Some(unit);
        self
    }
}

// =============================================================================
// GRAPH TYPES
// =============================================================================

/// A node as persisted by the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub labels: Vec<String>,
    /// Flattened property bag, including `name`, `category`, and `createdAt`.
    pub properties: PropertyMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl GraphNode {
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(|v| v.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// An edge as persisted by the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// One hit of a vector index query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub node: GraphNode,
    /// Cosine similarity in `[-1, 1]`; higher is closer.
    pub score: f32,
}

/// Whether a merge created a new element or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    Created,
    Updated,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Per-batch statistics returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    pub entities_received: usize,
    /// Nodes that did not exist before this batch.
    pub nodes_created: usize,
    /// Entities resolved onto an existing node through vector similarity.
    pub nodes_matched: usize,
    /// Entities whose deterministic node id already existed.
    pub nodes_merged: usize,
    pub entities_skipped: usize,
    pub properties_folded: usize,
    pub edges_written: usize,
    pub relationships_dropped: usize,
    pub inferred_relationships: usize,
    pub inferred_edges_written: usize,
    pub embeddings_generated: usize,
}

/// Outcome of ingesting one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    /// Id of the container node, when the batch carried a unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Batch entities with `resolved_id` populated where resolution succeeded.
    pub entities: Vec<IngestionEntity>,
    pub inferred: Vec<InferredRelationship>,
    pub stats: IngestionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_deserializes_camel_case() {
        let entity: IngestionEntity = serde_json::from_value(json!({
            "id": "a",
            "name": "Alice",
            "type": "Person",
            "enrichedData": {"linkedin": {"url": "https://example.com/alice"}},
            "resolvedId": "n1"
        }))
        .unwrap();

        assert_eq!(entity.entity_type, "Person");
        assert!(entity.enriched_data.is_some());
        assert_eq!(entity.resolved_id.as_deref(), Some("n1"));
        assert!(!entity.has_embedding());
    }

    #[test]
    fn test_empty_embedding_is_not_an_embedding() {
        let entity = IngestionEntity::new("a", "Alice", "Person").with_embedding(vec![]);
        assert!(!entity.has_embedding());
    }

    #[test]
    fn test_batch_defaults_missing_arrays() {
        let batch: IngestionBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.entities.is_empty());
        assert!(batch.relationships.is_empty());
        assert!(batch.unit.is_none());
    }

    #[test]
    fn test_unit_label_defaults_to_document() {
        let unit: IngestionUnit = serde_json::from_value(json!({"id": "msg-1"})).unwrap();
        assert_eq!(unit.label, "Document");
    }

    #[test]
    fn test_relationship_type_field_name() {
        let rel = Relationship::new("a", "b", "WORKS_AT");
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(value["type"], "WORKS_AT");
        assert!(value.get("properties").is_none());
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = IngestionStats {
            nodes_created: 2,
            ..Default::default()
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["nodesCreated"], 2);
        assert_eq!(value["edgesWritten"], 0);
    }
}
