//! Edge writing: extracted relationships, container provenance links, and
//! persisted inferred relationships.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, instrument, trace, warn};

use tessera_core::{
    GraphStore, InferredRelationship, IngestionEntity, IngestionStats, IngestionUnit, PropertyMap,
    Relationship, Result,
};

use crate::config::IngestConfig;
use crate::folding::PropertyFolds;
use crate::naming::normalize_rel_type;

/// Batch entity id to resolved node id. Entities that failed resolution map
/// to `None`.
fn resolution_map(entities: &[IngestionEntity]) -> HashMap<&str, Option<&str>> {
    entities
        .iter()
        .map(|e| (e.id.as_str(), e.resolved_id.as_deref()))
        .collect()
}

/// Writes edges between resolved nodes.
pub struct RelationshipWriter {
    store: Arc<dyn GraphStore>,
    config: IngestConfig,
}

impl RelationshipWriter {
    pub fn new(store: Arc<dyn GraphStore>, config: IngestConfig) -> Self {
        Self { store, config }
    }

    /// Write every non-folding relationship whose endpoints both resolved.
    /// Relationships with unknown or unresolved endpoints are dropped.
    #[instrument(
        skip_all,
        fields(subsystem = "ingest", component = "relationship_writer", op = "write", input_count = relationships.len())
    )]
    pub async fn write(
        &self,
        relationships: &[Relationship],
        entities: &[IngestionEntity],
        folds: &PropertyFolds,
        stats: &mut IngestionStats,
    ) -> Result<usize> {
        let resolved = resolution_map(entities);
        let mut written = 0;

        for (index, rel) in relationships.iter().enumerate() {
            if folds.is_folding(index) {
                trace!(source = %rel.source, rel_type = %rel.rel_type, "Relationship folded into properties");
                continue;
            }

            let endpoints = (resolved.get(rel.source.as_str()), resolved.get(rel.target.as_str()));
            let (source_id, target_id) = match endpoints {
                (Some(Some(s)), Some(Some(t))) => (*s, *t),
                (None, _) | (_, None) => {
                    warn!(
                        source = %rel.source,
                        target = %rel.target,
                        rel_type = %rel.rel_type,
                        "Dropping relationship with an endpoint outside the batch"
                    );
                    stats.relationships_dropped += 1;
                    continue;
                }
                _ => {
                    warn!(
                        source = %rel.source,
                        target = %rel.target,
                        rel_type = %rel.rel_type,
                        "Dropping relationship with an unresolved endpoint"
                    );
                    stats.relationships_dropped += 1;
                    continue;
                }
            };

            let rel_type = normalize_rel_type(&rel.rel_type);
            if rel_type.is_empty() {
                warn!(source = %rel.source, target = %rel.target, "Dropping relationship without a type");
                stats.relationships_dropped += 1;
                continue;
            }

            self.store
                .merge_edge(source_id, target_id, &rel_type, rel.properties.clone())
                .await?;
            trace!(source_id, target_id, rel_type = %rel_type, "Edge written");
            written += 1;
        }

        stats.edges_written += written;
        Ok(written)
    }

    /// Create the unit's container node and, when configured, link every
    /// resolved entity to it. Returns the container id.
    #[instrument(
        skip_all,
        fields(subsystem = "ingest", component = "relationship_writer", op = "write_container", batch_id = %unit.id)
    )]
    pub async fn write_container(
        &self,
        unit: &IngestionUnit,
        entities: &[IngestionEntity],
        stats: &mut IngestionStats,
    ) -> Result<String> {
        let mut props = PropertyMap::new();
        props.insert("id".to_string(), json!(unit.id));
        props.insert(
            "name".to_string(),
            json!(unit.name.as_deref().unwrap_or(&unit.id)),
        );
        props.insert("createdAt".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(embedding) = &unit.embedding {
            props.insert("embedding".to_string(), json!(embedding));
        }
        for (key, value) in unit.properties.iter().flatten() {
            if key != "id" {
                props.insert(key.clone(), value.clone());
            }
        }

        self.store
            .merge_node(&unit.id, std::slice::from_ref(&unit.label), props)
            .await?;

        if !self.config.link_container {
            return Ok(unit.id.clone());
        }

        let mut linked: Vec<&str> = Vec::new();
        for node_id in entities.iter().filter_map(|e| e.resolved_id.as_deref()) {
            if linked.contains(&node_id) {
                continue;
            }
            self.store
                .merge_edge(&unit.id, node_id, &self.config.container_rel_type, None)
                .await?;
            linked.push(node_id);
        }
        stats.edges_written += linked.len();
        debug!(linked = linked.len(), "Container linked to resolved entities");
        Ok(unit.id.clone())
    }

    /// Persist inferred relationships as edges tagged with their confidence.
    #[instrument(
        skip_all,
        fields(subsystem = "ingest", component = "relationship_writer", op = "write_inferred", input_count = inferred.len())
    )]
    pub async fn write_inferred(
        &self,
        inferred: &[InferredRelationship],
        entities: &[IngestionEntity],
        stats: &mut IngestionStats,
    ) -> Result<usize> {
        let resolved = resolution_map(entities);
        let mut written = 0;
        for rel in inferred {
            let (Some(Some(source_id)), Some(Some(target_id))) =
                (resolved.get(rel.source.as_str()), resolved.get(rel.target.as_str()))
            else {
                debug!(
                    source = %rel.source,
                    target = %rel.target,
                    rel_type = %rel.rel_type,
                    "Inferred relationship endpoint has no node"
                );
                continue;
            };

            let mut props = PropertyMap::new();
            props.insert("confidence".to_string(), json!(rel.confidence));
            props.insert("isInferred".to_string(), json!(rel.is_inferred));
            self.store
                .merge_edge(source_id, target_id, &normalize_rel_type(&rel.rel_type), Some(props))
                .await?;
            written += 1;
        }
        stats.inferred_edges_written += written;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_db::MemoryGraphStore;

    async fn store_with_nodes(ids: &[&str]) -> Arc<MemoryGraphStore> {
        let store = Arc::new(MemoryGraphStore::new());
        for id in ids {
            store
                .merge_node(id, &["Person".to_string()], PropertyMap::new())
                .await
                .unwrap();
        }
        store
    }

    fn resolved(id: &str, node: Option<&str>) -> IngestionEntity {
        let mut entity = IngestionEntity::new(id, id, "Person");
        entity.resolved_id = node.map(String::from);
        entity
    }

    #[tokio::test]
    async fn test_write_normalizes_and_drops_unresolved() {
        let store = store_with_nodes(&["n1", "n2"]).await;
        let writer = RelationshipWriter::new(store.clone(), IngestConfig::default());
        let entities = vec![resolved("a", Some("n1")), resolved("b", Some("n2")), resolved("c", None)];
        let relationships = vec![
            Relationship::new("a", "b", "works at"),
            Relationship::new("a", "c", "KNOWS"),
            Relationship::new("a", "ghost", "KNOWS"),
        ];

        let mut stats = IngestionStats::default();
        let written = writer
            .write(&relationships, &entities, &PropertyFolds::default(), &mut stats)
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(stats.relationships_dropped, 2);
        let edges = store.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].rel_type, "WORKS_AT");
        assert_eq!((edges[0].source_id.as_str(), edges[0].target_id.as_str()), ("n1", "n2"));
    }

    #[tokio::test]
    async fn test_container_links_each_node_once() {
        let store = store_with_nodes(&["n1", "n2"]).await;
        let writer = RelationshipWriter::new(store.clone(), IngestConfig::default());
        let entities = vec![
            resolved("a", Some("n1")),
            resolved("b", Some("n2")),
            resolved("b2", Some("n2")),
            resolved("c", None),
        ];
        let unit = IngestionUnit::new("doc-1").with_name("Quarterly report");

        let mut stats = IngestionStats::default();
        let id = writer.write_container(&unit, &entities, &mut stats).await.unwrap();

        assert_eq!(id, "doc-1");
        let container = store.node("doc-1").unwrap();
        assert!(container.has_label("Document"));
        assert_eq!(container.properties["name"], json!("Quarterly report"));
        assert_eq!(store.edges_of_type("CONTAINS_ENTITY").len(), 2);
        assert_eq!(stats.edges_written, 2);
    }

    #[tokio::test]
    async fn test_container_without_links() {
        let store = store_with_nodes(&["n1"]).await;
        let config = IngestConfig {
            link_container: false,
            ..Default::default()
        };
        let writer = RelationshipWriter::new(store.clone(), config);
        let mut stats = IngestionStats::default();
        writer
            .write_container(&IngestionUnit::new("doc-2"), &[resolved("a", Some("n1"))], &mut stats)
            .await
            .unwrap();
        assert!(store.node("doc-2").is_some());
        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_write_inferred_tags_edges() {
        let store = store_with_nodes(&["n1", "n2"]).await;
        let writer = RelationshipWriter::new(store.clone(), IngestConfig::default());
        let entities = vec![resolved("a", Some("n1")), resolved("b", Some("n2"))];
        let inferred = vec![InferredRelationship {
            source: "a".to_string(),
            target: "b".to_string(),
            rel_type: "MENTORS:INFERRED".to_string(),
            confidence: 0.64,
            is_inferred: true,
        }];

        let mut stats = IngestionStats::default();
        writer.write_inferred(&inferred, &entities, &mut stats).await.unwrap();

        let edges = store.edges_of_type("MENTORS_INFERRED");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].properties["isInferred"], json!(true));
        assert_eq!(stats.inferred_edges_written, 1);
    }
}
