//! In-process graph store.
//!
//! Mirrors the merge semantics of [`crate::PgGraphStore`] with exact
//! (brute-force) cosine search. Used for dry runs without a database and as
//! the store behind the engine tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::trace;

use tessera_core::{
    vector_index_name, Error, GraphEdge, GraphNode, GraphStore, MergeOutcome, PropertyMap,
    Result, VectorMatch,
};

type EdgeKey = (String, String, String);

#[derive(Default)]
struct MemoryState {
    nodes: Vec<GraphNode>,
    node_positions: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    edge_positions: HashMap<EdgeKey, usize>,
    /// index name -> (label, dimension)
    indexes: HashMap<String, (String, usize)>,
}

/// Cosine similarity of two vectors, accumulated in `f64`.
///
/// Returns 0.0 for mismatched lengths or zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Graph store held entirely in memory.
#[derive(Default)]
pub struct MemoryGraphStore {
    state: RwLock<MemoryState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodes
            .len()
    }

    pub fn edge_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .edges
            .len()
    }

    /// Snapshot of all nodes in insertion order.
    pub fn nodes(&self) -> Vec<GraphNode> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodes
            .clone()
    }

    /// Snapshot of all edges in insertion order.
    pub fn edges(&self) -> Vec<GraphEdge> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .edges
            .clone()
    }

    pub fn edges_of_type(&self, rel_type: &str) -> Vec<GraphEdge> {
        self.edges()
            .into_iter()
            .filter(|e| e.rel_type == rel_type)
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<GraphNode> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.node_positions.get(id).map(|&i| state.nodes[i].clone())
    }

    /// Nodes carrying `label`.
    pub fn nodes_with_label(&self, label: &str) -> Vec<GraphNode> {
        self.nodes()
            .into_iter()
            .filter(|n| n.has_label(label))
            .collect()
    }
}

fn take_embedding(properties: &mut PropertyMap) -> Option<Vec<f32>> {
    properties
        .remove("embedding")
        .and_then(|v| serde_json::from_value::<Vec<f32>>(v).ok())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let (label, dimension) = state
            .indexes
            .get(index_name)
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;

        if embedding.len() != *dimension {
            return Err(Error::InvalidInput(format!(
                "Query vector has {} dimensions, index {} expects {}",
                embedding.len(),
                index_name,
                dimension
            )));
        }

        let mut matches: Vec<VectorMatch> = state
            .nodes
            .iter()
            .filter(|n| n.has_label(label))
            .filter_map(|n| {
                let stored = n.embedding.as_deref()?;
                if stored.len() != *dimension {
                    return None;
                }
                Some(VectorMatch {
                    node: n.clone(),
                    score: cosine_similarity(embedding, stored),
                })
            })
            .collect();

        // Stable: ties keep insertion order.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(limit);

        trace!(
            subsystem = "db",
            component = "memory",
            op = "vector_search",
            index = index_name,
            result_count = matches.len(),
            "Vector search complete"
        );
        Ok(matches)
    }

    async fn merge_node(
        &self,
        id: &str,
        labels: &[String],
        mut properties: PropertyMap,
    ) -> Result<MergeOutcome> {
        let embedding = take_embedding(&mut properties);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(&position) = state.node_positions.get(id) {
            let node = &mut state.nodes[position];
            for label in labels {
                if !node.has_label(label) {
                    node.labels.push(label.clone());
                }
            }
            for (key, value) in properties {
                if key == "createdAt" && node.properties.contains_key("createdAt") {
                    continue;
                }
                node.properties.insert(key, value);
            }
            if embedding.is_some() {
                node.embedding = embedding;
            }
            return Ok(MergeOutcome::Updated);
        }

        let mut unique_labels: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !unique_labels.contains(label) {
                unique_labels.push(label.clone());
            }
        }
        let position = state.nodes.len();
        state.nodes.push(GraphNode {
            id: id.to_string(),
            labels: unique_labels,
            properties,
            embedding,
        });
        state.node_positions.insert(id.to_string(), position);
        Ok(MergeOutcome::Created)
    }

    async fn merge_edge(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        properties: Option<PropertyMap>,
    ) -> Result<MergeOutcome> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for endpoint in [source_id, target_id] {
            if !state.node_positions.contains_key(endpoint) {
                return Err(Error::NodeNotFound(endpoint.to_string()));
            }
        }

        let key = (
            source_id.to_string(),
            target_id.to_string(),
            rel_type.to_string(),
        );
        if let Some(&position) = state.edge_positions.get(&key) {
            if let Some(props) = properties {
                state.edges[position].properties.extend(props);
            }
            return Ok(MergeOutcome::Updated);
        }

        let position = state.edges.len();
        state.edges.push(GraphEdge {
            source_id: key.0.clone(),
            target_id: key.1.clone(),
            rel_type: key.2.clone(),
            properties: properties.unwrap_or_default(),
        });
        state.edge_positions.insert(key, position);
        Ok(MergeOutcome::Created)
    }

    async fn update_node_properties(&self, id: &str, properties: PropertyMap) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let position = *state
            .node_positions
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
        let node = &mut state.nodes[position];
        for (key, value) in properties {
            if key == "createdAt" && node.properties.contains_key("createdAt") {
                continue;
            }
            if key == "embedding" {
                if let Ok(vector) = serde_json::from_value::<Vec<f32>>(value) {
                    node.embedding = Some(vector);
                }
                continue;
            }
            node.properties.insert(key, value);
        }
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        Ok(self.node(id))
    }

    async fn ensure_vector_index(&self, label: &str, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(Error::InvalidInput(format!(
                "Vector index for {} needs a positive dimension",
                label
            )));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .indexes
            .entry(vector_index_name(label))
            .or_insert_with(|| (label.to_string(), dimension));
        Ok(())
    }
}

/// Shorthand for building property maps in tests and fixtures.
pub fn property_map(value: JsonValue) -> PropertyMap {
    match value {
        JsonValue::Object(map) => map,
        _ => PropertyMap::new(),
    }
}
