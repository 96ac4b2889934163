//! Entity resolution: vector dedup against existing nodes, node creation,
//! and property folding.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, instrument, trace, warn};

use tessera_core::{
    entity_node_id, new_v7, vector_index_name, GraphNode, GraphStore, IngestionEntity, IngestionStats,
    MergeOutcome, PropertyMap, Result,
};

use crate::config::IngestConfig;
use crate::folding::{flatten_enriched, PropertyFolds};
use crate::resolver::TypeClassification;

/// Why an entity does not become a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unrecognized,
    Generic,
    /// Neither an embedding nor an indexable label to dedup against.
    NotResolvable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unrecognized => "unrecognized type",
            SkipReason::Generic => "generic type",
            SkipReason::NotResolvable => "no embedding and no indexable type",
        }
    }
}

/// Skip rules applied before any store access. Property types are handled
/// by folding and are not reported here.
pub fn skip_reason(entity: &IngestionEntity, class: &TypeClassification) -> Option<SkipReason> {
    if class.is_unrecognized() {
        return Some(SkipReason::Unrecognized);
    }
    if class.is_generic {
        return Some(SkipReason::Generic);
    }
    if !entity.has_embedding() && class.candidate_labels().is_empty() {
        return Some(SkipReason::NotResolvable);
    }
    None
}

/// Result of looking an embedding up in the candidate label indexes.
enum Lookup {
    Matched(GraphNode, String, f32),
    /// At least one index answered and nothing reached the threshold.
    BelowThreshold,
    /// No index could be searched.
    NotSearched,
}

/// Resolves batch entities onto persisted nodes.
pub struct EntityResolver {
    store: Arc<dyn GraphStore>,
    config: IngestConfig,
    ensured_indexes: Mutex<HashSet<String>>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn GraphStore>, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            ensured_indexes: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve one entity, returning the id of the node it maps to.
    ///
    /// Returns `Ok(None)` for skipped and folded property entities. Store
    /// write failures propagate; vector search failures count as no match.
    #[instrument(
        skip(self, entity, class, folds, stats),
        fields(subsystem = "ingest", component = "entity_resolver", op = "resolve", entity_id = %entity.id)
    )]
    pub async fn resolve(
        &self,
        entity: &IngestionEntity,
        class: &TypeClassification,
        folds: &PropertyFolds,
        stats: &mut IngestionStats,
    ) -> Result<Option<String>> {
        if class.is_property {
            if folds.is_folded_entity(&entity.id) {
                trace!(entity_type = %class.primary, "Property entity folds onto its owner");
            } else {
                warn!(
                    entity_type = %class.primary,
                    name = %entity.name,
                    "Skipping property entity without an owning relationship"
                );
                stats.entities_skipped += 1;
            }
            return Ok(None);
        }

        if let Some(reason) = skip_reason(entity, class) {
            warn!(
                entity_type = %entity.entity_type,
                name = %entity.name,
                reason = reason.as_str(),
                "Skipping entity"
            );
            stats.entities_skipped += 1;
            return Ok(None);
        }

        let lookup = match entity.embedding.as_deref() {
            Some(embedding) => self.find_match(class, embedding).await,
            None => Lookup::NotSearched,
        };
        let rejected_by_search = match lookup {
            Lookup::Matched(node, label, score) => {
                debug!(
                    node_id = %node.id,
                    label = %label,
                    score,
                    "Entity matched existing node"
                );
                self.fold_onto_existing(&node, &entity.id, folds, stats).await?;
                stats.nodes_matched += 1;
                return Ok(Some(node.id));
            }
            Lookup::BelowThreshold => true,
            Lookup::NotSearched => false,
        };

        let id = self.node_id_for(entity, class, rejected_by_search).await?;
        let id = self.create(id, entity, class, folds, stats).await?;
        Ok(Some(id))
    }

    /// Name-derived id, unless the vector lookup already rejected the node
    /// holding it. Same-name entities below the similarity threshold get a
    /// fresh id instead of overwriting that node.
    async fn node_id_for(
        &self,
        entity: &IngestionEntity,
        class: &TypeClassification,
        rejected_by_search: bool,
    ) -> Result<String> {
        let id = entity_node_id(&class.primary, &entity.name);
        if rejected_by_search && self.store.get_node(&id).await?.is_some() {
            let fresh = new_v7().to_string();
            debug!(name_id = %id, node_id = %fresh, "Name-derived id taken by a dissimilar node");
            return Ok(fresh);
        }
        Ok(id)
    }

    /// Query candidate label indexes in priority order; the first top hit at
    /// or above the similarity threshold wins.
    async fn find_match(&self, class: &TypeClassification, embedding: &[f32]) -> Lookup {
        let mut searched = false;
        for label in class.candidate_labels() {
            let index = vector_index_name(label);
            let hits = match self
                .store
                .vector_search(&index, embedding, self.config.vector_search_limit)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    debug!(index = %index, error = %e, "Vector search failed, treating as no match");
                    continue;
                }
            };
            searched = true;
            let Some(top) = hits.into_iter().next() else {
                continue;
            };
            if top.score >= self.config.similarity_threshold {
                return Lookup::Matched(top.node, label.clone(), top.score);
            }
            trace!(index = %index, score = top.score, "Top hit below similarity threshold");
        }
        if searched {
            Lookup::BelowThreshold
        } else {
            Lookup::NotSearched
        }
    }

    async fn fold_onto_existing(
        &self,
        node: &GraphNode,
        entity_id: &str,
        folds: &PropertyFolds,
        stats: &mut IngestionStats,
    ) -> Result<()> {
        if !folds.has_folds(entity_id) {
            return Ok(());
        }
        let mut current = node.properties.clone();
        let changed = folds.apply(entity_id, &mut current);
        if changed.is_empty() {
            return Ok(());
        }
        let update: PropertyMap = changed
            .iter()
            .filter_map(|key| current.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        stats.properties_folded += update.len();
        self.store.update_node_properties(&node.id, update).await
    }

    async fn create(
        &self,
        id: String,
        entity: &IngestionEntity,
        class: &TypeClassification,
        folds: &PropertyFolds,
        stats: &mut IngestionStats,
    ) -> Result<String> {
        let mut props = self.node_properties(&id, entity);

        if folds.has_folds(&entity.id) {
            // Fold against what the node already holds so repeated batches
            // extend `additional*` lists instead of clobbering the first value.
            let mut merged = match self.store.get_node(&id).await? {
                Some(existing) => existing.properties,
                None => PropertyMap::new(),
            };
            merged.extend(props);
            let changed = folds.apply(&entity.id, &mut merged);
            stats.properties_folded += changed.len();
            props = merged;
        }

        let labels = class.labels();
        match self.store.merge_node(&id, &labels, props).await? {
            MergeOutcome::Created => {
                debug!(node_id = %id, labels = ?labels, "Created node");
                stats.nodes_created += 1;
            }
            MergeOutcome::Updated => {
                debug!(node_id = %id, "Merged into existing node");
                stats.nodes_merged += 1;
            }
        }

        if let Some(embedding) = entity.embedding.as_deref() {
            self.ensure_indexes(class, embedding.len()).await?;
        }
        Ok(id)
    }

    /// Base properties overlaid with explicit properties and flattened
    /// enrichment. `id` is never overridden.
    fn node_properties(&self, id: &str, entity: &IngestionEntity) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("id".to_string(), json!(id));
        props.insert("name".to_string(), json!(entity.name));
        props.insert("category".to_string(), json!(self.config.default_category));
        props.insert("createdAt".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(embedding) = &entity.embedding {
            props.insert("embedding".to_string(), json!(embedding));
        }

        let explicit = entity.properties.iter().flatten();
        let enriched = entity
            .enriched_data
            .as_ref()
            .map(|data| flatten_enriched(data, self.config.flatten_policy))
            .unwrap_or_default();
        for (key, value) in explicit
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(enriched)
        {
            if key == "id" || value == JsonValue::Null {
                continue;
            }
            props.insert(key, value);
        }
        props
    }

    async fn ensure_indexes(&self, class: &TypeClassification, dimension: usize) -> Result<()> {
        if !self.config.ensure_indexes || dimension == 0 {
            return Ok(());
        }
        for label in class.candidate_labels() {
            let known = self
                .ensured_indexes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(label);
            if known {
                continue;
            }
            self.store.ensure_vector_index(label, dimension).await?;
            self.ensured_indexes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(label.clone());
        }
        Ok(())
    }
}
