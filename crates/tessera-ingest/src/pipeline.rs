//! Composition root: wires type resolution, entity resolution, edge writing
//! and inference into one sequential ingestion run.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use tessera_core::{
    new_v7, EmbeddingBackend, GraphStore, IngestionBatch, IngestionEntity, IngestionReport,
    IngestionStats, OntologySnapshot, RelationshipInferrer, Result,
};

use crate::config::IngestConfig;
use crate::entity_writer::EntityResolver;
use crate::folding::PropertyFolds;
use crate::inference::InferenceEngine;
use crate::relationship_writer::RelationshipWriter;
use crate::resolver::TypeResolver;

/// Ingests one batch at a time into a graph store.
///
/// Entities and relationships are processed in batch order, one store call
/// at a time. A store failure aborts the batch; whatever was written before
/// it stays written.
pub struct IngestionPipeline {
    resolver: TypeResolver,
    entities: EntityResolver,
    relationships: RelationshipWriter,
    inference: InferenceEngine,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        snapshot: OntologySnapshot,
        store: Arc<dyn GraphStore>,
        config: IngestConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: TypeResolver::new(snapshot.clone()),
            entities: EntityResolver::new(store.clone(), config.clone()),
            relationships: RelationshipWriter::new(store, config.clone()),
            inference: InferenceEngine::new(snapshot, config.clone()),
            embedder: None,
            config,
        })
    }

    /// Enable the model pass of relationship inference.
    pub fn with_inferrer(mut self, inferrer: Arc<dyn RelationshipInferrer>) -> Self {
        self.inference = self.inference.with_inferrer(inferrer);
        self
    }

    /// Embed entities that arrive without an embedding before resolution.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    pub async fn ingest(&self, batch: IngestionBatch) -> Result<IngestionReport> {
        let start = Instant::now();
        let IngestionBatch {
            unit,
            mut entities,
            relationships,
        } = batch;
        let batch_id = unit
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| new_v7().to_string());

        let mut stats = IngestionStats {
            entities_received: entities.len(),
            ..Default::default()
        };

        stats.embeddings_generated = self.fill_embeddings(&mut entities, &batch_id).await;

        let classifications: Vec<_> = entities
            .iter()
            .map(|e| self.resolver.classify(&e.entity_type))
            .collect();
        let folds = PropertyFolds::collect(&relationships, &entities, &classifications);

        for (entity, class) in entities.iter_mut().zip(&classifications) {
            entity.resolved_id = self.entities.resolve(entity, class, &folds, &mut stats).await?;
        }
        for property_id in folds.stranded(&entities) {
            warn!(
                subsystem = "ingest",
                component = "pipeline",
                batch_id = %batch_id,
                entity_id = %property_id,
                "Property value dropped, its owning entity was skipped"
            );
            stats.entities_skipped += 1;
        }

        let container_id = match &unit {
            Some(unit) => Some(
                self.relationships
                    .write_container(unit, &entities, &mut stats)
                    .await?,
            ),
            None => None,
        };

        self.relationships
            .write(&relationships, &entities, &folds, &mut stats)
            .await?;

        let outcome = self.inference.infer(&entities, &classifications).await;
        stats.inferred_relationships = outcome.relationships.len();
        if self.config.persist_inferred {
            self.relationships
                .write_inferred(&outcome.relationships, &entities, &mut stats)
                .await?;
        }

        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "ingest",
            batch_id = %batch_id,
            entities_received = stats.entities_received,
            nodes_created = stats.nodes_created,
            nodes_matched = stats.nodes_matched,
            nodes_merged = stats.nodes_merged,
            entities_skipped = stats.entities_skipped,
            edges_written = stats.edges_written,
            relationships_dropped = stats.relationships_dropped,
            inferred_relationships = stats.inferred_relationships,
            model_degraded = outcome.model_degraded,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch ingested"
        );

        Ok(IngestionReport {
            container_id,
            entities,
            inferred: outcome.relationships,
            stats,
        })
    }

    /// Embed entity names in one backend call. Failures leave the entities
    /// unembedded.
    async fn fill_embeddings(&self, entities: &mut [IngestionEntity], batch_id: &str) -> usize {
        let Some(embedder) = &self.embedder else {
            return 0;
        };
        let missing: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.has_embedding() && !e.name.trim().is_empty())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return 0;
        }

        let texts: Vec<String> = missing.iter().map(|&i| entities[i].name.clone()).collect();
        let vectors = match embedder.embed_texts(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors,
            Ok(vectors) => {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    batch_id = %batch_id,
                    expected = texts.len(),
                    got = vectors.len(),
                    "Embedding count mismatch, continuing without embeddings"
                );
                return 0;
            }
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "pipeline",
                    batch_id = %batch_id,
                    error = %e,
                    "Embedding failed, continuing without embeddings"
                );
                return 0;
            }
        };

        for (&index, vector) in missing.iter().zip(vectors) {
            entities[index].embedding = Some(vector);
        }
        debug!(batch_id = %batch_id, count = missing.len(), "Generated entity embeddings");
        missing.len()
    }
}
