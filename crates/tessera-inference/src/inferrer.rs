//! Model-backed [`RelationshipInferrer`].

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument};

use tessera_core::{
    GenerationBackend, IngestionEntity, Relationship, RelationshipInferrer, Result,
};

use crate::relation_prompt::{
    parse_inferred_relationships, relationship_inference_prompt, RELATIONSHIP_SYSTEM_PROMPT,
};

/// Upper bound on entities listed in one prompt.
pub const DEFAULT_MAX_PROMPT_ENTITIES: usize = 200;

/// Suggests relationships by prompting a generation backend.
///
/// Returns the raw triples; endpoint validation, renaming, and confidence
/// tagging happen in the inference engine.
pub struct LlmRelationshipInferrer<G> {
    backend: G,
    known_types: Vec<String>,
    max_entities: usize,
}

impl<G: GenerationBackend> LlmRelationshipInferrer<G> {
    pub fn new(backend: G) -> Self {
        Self {
            backend,
            known_types: Vec::new(),
            max_entities: DEFAULT_MAX_PROMPT_ENTITIES,
        }
    }

    /// Relationship names offered to the model as preferred vocabulary.
    pub fn with_known_types(mut self, known_types: Vec<String>) -> Self {
        self.known_types = known_types;
        self
    }

    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities.max(2);
        self
    }

    pub fn backend(&self) -> &G {
        &self.backend
    }
}

#[async_trait]
impl<G: GenerationBackend> RelationshipInferrer for LlmRelationshipInferrer<G> {
    #[instrument(skip(self, entities), fields(subsystem = "inference", component = "llm_inferrer", op = "infer", model = %self.backend.model_name(), input_count = entities.len()))]
    async fn infer(&self, entities: &[IngestionEntity]) -> Result<Vec<Relationship>> {
        if entities.len() < 2 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let listed = &entities[..entities.len().min(self.max_entities)];
        let prompt = relationship_inference_prompt(listed, &self.known_types);

        let response = self
            .backend
            .generate_json_with_system(RELATIONSHIP_SYSTEM_PROMPT, &prompt)
            .await?;
        let triples = parse_inferred_relationships(&response)?;

        debug!(
            prompt_len = prompt.len(),
            result_count = triples.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Model relationship suggestions parsed"
        );
        Ok(triples)
    }
}
