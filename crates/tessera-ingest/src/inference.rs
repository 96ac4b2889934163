//! Relationship inference over a batch's entities.
//!
//! Runs an ontology-rule pass and an optional model pass, then validates,
//! deduplicates and truncates the combined candidates. Rule edges carry the
//! configured threshold as confidence; model edges carry a fraction of it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, trace, warn};

use tessera_core::{
    defaults, InferredRelationship, IngestionEntity, NoopInferrer, OntologySnapshot,
    RelationshipInferrer,
};

use crate::config::IngestConfig;
use crate::naming::normalize_rel_type;
use crate::resolver::TypeClassification;

/// Phases of one inference run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferencePhase {
    Idle,
    OntologyRules,
    ModelPass,
    Validate,
    Deduplicate,
    Truncate,
    Done,
}

impl InferencePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferencePhase::Idle => "idle",
            InferencePhase::OntologyRules => "ontology_rules",
            InferencePhase::ModelPass => "model_pass",
            InferencePhase::Validate => "validate",
            InferencePhase::Deduplicate => "deduplicate",
            InferencePhase::Truncate => "truncate",
            InferencePhase::Done => "done",
        }
    }
}

impl fmt::Display for InferencePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one inference run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutcome {
    pub relationships: Vec<InferredRelationship>,
    pub rule_candidates: usize,
    pub model_candidates: usize,
    /// The model pass failed and contributed nothing.
    pub model_degraded: bool,
}

pub struct InferenceEngine {
    snapshot: OntologySnapshot,
    inferrer: Arc<dyn RelationshipInferrer>,
    config: IngestConfig,
}

impl InferenceEngine {
    /// Engine in ontology-rule-only mode.
    pub fn new(snapshot: OntologySnapshot, config: IngestConfig) -> Self {
        Self {
            snapshot,
            inferrer: Arc::new(NoopInferrer),
            config,
        }
    }

    pub fn with_inferrer(mut self, inferrer: Arc<dyn RelationshipInferrer>) -> Self {
        self.inferrer = inferrer;
        self
    }

    /// Infer relationships among `entities`; `classifications` is parallel
    /// to `entities`.
    #[instrument(
        skip_all,
        fields(subsystem = "ingest", component = "inference", op = "infer", input_count = entities.len())
    )]
    pub async fn infer(
        &self,
        entities: &[IngestionEntity],
        classifications: &[TypeClassification],
    ) -> InferenceOutcome {
        let start = Instant::now();
        let mut phase = InferencePhase::Idle;
        let mut advance = |next: InferencePhase| {
            trace!(from = %phase, to = %next, "Inference phase");
            phase = next;
        };

        advance(InferencePhase::OntologyRules);
        let mut candidates = self.rule_pass(entities, classifications);
        let rule_candidates = candidates.len();

        advance(InferencePhase::ModelPass);
        let (model, model_degraded) = self.model_pass(entities).await;
        let model_candidates = model.len();
        candidates.extend(model);

        advance(InferencePhase::Validate);
        let known: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let before = candidates.len();
        candidates.retain(|r| {
            known.contains(r.source.as_str()) && known.contains(r.target.as_str()) && r.source != r.target
        });
        if candidates.len() < before {
            debug!(dropped = before - candidates.len(), "Dropped inferred relationships with invalid endpoints");
        }

        advance(InferencePhase::Deduplicate);
        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        candidates.retain(|r| {
            let (rel_type, source, target) = r.key();
            seen.insert((rel_type.to_string(), source.to_string(), target.to_string()))
        });

        advance(InferencePhase::Truncate);
        candidates.truncate(self.config.max_inferred_relationships);

        advance(InferencePhase::Done);
        debug!(
            rule_candidates,
            model_candidates,
            result_count = candidates.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Inference complete"
        );

        InferenceOutcome {
            relationships: candidates,
            rule_candidates,
            model_candidates,
            model_degraded,
        }
    }

    /// One edge per rule, between the first pair of distinct entities whose
    /// types (primary or super-type) match the rule's endpoints.
    fn rule_pass(
        &self,
        entities: &[IngestionEntity],
        classifications: &[TypeClassification],
    ) -> Vec<InferredRelationship> {
        let typed: Vec<(&IngestionEntity, &TypeClassification)> =
            entities.iter().zip(classifications).collect();

        self.snapshot
            .rules()
            .iter()
            .filter_map(|rule| {
                let (source, target) = typed
                    .iter()
                    .filter(|(_, class)| class.matches(&rule.source_type))
                    .find_map(|(source, _)| {
                        typed
                            .iter()
                            .find(|(target, class)| {
                                target.id != source.id && class.matches(&rule.target_type)
                            })
                            .map(|(target, _)| (*source, *target))
                    })?;
                trace!(rule = %rule.name, source = %source.id, target = %target.id, "Rule matched");
                Some(InferredRelationship {
                    source: source.id.clone(),
                    target: target.id.clone(),
                    rel_type: rule.name.clone(),
                    confidence: self.config.inference_threshold,
                    is_inferred: false,
                })
            })
            .collect()
    }

    /// Ask the injected inferrer for triples. Returns the candidates and
    /// whether the pass degraded on error.
    async fn model_pass(&self, entities: &[IngestionEntity]) -> (Vec<InferredRelationship>, bool) {
        let suggested = match self.inferrer.infer(entities).await {
            Ok(suggested) => suggested,
            Err(e) => {
                warn!(error = %e, "Model inference failed, continuing with ontology rules only");
                return (Vec::new(), true);
            }
        };

        let known: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let confidence = self.config.model_confidence();
        let relationships = suggested
            .into_iter()
            .filter(|r| {
                let in_batch = known.contains(r.source.as_str()) && known.contains(r.target.as_str());
                if !in_batch {
                    debug!(source = %r.source, target = %r.target, "Model suggested an endpoint outside the batch");
                }
                in_batch
            })
            .map(|r| InferredRelationship {
                rel_type: self.model_rel_type(&r.rel_type),
                source: r.source,
                target: r.target,
                confidence,
                is_inferred: true,
            })
            .collect();
        (relationships, false)
    }

    /// Rule names pass through in their declared spelling; anything else
    /// gets the inferred suffix.
    fn model_rel_type(&self, raw: &str) -> String {
        let raw = raw.trim();
        let normalized = normalize_rel_type(raw);
        if let Some(rule) = self
            .snapshot
            .rules()
            .iter()
            .find(|rule| normalize_rel_type(&rule.name) == normalized)
        {
            return rule.name.clone();
        }
        if raw.ends_with(defaults::INFERRED_SUFFIX) {
            return raw.to_string();
        }
        format!("{}{}", raw, defaults::INFERRED_SUFFIX)
    }
}
