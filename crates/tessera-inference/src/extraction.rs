//! HTTP client for the extraction service.
//!
//! The service turns raw text into entity/relationship candidates
//! (`POST /extract-graph`) and embeds text in batches (`POST /embed`).
//! Transport failures and 5xx responses are retried with exponential backoff;
//! 4xx responses fail immediately with the server's `detail` message.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, instrument, warn};

use tessera_core::{
    defaults, EmbeddingBackend, Error, IngestionBatch, IngestionEntity, IngestionUnit,
    PropertyMap, Relationship, Result,
};

/// Slow-request warning threshold in milliseconds.
const SLOW_REQUEST_MS: u64 = 30_000;

/// Connection settings for [`ExtractionClient`].
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Service root, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Backoff before retry `n` is `backoff_base_ms * 2^n`.
    pub backoff_base_ms: u64,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    /// Dimension of vectors returned by `/embed`.
    pub embed_dimension: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::EXTRACTION_URL.to_string(),
            timeout_secs: defaults::EXTRACTION_TIMEOUT_SECS,
            retries: defaults::EXTRACTION_RETRIES,
            backoff_base_ms: defaults::EXTRACTION_BACKOFF_BASE_MS,
            api_key: None,
            embed_dimension: defaults::EMBED_DIMENSION,
        }
    }
}

impl ExtractionConfig {
    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TESSERA_EXTRACTION_URL` | `http://localhost:8000` |
    /// | `TESSERA_EXTRACTION_TIMEOUT_SECS` | 300 |
    /// | `TESSERA_EXTRACTION_RETRIES` | 3 |
    /// | `TESSERA_EXTRACTION_API_KEY` | unset |
    /// | `TESSERA_EMBED_DIM` | 384 |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TESSERA_EXTRACTION_URL").unwrap_or(defaults.base_url),
            timeout_secs: env_parse("TESSERA_EXTRACTION_TIMEOUT_SECS")
                .unwrap_or(defaults.timeout_secs),
            retries: env_parse("TESSERA_EXTRACTION_RETRIES").unwrap_or(defaults.retries),
            backoff_base_ms: defaults.backoff_base_ms,
            api_key: std::env::var("TESSERA_EXTRACTION_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            embed_dimension: env_parse("TESSERA_EMBED_DIM").unwrap_or(defaults.embed_dimension),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Extraction service URL must start with http:// or https://: {}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "Extraction timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Entity candidate as emitted by the extraction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Surface text of the mention.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Relationship candidate; endpoints are entity ids or entity values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Response of `POST /extract-graph`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
    /// Document-level embedding of the submitted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_used: Option<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

fn value_key(value: &str) -> String {
    value.trim().to_lowercase()
}

impl ExtractionResponse {
    /// Convert into an ingestion batch.
    ///
    /// Missing entity ids become `e<index>`. Relationship endpoints that name
    /// an entity value rather than an id are mapped onto that entity's id
    /// (first entity with the value wins); unknown endpoints are kept as-is
    /// and dropped later by endpoint validation.
    pub fn into_batch(self, unit: Option<IngestionUnit>) -> IngestionBatch {
        let entities: Vec<IngestionEntity> = self
            .entities
            .into_iter()
            .enumerate()
            .map(|(index, e)| {
                let id = e
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| format!("e{}", index));
                IngestionEntity {
                    id,
                    name: e.value,
                    entity_type: e.entity_type,
                    confidence: e.confidence,
                    properties: e.properties,
                    ..Default::default()
                }
            })
            .collect();

        let ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let mut by_value: HashMap<String, &str> = HashMap::new();
        for entity in &entities {
            by_value
                .entry(value_key(&entity.name))
                .or_insert(entity.id.as_str());
        }
        let resolve = |endpoint: String| -> String {
            if ids.contains(endpoint.as_str()) {
                return endpoint;
            }
            match by_value.get(&value_key(&endpoint)) {
                Some(id) => id.to_string(),
                None => endpoint,
            }
        };

        let relationships: Vec<Relationship> = self
            .relationships
            .into_iter()
            .map(|r| {
                let mut properties = PropertyMap::new();
                if let Some(confidence) = r.confidence {
                    properties.insert("confidence".to_string(), json!(confidence));
                }
                if let Some(explanation) = r.explanation {
                    properties.insert("explanation".to_string(), json!(explanation));
                }
                let mut rel = Relationship::new(resolve(r.source), resolve(r.target), r.rel_type);
                if !properties.is_empty() {
                    rel = rel.with_properties(properties);
                }
                rel
            })
            .collect();

        let unit = unit.map(|mut unit| {
            if unit.embedding.is_none() {
                unit.embedding = self.embedding;
            }
            unit
        });

        IngestionBatch {
            unit,
            entities,
            relationships,
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Extraction service client.
#[derive(Clone)]
pub struct ExtractionClient {
    client: Client,
    config: ExtractionConfig,
}

impl ExtractionClient {
    pub fn new(mut config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract entities and relationships from `text`.
    #[instrument(skip(self, text), fields(subsystem = "extraction", component = "client", op = "extract_graph", input_len = text.len()))]
    pub async fn extract_graph(
        &self,
        text: &str,
        ontology_name: Option<&str>,
    ) -> Result<ExtractionResponse> {
        let mut body = json!({ "text": text });
        if let Some(name) = ontology_name {
            body["ontology_name"] = json!(name);
        }
        let response: ExtractionResponse = self
            .send_with_retry(Method::POST, "/extract-graph", Some(&body), Error::Extraction)
            .await?;
        info!(
            result_count = response.entities.len(),
            relationship_count = response.relationships.len(),
            "Graph extraction complete"
        );
        Ok(response)
    }

    /// Embed `texts` in one request, one vector per input.
    #[instrument(skip(self, texts), fields(subsystem = "extraction", component = "client", op = "embed", input_count = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let body = json!({ "texts": texts });
        let response: EmbedResponse = self
            .send_with_retry(Method::POST, "/embed", Some(&body), Error::Embedding)
            .await?;
        if response.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, service returned {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }

    /// Probe `GET /health`. Never errors; unreachable services report `false`.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .request(Method::GET, "/health")
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("Extraction service health check passed");
                Ok(true)
            }
            Ok(resp) => {
                warn!("Extraction service health check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Extraction service health check error: {}", e);
                Ok(false)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.config.base_url, path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(factor))
    }

    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        wrap: fn(String) -> Error,
    ) -> Result<T> {
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let mut builder = self.request(method.clone(), path);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let failure = match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed = response.json::<T>().await.map_err(|e| {
                        wrap(format!("Failed to parse response from {}: {}", path, e))
                    })?;
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!(attempt, duration_ms = elapsed, "Extraction request complete");
                    if elapsed > SLOW_REQUEST_MS {
                        warn!(duration_ms = elapsed, slow = true, "Slow extraction request");
                    }
                    return Ok(parsed);
                }
                Ok(response) => {
                    let status = response.status();
                    let message = format!("HTTP {}: {}", status.as_u16(), error_detail(response).await);
                    if !status.is_server_error() {
                        return Err(wrap(message));
                    }
                    message
                }
                Err(e) => format!("Request failed: {}", e),
            };

            if attempt >= self.config.retries {
                return Err(wrap(format!(
                    "{} failed after {} retries: {}",
                    path, self.config.retries, failure
                )));
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Extraction request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Pull a human-readable message out of an error response body.
async fn error_detail(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    detail_from_body(&body)
}

fn detail_from_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<JsonValue>(body) {
        for key in ["detail", "error"] {
            match value.get(key) {
                Some(JsonValue::String(s)) => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }
    if body.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        body.trim().to_string()
    }
}

#[async_trait]
impl EmbeddingBackend for ExtractionClient {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(id: Option<&str>, entity_type: &str, value: &str) -> ExtractedEntity {
        ExtractedEntity {
            id: id.map(String::from),
            entity_type: entity_type.to_string(),
            value: value.to_string(),
            confidence: None,
            properties: None,
            start: None,
            end: None,
            context: None,
        }
    }

    fn extracted_rel(source: &str, target: &str, rel_type: &str) -> ExtractedRelationship {
        ExtractedRelationship {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            confidence: None,
            explanation: None,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ExtractionConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_url() {
        let config = ExtractionConfig::default().with_base_url("localhost:8000");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let client = ExtractionClient::new(ExtractionConfig::default()).unwrap();
        assert_eq!(client.backoff(0), Duration::from_secs(1));
        assert_eq!(client.backoff(1), Duration::from_secs(2));
        assert_eq!(client.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client =
            ExtractionClient::new(ExtractionConfig::default().with_base_url("http://nlp:8000/"))
                .unwrap();
        assert_eq!(client.config().base_url, "http://nlp:8000");
    }

    #[test]
    fn test_into_batch_assigns_ids_and_maps_values() {
        let response = ExtractionResponse {
            entities: vec![
                extracted(None, "Person", "Alice"),
                extracted(Some("org-1"), "Organization", "Acme Corp"),
            ],
            relationships: vec![
                extracted_rel("Alice", "org-1", "WORKS_AT"),
                extracted_rel("alice ", "Nobody", "KNOWS"),
            ],
            embedding: Some(vec![0.5, 0.5]),
            ..Default::default()
        };

        let batch = response.into_batch(Some(IngestionUnit::new("doc-1")));

        assert_eq!(batch.entities[0].id, "e0");
        assert_eq!(batch.entities[0].name, "Alice");
        assert_eq!(batch.entities[1].id, "org-1");
        assert_eq!(batch.relationships[0].source, "e0");
        assert_eq!(batch.relationships[0].target, "org-1");
        assert_eq!(batch.relationships[1].source, "e0");
        assert_eq!(batch.relationships[1].target, "Nobody");
        assert_eq!(batch.unit.unwrap().embedding, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn test_into_batch_keeps_relationship_metadata() {
        let mut rel = extracted_rel("e0", "e0", "SELF");
        rel.confidence = Some(0.75);
        rel.explanation = Some("stated".to_string());
        let response = ExtractionResponse {
            entities: vec![extracted(None, "Person", "Alice")],
            relationships: vec![rel],
            ..Default::default()
        };

        let batch = response.into_batch(None);
        let props = batch.relationships[0].properties.as_ref().unwrap();
        assert_eq!(props["confidence"], 0.75);
        assert_eq!(props["explanation"], "stated");
        assert!(batch.unit.is_none());
    }

    #[test]
    fn test_response_deserializes_service_payload() {
        let response: ExtractionResponse = serde_json::from_value(json!({
            "entities": [{"type": "Person", "value": "Alice", "confidence": 0.9, "start": 0, "end": 5}],
            "relationships": [],
            "refinement_info": "llm",
            "embedding": null
        }))
        .unwrap();
        assert_eq!(response.entities[0].start, Some(0));
        assert!(response.embedding.is_none());
    }

    #[test]
    fn test_detail_from_body() {
        assert_eq!(detail_from_body(r#"{"detail": "Ontology not found"}"#), "Ontology not found");
        assert_eq!(detail_from_body(r#"{"error": "boom"}"#), "boom");
        assert_eq!(detail_from_body("plain text"), "plain text");
        assert_eq!(detail_from_body(""), "Unknown error");
    }
}
