//! Ingestion configuration.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tessera_core::{defaults, Error, Result};

/// How nested enrichment keys are flattened onto a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlattenPolicy {
    /// Leaf key names; later values overwrite earlier ones.
    #[default]
    LastWriteWins,
    /// Keys joined with `_` along their path.
    Namespaced,
}

impl FlattenPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlattenPolicy::LastWriteWins => "last_write_wins",
            FlattenPolicy::Namespaced => "namespaced",
        }
    }
}

impl fmt::Display for FlattenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlattenPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "last_write_wins" | "lww" => Ok(FlattenPolicy::LastWriteWins),
            "namespaced" => Ok(FlattenPolicy::Namespaced),
            other => Err(Error::Config(format!("Unknown flatten policy: {}", other))),
        }
    }
}

/// Tunables of one ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    /// Minimum cosine similarity for reusing an existing node.
    pub similarity_threshold: f32,
    /// Hits requested per vector index query.
    pub vector_search_limit: usize,
    /// `category` of nodes that do not carry one.
    pub default_category: String,
    pub flatten_policy: FlattenPolicy,
    /// Link every resolved entity to the batch's container node.
    pub link_container: bool,
    pub container_rel_type: String,
    /// Confidence of ontology-rule edges; model edges get a fraction of it.
    pub inference_threshold: f32,
    pub model_confidence_factor: f32,
    pub max_inferred_relationships: usize,
    /// Write inferred relationships to the store as edges.
    pub persist_inferred: bool,
    /// Create the vector index of a label when the first embedded node lands.
    pub ensure_indexes: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            vector_search_limit: defaults::VECTOR_SEARCH_LIMIT,
            default_category: defaults::DEFAULT_CATEGORY.to_string(),
            flatten_policy: FlattenPolicy::default(),
            link_container: true,
            container_rel_type: defaults::CONTAINER_REL_TYPE.to_string(),
            inference_threshold: defaults::INFERENCE_CONFIDENCE_THRESHOLD,
            model_confidence_factor: defaults::MODEL_CONFIDENCE_FACTOR,
            max_inferred_relationships: defaults::MAX_INFERRED_RELATIONSHIPS,
            persist_inferred: false,
            ensure_indexes: true,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl IngestConfig {
    /// Load configuration from `TESSERA_*` environment variables, keeping
    /// defaults for unset or unparsable values. Call [`Self::validate`]
    /// before use.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            similarity_threshold: env_parse("TESSERA_SIMILARITY_THRESHOLD")
                .unwrap_or(defaults.similarity_threshold),
            vector_search_limit: env_parse("TESSERA_VECTOR_SEARCH_LIMIT")
                .unwrap_or(defaults.vector_search_limit),
            default_category: env::var("TESSERA_DEFAULT_CATEGORY")
                .unwrap_or(defaults.default_category),
            flatten_policy: env_parse("TESSERA_FLATTEN_POLICY").unwrap_or(defaults.flatten_policy),
            link_container: env_flag("TESSERA_LINK_CONTAINER").unwrap_or(defaults.link_container),
            container_rel_type: env::var("TESSERA_CONTAINER_REL_TYPE")
                .unwrap_or(defaults.container_rel_type),
            inference_threshold: env_parse("TESSERA_INFERENCE_THRESHOLD")
                .unwrap_or(defaults.inference_threshold),
            model_confidence_factor: env_parse("TESSERA_MODEL_CONFIDENCE_FACTOR")
                .unwrap_or(defaults.model_confidence_factor),
            max_inferred_relationships: env_parse("TESSERA_MAX_INFERRED_RELATIONSHIPS")
                .unwrap_or(defaults.max_inferred_relationships),
            persist_inferred: env_flag("TESSERA_PERSIST_INFERRED")
                .unwrap_or(defaults.persist_inferred),
            ensure_indexes: env_flag("TESSERA_ENSURE_INDEXES").unwrap_or(defaults.ensure_indexes),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let unit_interval = |name: &str, value: f32| -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        };
        unit_interval("similarity_threshold", self.similarity_threshold)?;
        unit_interval("inference_threshold", self.inference_threshold)?;
        unit_interval("model_confidence_factor", self.model_confidence_factor)?;

        if self.vector_search_limit == 0 {
            return Err(Error::Config(
                "vector_search_limit must be at least 1".to_string(),
            ));
        }
        if self.default_category.trim().is_empty() {
            return Err(Error::Config("default_category cannot be empty".to_string()));
        }
        if self.link_container && self.container_rel_type.trim().is_empty() {
            return Err(Error::Config(
                "container_rel_type cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Confidence assigned to model-derived relationships.
    pub fn model_confidence(&self) -> f32 {
        self.inference_threshold * self.model_confidence_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.similarity_threshold, 0.92);
        assert_eq!(config.max_inferred_relationships, 100);
        assert_eq!(config.default_category, "Generic");
        assert_eq!(config.container_rel_type, "CONTAINS_ENTITY");
        assert_eq!(config.flatten_policy, FlattenPolicy::LastWriteWins);
        assert!(!config.persist_inferred);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_confidence_is_fraction_of_threshold() {
        let config = IngestConfig::default();
        assert!((config.model_confidence() - 0.64).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = IngestConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        match config.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("similarity_threshold")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_container_type() {
        let config = IngestConfig {
            container_rel_type: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let unlinked = IngestConfig {
            container_rel_type: String::new(),
            link_container: false,
            ..Default::default()
        };
        assert!(unlinked.validate().is_ok());
    }

    #[test]
    fn test_flatten_policy_parse() {
        assert_eq!("namespaced".parse::<FlattenPolicy>().unwrap(), FlattenPolicy::Namespaced);
        assert_eq!(
            "Last-Write-Wins".parse::<FlattenPolicy>().unwrap(),
            FlattenPolicy::LastWriteWins
        );
        assert!("merge".parse::<FlattenPolicy>().is_err());
    }

    #[test]
    fn test_config_serializes_camel_case() {
        let value = serde_json::to_value(IngestConfig::default()).unwrap();
        assert_eq!(value["similarityThreshold"], serde_json::json!(0.92f32));
        assert_eq!(value["flattenPolicy"], "last_write_wins");
    }
}
