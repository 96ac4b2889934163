//! Error types for tessera.

use thiserror::Error;

/// Result type alias using tessera's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while ingesting into the graph.
#[derive(Error, Debug)]
pub enum Error {
    /// Postgres-backed graph store failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No node with this id in the graph store
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// No vector index for the requested label
    #[error("Vector index not found: {0}")]
    IndexNotFound(String),

    /// Invalid ontology definition
    #[error("Ontology error: {0}")]
    Ontology(String),

    /// Extraction service returned an error or an unusable body
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generation model call failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// JSON or YAML could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller passed a value the operation rejects
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport-level HTTP failure
    #[error("Request error: {0}")]
    Request(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_errors_name_the_missing_thing() {
        assert_eq!(
            Error::NodeNotFound("person-7f3a".into()).to_string(),
            "Node not found: person-7f3a"
        );
        assert_eq!(
            Error::IndexNotFound("person_embeddings".into()).to_string(),
            "Vector index not found: person_embeddings"
        );
    }

    #[test]
    fn test_ontology_error_message() {
        let err = Error::Ontology("alias ORG claimed by Organization and Company".into());
        assert!(err.to_string().starts_with("Ontology error: alias ORG"));
    }

    #[test]
    fn test_service_error_messages() {
        assert_eq!(
            Error::Extraction("HTTP 503".into()).to_string(),
            "Extraction error: HTTP 503"
        );
        assert_eq!(
            Error::Inference("empty reply".into()).to_string(),
            "Inference error: empty reply"
        );
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: Error = serde_json::from_str::<Vec<String>>("{").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(ref m) if !m.is_empty()));
    }

    #[test]
    fn test_yaml_error_maps_to_serialization() {
        let err: Error = serde_yaml::from_str::<Vec<i32>>("{not: [a, list")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_missing_ontology_file_is_io() {
        let err: Error = std::fs::read_to_string("/nonexistent/ontology.yaml")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_crosses_task_boundaries() {
        fn check<T: Send + Sync + 'static>() {}
        check::<Error>();
    }
}
