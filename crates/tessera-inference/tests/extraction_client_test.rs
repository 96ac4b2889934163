//! Integration tests for the extraction service client against a mock server.

use serde_json::json;
use tessera_inference::{EmbeddingBackend, Error, ExtractionClient, ExtractionConfig, IngestionUnit};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ExtractionClient {
    let config = ExtractionConfig::default()
        .with_base_url(server.uri())
        .with_backoff_base_ms(1);
    ExtractionClient::new(config).expect("valid config")
}

#[tokio::test]
async fn test_extract_graph_maps_response_into_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract-graph"))
        .and(body_json(json!({"text": "Alice works at Acme.", "ontology_name": "financial"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [
                {"type": "Person", "value": "Alice", "confidence": 0.97},
                {"type": "Organization", "value": "Acme", "confidence": 0.91}
            ],
            "relationships": [
                {"source": "Alice", "target": "Acme", "type": "WORKS_AT", "confidence": 0.8}
            ],
            "embedding": [0.1, 0.2, 0.3],
            "refinement_info": "llm"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .extract_graph("Alice works at Acme.", Some("financial"))
        .await
        .unwrap();
    let batch = response.into_batch(Some(IngestionUnit::new("doc-1")));

    assert_eq!(batch.entities.len(), 2);
    assert_eq!(batch.relationships[0].source, "e0");
    assert_eq!(batch.relationships[0].target, "e1");
    assert_eq!(batch.unit.unwrap().embedding, Some(vec![0.1, 0.2, 0.3]));
}

#[tokio::test]
async fn test_retries_on_server_error_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let vectors = client.embed(&["Alice".to_string()]).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0]]);
}

#[tokio::test]
async fn test_gives_up_after_configured_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract-graph"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "model crashed"})))
        .expect(3)
        .mount(&server)
        .await;

    let config = ExtractionConfig::default()
        .with_base_url(server.uri())
        .with_backoff_base_ms(1)
        .with_retries(2);
    let client = ExtractionClient::new(config).unwrap();
    let err = client.extract_graph("text", None).await.unwrap_err();

    match err {
        Error::Extraction(msg) => {
            assert!(msg.contains("failed after 2 retries"), "{}", msg);
            assert!(msg.contains("model crashed"), "{}", msg);
        }
        other => panic!("Expected extraction error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_error_fails_fast_with_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract-graph"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Ontology 'legal' not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.extract_graph("text", Some("legal")).await.unwrap_err();

    assert!(err.to_string().contains("Ontology 'legal' not found"));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_embedding_backend_checks_vector_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = client.embed_texts(&texts).await;

    assert!(matches!(result, Err(Error::Embedding(_))));
}

#[tokio::test]
async fn test_api_key_sent_as_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ExtractionConfig::default().with_base_url(server.uri());
    config.api_key = Some("secret".to_string());
    let client = ExtractionClient::new(config).unwrap();

    // Empty inputs short-circuit, so send one text and accept the count mismatch.
    let result = client.embed(&["x".to_string()]).await;
    assert!(matches!(result, Err(Error::Embedding(_))));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&server)
        .await;

    assert!(client_for(&server).health_check().await.unwrap());

    let unreachable = ExtractionClient::new(
        ExtractionConfig::default().with_base_url("http://127.0.0.1:9"),
    )
    .unwrap();
    assert!(!unreachable.health_check().await.unwrap());
}
