use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, dimension: u32, batch_size: u32) -> OllamaClient {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: server.address().port(),
        model: "all-minilm".to_string(),
        embedding_dimension: dimension,
        batch_size,
        ..OllamaConfig::default()
    };
    OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_backoff(Duration::ZERO)
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 768,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(client.dimensions(), 768);
    assert_eq!(client.model_id(), "test-model");
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.dimensions(), DEFAULT_EMBEDDING_DIMENSION as usize);
}

#[test]
fn default_tag_matching() {
    assert_eq!(with_default_tag("all-minilm"), "all-minilm:latest");
    assert_eq!(with_default_tag("all-minilm:l6-v2"), "all-minilm:l6-v2");
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_single_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({"model": "all-minilm", "input": ["hello"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[0.1, 0.2, 0.3, 0.4]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 4, 16);
    let embedding = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("task should not panic")
        .expect("should embed text");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3, 0.4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_rejects_wrong_dimension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2]]})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 4, 16);
    let result = tokio::task::spawn_blocking(move || client.embed("hello"))
        .await
        .expect("task should not panic");

    let err = result.expect_err("wrong dimension must fail");
    assert!(err.to_string().contains("2 dimensions"));
}

#[tokio::test(flavor = "multi_thread")]
async fn batches_respect_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({"model": "all-minilm", "input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({"model": "all-minilm", "input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2, 2);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should not panic")
        .expect("should embed batch");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.25, 0.75]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2, 16);
    let embedding = tokio::task::spawn_blocking(move || client.embed("retry me"))
        .await
        .expect("task should not panic")
        .expect("third attempt should succeed");

    assert_eq!(embedding, vec![0.25, 0.75]);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2, 16);
    let result = tokio::task::spawn_blocking(move || client.embed("missing model"))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_finds_tagged_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3:latest"},
                {"name": "all-minilm:latest", "size": 45960996}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 384, 16);
    let result = tokio::task::spawn_blocking(move || {
        let models = client.list_models()?;
        client.health_check()?;
        anyhow::Ok(models)
    })
    .await
    .expect("task should not panic")
    .expect("health check should pass");

    assert_eq!(result.len(), 2);
    assert_eq!(result[1].size, Some(45_960_996));
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_reports_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "llama3:latest"}]})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 384, 16);
    let err = tokio::task::spawn_blocking(move || client.validate_model())
        .await
        .expect("task should not panic")
        .expect_err("missing model must fail");

    assert!(err.to_string().contains("all-minilm"));
}
