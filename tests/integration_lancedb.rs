#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB vector store with realistic data
use std::time::Duration;

use rag_pipeline::RagError;
use rag_pipeline::corpus::Document;
use rag_pipeline::database::lancedb::{
    EMBEDDING_FIELD, EmbeddedChunk, Filter, IndexDefinition, IndexStatus, SearchRequest,
    Similarity, VectorStore,
};
use rag_pipeline::database::sqlite::Database;
use rag_pipeline::embeddings::chunking::Chunk;
use serde_json::json;
use tempfile::TempDir;

const DIM: usize = 32;
const READY_TIMEOUT: Duration = Duration::from_secs(120);
const CONTENT_TYPES: [&str; 3] = ["Tutorial", "Article", "Video"];

async fn open_store(temp_dir: &TempDir) -> VectorStore {
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should open metadata database");
    let uri = temp_dir.path().join("vectors");
    VectorStore::open(uri.to_str().expect("utf-8 path"), database, DIM)
        .await
        .expect("should open vector store")
        .with_poll_interval(Duration::from_millis(50))
}

/// Deterministic unit vector for document `seed`
fn pseudo_random_vector(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let mut vector: Vec<f32> = (0..DIM)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32 / (1_u64 << 31) as f32) - 0.5
        })
        .collect();
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    vector.iter_mut().for_each(|x| *x /= norm);
    vector
}

fn article(index: u64) -> EmbeddedChunk {
    let content_type = CONTENT_TYPES[(index % 3) as usize];
    let document = Document::new(
        format!("article-{index}"),
        format!("Article {index} about {content_type} topics"),
        json!({
            "contentType": content_type,
            "views": index * 10,
            "published": index % 2 == 0,
        }),
    );
    EmbeddedChunk {
        chunk: Chunk {
            document,
            text_field: "body".to_string(),
            chunk_index: 0,
            token_count: 6,
        },
        embedding: pseudo_random_vector(index),
    }
}

fn corpus(size: u64) -> Vec<EmbeddedChunk> {
    (0..size).map(article).collect()
}

fn definition(filter_fields: &[&str]) -> IndexDefinition {
    IndexDefinition {
        name: "vector_index".to_string(),
        vector_field: EMBEDDING_FIELD.to_string(),
        dimensions: DIM,
        similarity: Similarity::Cosine,
        filter_fields: filter_fields.iter().map(|f| f.to_string()).collect(),
    }
}

async fn ready(store: &VectorStore) {
    store
        .wait_for_index_ready("articles", "vector_index", READY_TIMEOUT)
        .await
        .expect("index should become ready");
}

#[tokio::test]
async fn approximate_index_over_large_collection() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    store
        .ingest("articles", &corpus(512))
        .await
        .expect("should ingest");
    store
        .create_index("articles", &definition(&["metadata.contentType"]))
        .await
        .expect("should create index");
    ready(&store).await;

    let request = SearchRequest::new(pseudo_random_vector(7), 5, 100);
    let results = store
        .search("articles", "vector_index", &request)
        .await
        .expect("should search");

    assert_eq!(results.len(), 5);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
}

#[tokio::test]
async fn filters_on_numbers_and_booleans() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    store
        .ingest("articles", &corpus(60))
        .await
        .expect("should ingest");
    store
        .create_index(
            "articles",
            &definition(&["metadata.views", "metadata.published"]),
        )
        .await
        .expect("should create index");
    ready(&store).await;

    let filter = Filter::And(vec![
        Filter::gte("metadata.views", 300_i64),
        Filter::eq("metadata.published", true),
    ]);
    let request = SearchRequest::new(pseudo_random_vector(3), 50, 100)
        .with_filter(filter)
        .with_fields(vec![
            "metadata.views".to_string(),
            "metadata.published".to_string(),
        ]);
    let results = store
        .search("articles", "vector_index", &request)
        .await
        .expect("should search");

    // 30..60 even indexes
    assert_eq!(results.len(), 15);
    for result in &results {
        let views = result.fields["metadata.views"]
            .as_i64()
            .expect("views is numeric");
        assert!(views >= 300);
        assert_eq!(result.fields["metadata.published"], json!(true));
    }
}

#[tokio::test]
async fn update_changes_the_filterable_fields() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    store
        .ingest("articles", &corpus(30))
        .await
        .expect("should ingest");
    store
        .create_index("articles", &definition(&["metadata.contentType"]))
        .await
        .expect("should create index");
    ready(&store).await;

    let by_views = SearchRequest::new(pseudo_random_vector(1), 5, 50)
        .with_filter(Filter::gte("metadata.views", 100_i64));
    let err = store
        .search("articles", "vector_index", &by_views)
        .await
        .expect_err("views is not declared yet");
    assert!(matches!(err, RagError::FilterFieldNotIndexed { ref field, .. } if field == "metadata.views"));

    let updated = store
        .update_index(
            "articles",
            "vector_index",
            &definition(&["metadata.contentType", "metadata.views"]),
        )
        .await
        .expect("should update index");
    assert_eq!(updated.generation, 2);
    ready(&store).await;

    let results = store
        .search("articles", "vector_index", &by_views)
        .await
        .expect("views is now filterable");
    assert_eq!(results.len(), 5);
}

#[tokio::test]
async fn reingest_rebuilds_registered_indexes() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    store
        .ingest("articles", &corpus(10))
        .await
        .expect("should ingest");
    store
        .create_index("articles", &definition(&[]))
        .await
        .expect("should create index");
    ready(&store).await;

    store
        .ingest("articles", &corpus(20))
        .await
        .expect("should re-ingest");
    ready(&store).await;

    let index = store
        .get_index("articles", "vector_index")
        .await
        .expect("index survives re-ingest");
    assert_eq!(index.status, IndexStatus::Ready);
    assert_eq!(store.count("articles").await.expect("should count"), 20);

    let request = SearchRequest::new(pseudo_random_vector(15), 20, 50);
    let results = store
        .search("articles", "vector_index", &request)
        .await
        .expect("should search");
    assert_eq!(results.len(), 20);
}

#[tokio::test]
async fn index_registry_survives_reopen() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    {
        let store = open_store(&temp_dir).await;
        store
            .ingest("articles", &corpus(10))
            .await
            .expect("should ingest");
        store
            .create_index("articles", &definition(&["metadata.contentType"]))
            .await
            .expect("should create index");
        ready(&store).await;
    }

    let store = open_store(&temp_dir).await;
    let indexes = store
        .list_indexes("articles")
        .await
        .expect("should list indexes");
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].status, IndexStatus::Ready);

    let request = SearchRequest::new(pseudo_random_vector(2), 3, 10)
        .with_filter(Filter::eq("metadata.contentType", "Video"));
    let results = store
        .search("articles", "vector_index", &request)
        .await
        .expect("should search after reopen");
    assert_eq!(results.len(), 3);
    assert!(
        results
            .iter()
            .all(|r| r.document_id.starts_with("article-"))
    );
}
