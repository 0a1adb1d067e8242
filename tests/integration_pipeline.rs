#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end question answering with an in-process embedder and generator

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rag_pipeline::config::Config;
use rag_pipeline::corpus::Document;
use rag_pipeline::database::lancedb::VectorStore;
use rag_pipeline::database::sqlite::Database;
use rag_pipeline::embeddings::Embedder;
use rag_pipeline::generation::{ChatMessage, ChatModel, Role, TokenStream};
use rag_pipeline::pipeline::{PipelineSettings, QueryOptions, RagContext};
use serde_json::json;
use tempfile::TempDir;

const DIM: usize = 256;
const MIN_RELEVANT_SCORE: f32 = 0.6;

/// Hashed bag of words; texts sharing words land close together
struct BagOfWordsEmbedder;

impl Embedder for BagOfWordsEmbedder {
    fn model_id(&self) -> &str {
        "bag-of-words"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % DIM as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}

#[derive(Default)]
struct RecordingModel {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingModel {
    fn last_prompt(&self) -> Vec<ChatMessage> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .last()
            .cloned()
            .expect("a prompt was sent")
    }
}

impl ChatModel for RecordingModel {
    fn model_id(&self) -> &str {
        "recording"
    }

    fn generate(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let mut prompts = self.prompts.lock().expect("prompts lock");
        prompts.push(messages.to_vec());
        Ok(format!("answer {}", prompts.len()))
    }

    fn generate_stream(&self, messages: &[ChatMessage]) -> anyhow::Result<TokenStream> {
        let answer = self.generate(messages)?;
        Ok(Box::new(std::iter::once(Ok(answer))))
    }
}

async fn pipeline(temp_dir: &TempDir, generator: Arc<RecordingModel>) -> RagContext {
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should open metadata database");
    let uri = temp_dir.path().join("vectors");
    let store = VectorStore::open(uri.to_str().expect("utf-8 path"), database, DIM)
        .await
        .expect("should open vector store")
        .with_poll_interval(Duration::from_millis(20));

    RagContext::new(Arc::new(BagOfWordsEmbedder), store, generator)
        .expect("dimensions match")
        .with_settings(PipelineSettings::from_config(&Config::default()))
}

async fn create_default_index(context: &RagContext) {
    let config = Config::default();
    let mut definition = config.index_definition(vec!["metadata.contentType".to_string()]);
    definition.dimensions = DIM;

    context
        .store()
        .create_index(&config.store.collection, &definition)
        .await
        .expect("should create index");
    context
        .store()
        .wait_for_index_ready(
            &config.store.collection,
            &config.store.index_name,
            Duration::from_secs(30),
        )
        .await
        .expect("index should become ready");
}

#[tokio::test]
async fn empty_collection_asks_the_model_to_decline() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let generator = Arc::new(RecordingModel::default());
    let context = pipeline(&temp_dir, Arc::clone(&generator)).await;
    create_default_index(&context).await;

    context
        .answer("anything", &QueryOptions::default())
        .await
        .expect("should answer");

    let prompt = generator.last_prompt();
    assert_eq!(prompt.len(), 1);
    assert!(prompt[0].content.contains("I DON'T KNOW"));
    assert!(prompt[0].content.contains("Context:\n\n\nQuestion:anything"));
}

#[tokio::test]
async fn relevant_chunk_scores_above_threshold() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let context = pipeline(&temp_dir, Arc::new(RecordingModel::default())).await;

    let document = Document::new(
        "atlas-search",
        "MongoDB Atlas Search is a full-text search engine.",
        json!({"contentType": "Tutorial"}),
    );
    context.ingest(&[document]).await.expect("should ingest");
    create_default_index(&context).await;

    let results = context
        .search("What is Atlas Search?", None, Vec::new())
        .await
        .expect("should search");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, "atlas-search");
    assert_eq!(
        results[0].body,
        "MongoDB Atlas Search is a full-text search engine."
    );
    assert!(
        results[0].score > MIN_RELEVANT_SCORE,
        "score {} should exceed {}",
        results[0].score,
        MIN_RELEVANT_SCORE
    );
    assert_eq!(results[0].fields["metadata"], json!({"contentType": "Tutorial"}));
}

#[tokio::test]
async fn second_turn_sees_the_first() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let generator = Arc::new(RecordingModel::default());
    let context = pipeline(&temp_dir, Arc::clone(&generator)).await;

    let document = Document::new(
        "triggers",
        "Database triggers execute server-side logic when documents are inserted, updated or deleted.",
        json!({"contentType": "Article"}),
    );
    context.ingest(&[document]).await.expect("should ingest");
    create_default_index(&context).await;

    let first = context
        .chat("session-1", "What are triggers?")
        .await
        .expect("first turn");
    context
        .chat("session-1", "What did I just ask you?")
        .await
        .expect("second turn");

    let prompt = generator.last_prompt();
    assert_eq!(prompt[0].role, Role::System);
    assert!(
        prompt
            .iter()
            .any(|m| m.role == Role::User && m.content == "What are triggers?")
    );
    assert!(
        prompt
            .iter()
            .any(|m| m.role == Role::Assistant && m.content == first)
    );
    assert_eq!(
        prompt.last().map(|m| m.content.as_str()),
        Some("What did I just ask you?")
    );

    let other = context
        .history()
        .get_session("session-2")
        .await
        .expect("history");
    assert!(other.is_empty());
}
