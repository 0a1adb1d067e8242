// Pipeline module
// Ingestion and question answering over the shared RAG context


use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::RagError;
use crate::config::Config;
use crate::corpus::Document;
use crate::database::lancedb::{EmbeddedChunk, Filter, SearchRequest, SearchResult, VectorStore};
use crate::database::sqlite::Database;
use crate::embeddings::{Chunker, Embedder, OllamaClient};
use crate::generation::{
    ChatClient, ChatMessage, ChatModel, TokenStream, build_stateful_prompt, build_stateless_prompt,
};
use crate::history::HistoryStore;
use crate::rerank::{HttpReranker, Reranker};

// Chunks sent to the embedder per progress step
const EMBED_BATCH_SIZE: usize = 32;

/// Retrieval parameters shared by every query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub collection: String,
    pub index_name: String,
    pub text_field: String,
    pub k: usize,
    pub num_candidates: usize,
    pub rerank_top_k: usize,
}

impl PipelineSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.store.collection.clone(),
            index_name: config.store.index_name.clone(),
            text_field: config.retrieval.text_field.clone(),
            k: config.retrieval.k,
            num_candidates: config.retrieval.num_candidates,
            rerank_top_k: config.reranker.top_k,
        }
    }
}

impl Default for PipelineSettings {
    #[inline]
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Per-question options
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Prefilter applied to the vector search
    pub filter: Option<Filter>,
    /// Re-rank retrieved passages when a re-ranker is configured
    pub rerank: bool,
}

impl Default for QueryOptions {
    #[inline]
    fn default() -> Self {
        Self {
            filter: None,
            rerank: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Documents whose text was empty or whitespace
    pub empty_documents: usize,
}

/// Everything a pipeline operation needs, built once at startup
pub struct RagContext {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    history: HistoryStore,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Arc<dyn ChatModel>,
    chunker: Chunker,
    settings: PipelineSettings,
}

impl std::fmt::Debug for RagContext {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagContext")
            .field("embedder", &self.embedder.model_id())
            .field("store", &self.store)
            .field("reranker", &self.reranker.is_some())
            .field("generator", &self.generator.model_id())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RagContext {
    /// Assemble a context; the embedder must produce vectors the store accepts
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        generator: Arc<dyn ChatModel>,
    ) -> Result<Self, RagError> {
        if embedder.dimensions() != store.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimensions(),
            });
        }

        let history = HistoryStore::new(store.database().clone());
        Ok(Self {
            embedder,
            store,
            history,
            reranker: None,
            generator,
            chunker: Chunker::default(),
            settings: PipelineSettings::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Open both databases and build the model clients described by `config`
    ///
    /// Failing to open either database is fatal.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self, RagError> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let database = Database::initialize_from_config_dir(config.metadata_dir())
            .await
            .map_err(|e| RagError::Database(format!("Failed to open metadata database: {:#}", e)))?;

        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Config(format!("Invalid Ollama settings: {:#}", e)))?;

        let store = VectorStore::open(
            &config.store_uri(),
            database,
            config.ollama.embedding_dimension as usize,
        )
        .await?
        .with_ann_min_rows(config.store.ann_min_rows)
        .with_poll_interval(std::time::Duration::from_secs(
            config.store.index_poll_interval_secs,
        ));

        let generator = ChatClient::from_config(&config.generator);

        let mut context = Self::new(Arc::new(embedder), store, Arc::new(generator))?
            .with_chunker(Chunker::from_config(config.chunking.clone()))
            .with_settings(PipelineSettings::from_config(config));

        if config.reranker.enabled {
            let reranker = HttpReranker::new(&config.reranker.url, &config.reranker.model)
                .map_err(|e| RagError::Config(format!("Invalid re-ranker settings: {:#}", e)))?;
            context = context.with_reranker(Arc::new(reranker));
        }

        info!("RAG context ready: {:?}", context);
        Ok(context)
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    #[inline]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Chunk, embed and store `documents`, replacing the collection's contents
    #[inline]
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport, RagError> {
        let mut report = IngestReport {
            documents: documents.len(),
            ..IngestReport::default()
        };

        let mut chunks = Vec::new();
        for document in documents {
            let document_chunks = self.chunker.chunk(document, &self.settings.text_field)?;
            if document_chunks.is_empty() {
                debug!("Document {} has no text to index", document.id);
                report.empty_documents += 1;
            }
            chunks.extend(document_chunks);
        }
        report.chunks = chunks.len();

        info!(
            "Embedding {} chunks from {} documents with {}",
            chunks.len(),
            documents.len(),
            self.embedder.model_id()
        );

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text().to_string()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            embedded.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding }),
            );
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        self.store
            .ingest(&self.settings.collection, &embedded)
            .await?;

        info!(
            "Ingested {} documents as {} chunks into {}",
            report.documents, report.chunks, self.settings.collection
        );
        Ok(report)
    }

    /// Embed `query` and run a filtered vector search
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        filter: Option<Filter>,
        fields: Vec<String>,
    ) -> Result<Vec<SearchResult>, RagError> {
        let query_vector = self
            .embedder
            .embed(query)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let mut request =
            SearchRequest::new(query_vector, self.settings.k, self.settings.num_candidates)
                .with_fields(fields);
        if let Some(filter) = filter {
            request = request.with_filter(filter);
        }

        self.store
            .search(&self.settings.collection, &self.settings.index_name, &request)
            .await
    }

    /// Passages for `query`, re-ranked when requested and available
    #[inline]
    pub async fn retrieve_context(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<String>, RagError> {
        let results = self
            .search(
                query,
                options.filter.clone(),
                vec![self.settings.text_field.clone()],
            )
            .await?;

        let passages: Vec<String> = results.into_iter().map(|result| result.body).collect();
        debug!("Retrieved {} passages", passages.len());

        match (&self.reranker, options.rerank) {
            (Some(reranker), true) if !passages.is_empty() => {
                let ranked = reranker
                    .rerank(query, &passages, self.settings.rerank_top_k)
                    .map_err(|e| RagError::Rerank(format!("{:#}", e)))?;
                Ok(ranked.into_iter().map(|r| r.text).collect())
            }
            _ => Ok(passages),
        }
    }

    /// Single-turn answer grounded in retrieved context
    #[inline]
    pub async fn answer(&self, query: &str, options: &QueryOptions) -> Result<String, RagError> {
        let messages = self.stateless_messages(query, options).await?;
        self.generator
            .generate(&messages)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }

    /// [`RagContext::answer`] delivered as a stream of fragments
    #[inline]
    pub async fn answer_stream(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<TokenStream, RagError> {
        let messages = self.stateless_messages(query, options).await?;
        self.generator
            .generate_stream(&messages)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }

    /// Conversational answer
    ///
    /// Context is retrieved for the current query alone; the session's earlier
    /// turns are replayed after the system message. The exchange is recorded
    /// only once generation succeeds.
    #[inline]
    pub async fn chat(&self, session_id: &str, query: &str) -> Result<String, RagError> {
        let history: Vec<ChatMessage> = self
            .history
            .get_session(session_id)
            .await?
            .iter()
            .map(ChatMessage::from)
            .collect();

        let passages = self
            .retrieve_context(query, &QueryOptions::default())
            .await?;
        let messages = build_stateful_prompt(query, &passages, &history);

        let answer = self
            .generator
            .generate(&messages)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        self.record_exchange(session_id, query, &answer).await;
        Ok(answer)
    }

    async fn stateless_messages(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ChatMessage>, RagError> {
        let passages = self.retrieve_context(query, options).await?;
        if passages.is_empty() {
            warn!("No context found for query, the model is asked to decline");
        }
        Ok(build_stateless_prompt(query, &passages))
    }

    async fn record_exchange(&self, session_id: &str, query: &str, answer: &str) {
        if let Err(e) = self
            .history
            .append_exchange(session_id, query, answer)
            .await
        {
            error!("Failed to record exchange in session {}: {}", session_id, e);
        }
    }
}

/// Projected fields of a result as pretty JSON, for display
#[inline]
pub fn render_fields(fields: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(fields).unwrap_or_default()
}
