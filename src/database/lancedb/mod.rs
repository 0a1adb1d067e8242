// LanceDB vector database module
// Chunk storage, vector index lifecycle and filtered similarity search


pub mod filter;
pub mod readiness;
pub mod vector_store;

use serde_json::{Map, Value};

pub use crate::database::sqlite::models::{IndexDefinition, IndexStatus, Similarity, VectorIndex};
use crate::embeddings::chunking::Chunk;
pub use filter::{Filter, FilterValue};
pub use readiness::{Clock, IndexProgress, IndexStatusSource, SystemClock, wait_for_index_ready};
pub use vector_store::VectorStore;

/// Column holding chunk vectors; the only supported vector path
pub const EMBEDDING_FIELD: &str = "embedding";

/// Largest candidate pool a search may request
pub const MAX_NUM_CANDIDATES: usize = 10_000;

/// A chunk paired with its embedding, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Parameters of a filtered nearest-neighbour search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query_vector: Vec<f32>,
    /// Number of results returned
    pub k: usize,
    /// Size of the candidate pool considered before truncating to `k`
    pub num_candidates: usize,
    pub filter: Option<Filter>,
    /// Document paths to project into each result; empty means every field
    pub fields: Vec<String>,
}

impl SearchRequest {
    #[inline]
    pub fn new(query_vector: Vec<f32>, k: usize, num_candidates: usize) -> Self {
        Self {
            query_vector,
            k,
            num_candidates,
            filter: None,
            fields: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    /// Chunk text
    pub body: String,
    /// Projected document fields keyed by dotted path
    pub fields: Map<String, Value>,
    /// Similarity in `[0, 1]`, higher is better
    pub score: f32,
}

impl From<Similarity> for lancedb::DistanceType {
    #[inline]
    fn from(similarity: Similarity) -> Self {
        match similarity {
            Similarity::Cosine => lancedb::DistanceType::Cosine,
            Similarity::Euclidean => lancedb::DistanceType::L2,
            Similarity::DotProduct => lancedb::DistanceType::Dot,
        }
    }
}

/// Map a LanceDB distance to a similarity score
///
/// Cosine and dot distances are `1 - x·y`, so `1 - d/2` maps unit vectors
/// onto `[0, 1]`. L2 distances are squared.
#[inline]
pub fn similarity_score(similarity: Similarity, distance: f32) -> f32 {
    match similarity {
        Similarity::Cosine | Similarity::DotProduct => (1.0 - distance / 2.0).clamp(0.0, 1.0),
        Similarity::Euclidean => 1.0 / (1.0 + distance.max(0.0).sqrt()),
    }
}
