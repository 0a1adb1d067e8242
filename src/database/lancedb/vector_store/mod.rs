
use super::filter::column_name;
use super::readiness::{
    self, Clock, DEFAULT_POLL_INTERVAL, IndexProgress, IndexStatusSource, SystemClock,
};
use super::{
    EMBEDDING_FIELD, EmbeddedChunk, IndexDefinition, IndexStatus, MAX_NUM_CANDIDATES,
    SearchRequest, SearchResult, VectorIndex, similarity_score,
};
use crate::RagError;
use crate::corpus::Document;
use crate::database::sqlite::Database;
use arrow::array::{
    Array, ArrayRef, BooleanArray, FixedSizeListArray, Float32Array, Float64Array,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::index::Index;
use lancedb::index::scalar::BTreeIndexBuilder;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Collections smaller than this are searched exhaustively without an ANN index
pub const DEFAULT_ANN_MIN_ROWS: usize = 256;

const CHUNK_ID_COLUMN: &str = "chunk_id";
const DOCUMENT_ID_COLUMN: &str = "document_id";
const CHUNK_INDEX_COLUMN: &str = "chunk_index";
const BODY_COLUMN: &str = "body";
const DOCUMENT_COLUMN: &str = "document";
const DISTANCE_COLUMN: &str = "_distance";

/// In-flight builds keyed by (collection, index name), with their generation
type BuildHandles = Arc<Mutex<HashMap<(String, String), (i64, JoinHandle<()>)>>>;

const RESERVED_COLUMNS: [&str; 6] = [
    CHUNK_ID_COLUMN,
    DOCUMENT_ID_COLUMN,
    CHUNK_INDEX_COLUMN,
    BODY_COLUMN,
    DOCUMENT_COLUMN,
    EMBEDDING_FIELD,
];

/// Chunk and vector store on LanceDB, with index definitions kept in SQLite
///
/// Each collection is one LanceDB table. Scalar document fields are
/// flattened into their own columns so filters become SQL predicates.
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    database: Database,
    dimension: usize,
    ann_min_rows: usize,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    builds: BuildHandles,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("dimension", &self.dimension)
            .field("ann_min_rows", &self.ann_min_rows)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Connect to the LanceDB database at `uri`
    ///
    /// Local paths are created when missing. Failure to connect is fatal.
    #[inline]
    pub async fn open(uri: &str, database: Database, dimension: usize) -> Result<Self, RagError> {
        if dimension == 0 {
            return Err(RagError::Config(
                "Embedding dimension must be positive".to_string(),
            ));
        }

        if !uri.contains("://") {
            std::fs::create_dir_all(uri).map_err(|e| {
                RagError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        debug!("Connecting to LanceDB at {}", uri);
        let connection = lancedb::connect(uri).execute().await.map_err(|e| {
            RagError::Database(format!("Failed to connect to LanceDB at {}: {}", uri, e))
        })?;

        info!(
            "Vector store opened at {} ({} dimensions)",
            uri, dimension
        );
        Ok(Self {
            connection,
            database,
            dimension,
            ann_min_rows: DEFAULT_ANN_MIN_ROWS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            clock: Arc::new(SystemClock::new()),
            builds: Arc::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_ann_min_rows(mut self, rows: usize) -> Self {
        self.ann_min_rows = rows;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Replace the contents of `collection` with `chunks`
    ///
    /// Every index registered on the collection goes back to `pending` and is
    /// rebuilt in the background.
    #[inline]
    pub async fn ingest(
        &self,
        collection: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, RagError> {
        for chunk in chunks {
            self.check_dimension(chunk.embedding.len())?;
        }

        let batch = build_record_batch(chunks, self.dimension)?;

        // Invalidate in-flight builds before the table disappears under them
        let indexes = self
            .database
            .reset_vector_indexes(collection)
            .await
            .map_err(|e| RagError::Database(format!("Failed to reset indexes: {}", e)))?;

        self.drop_table_if_exists(collection).await?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        self.connection
            .create_table(collection, reader)
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to create table {}: {}", collection, e))
            })?;

        info!(
            "Ingested {} chunks into collection {}",
            chunks.len(),
            collection
        );

        for index in indexes {
            self.spawn_build(index);
        }

        Ok(chunks.len())
    }

    /// Number of chunks stored in `collection`
    #[inline]
    pub async fn count(&self, collection: &str) -> Result<usize, RagError> {
        let Some(table) = self.open_table_if_exists(collection).await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Register an index definition and start building it in the background
    #[inline]
    pub async fn create_index(
        &self,
        collection: &str,
        definition: &IndexDefinition,
    ) -> Result<VectorIndex, RagError> {
        self.validate_definition(definition)?;

        if self
            .database
            .get_vector_index(collection, &definition.name)
            .await
            .map_err(|e| RagError::Database(format!("Failed to look up index: {}", e)))?
            .is_some()
        {
            return Err(RagError::IndexAlreadyExists {
                collection: collection.to_string(),
                index: definition.name.clone(),
            });
        }

        let index = self
            .database
            .create_vector_index(collection, definition)
            .await
            .map_err(|e| RagError::Database(format!("Failed to register index: {}", e)))?;

        info!(
            "Registered index {} on {} ({} dimensions, {}, filters: {:?})",
            index.name,
            collection,
            index.dimensions,
            index.similarity,
            index.filter_fields.0
        );

        self.spawn_build(index.clone());
        Ok(index)
    }

    /// Replace an index definition; the index rebuilds under a new generation
    #[inline]
    pub async fn update_index(
        &self,
        collection: &str,
        index_name: &str,
        definition: &IndexDefinition,
    ) -> Result<VectorIndex, RagError> {
        if definition.name != index_name {
            return Err(RagError::InvalidQuery(format!(
                "Definition name '{}' does not match index '{}'",
                definition.name, index_name
            )));
        }
        self.validate_definition(definition)?;

        let index = self
            .database
            .replace_vector_index(collection, index_name, definition)
            .await
            .map_err(|e| RagError::Database(format!("Failed to update index: {}", e)))?
            .ok_or_else(|| RagError::IndexNotFound {
                collection: collection.to_string(),
                index: index_name.to_string(),
            })?;

        info!(
            "Updated index {} on {} to generation {} (filters: {:?})",
            index.name, collection, index.generation, index.filter_fields.0
        );

        self.spawn_build(index.clone());
        Ok(index)
    }

    /// Forget an index definition
    ///
    /// Physical LanceDB indexes stay on the table until the next ingest.
    #[inline]
    pub async fn drop_index(&self, collection: &str, index_name: &str) -> Result<(), RagError> {
        let removed = self
            .database
            .delete_vector_index(collection, index_name)
            .await
            .map_err(|e| RagError::Database(format!("Failed to drop index: {}", e)))?;

        if !removed {
            return Err(RagError::IndexNotFound {
                collection: collection.to_string(),
                index: index_name.to_string(),
            });
        }

        info!("Dropped index {} on {}", index_name, collection);
        Ok(())
    }

    #[inline]
    pub async fn list_indexes(&self, collection: &str) -> Result<Vec<VectorIndex>, RagError> {
        self.database
            .list_vector_indexes(collection)
            .await
            .map_err(|e| RagError::Database(format!("Failed to list indexes: {}", e)))
    }

    #[inline]
    pub async fn get_index(
        &self,
        collection: &str,
        index_name: &str,
    ) -> Result<VectorIndex, RagError> {
        self.database
            .get_vector_index(collection, index_name)
            .await
            .map_err(|e| RagError::Database(format!("Failed to look up index: {}", e)))?
            .ok_or_else(|| RagError::IndexNotFound {
                collection: collection.to_string(),
                index: index_name.to_string(),
            })
    }

    #[inline]
    pub async fn index_status(
        &self,
        collection: &str,
        index_name: &str,
    ) -> Result<IndexStatus, RagError> {
        Ok(self.get_index(collection, index_name).await?.status)
    }

    /// Block until the index is ready, polling at the configured interval
    ///
    /// A `pending` or `building` index with no build running in this process
    /// was orphaned by an earlier process and is rebuilt first.
    #[inline]
    pub async fn wait_for_index_ready(
        &self,
        collection: &str,
        index_name: &str,
        timeout: Duration,
    ) -> Result<(), RagError> {
        self.resume_orphaned_build(collection, index_name).await?;

        readiness::wait_for_index_ready(
            self,
            self.clock.as_ref(),
            collection,
            index_name,
            self.poll_interval,
            timeout,
        )
        .await
    }

    /// Filtered nearest-neighbour search
    ///
    /// A missing index yields no results; an index that is not ready yet is
    /// searched exhaustively.
    #[inline]
    pub async fn search(
        &self,
        collection: &str,
        index_name: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, RagError> {
        validate_limits(request)?;
        self.check_dimension(request.query_vector.len())?;

        let index = match self.database.get_vector_index(collection, index_name).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                warn!(
                    "Index {} does not exist on {}, returning no results",
                    index_name, collection
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(RagError::Database(format!(
                    "Failed to look up index: {}",
                    e
                )));
            }
        };

        if let Some(filter) = &request.filter {
            if let Some(field) = filter.fields().into_iter().find(|f| !index.is_filter_field(f)) {
                return Err(RagError::FilterFieldNotIndexed {
                    index: index_name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let degraded = index.status != IndexStatus::Ready;
        if degraded {
            warn!(
                "Index {} on {} is {}, falling back to exhaustive search",
                index_name, collection, index.status
            );
        }

        let Some(table) = self.open_table_if_exists(collection).await? else {
            debug!("Collection {} has no data", collection);
            return Ok(Vec::new());
        };

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        let predicate = request.filter.as_ref().map(|filter| filter.to_sql(&schema));

        let mut query = table
            .vector_search(request.query_vector.as_slice())
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column(EMBEDDING_FIELD)
            .distance_type(index.similarity.into())
            .select(Select::columns(&[
                CHUNK_ID_COLUMN,
                DOCUMENT_ID_COLUMN,
                BODY_COLUMN,
                DOCUMENT_COLUMN,
            ]))
            .limit(request.num_candidates);

        if let Some(predicate) = predicate {
            debug!("Applying prefilter: {}", predicate);
            query = query.only_if(predicate);
        }
        if degraded {
            query = query.bypass_vector_index();
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(parse_search_batch(&batch, &index, &request.fields)?);
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(request.k);

        debug!(
            "Search on {}/{} returned {} results",
            collection,
            index_name,
            results.len()
        );
        Ok(results)
    }

    fn check_dimension(&self, actual: usize) -> Result<(), RagError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }

    fn validate_definition(&self, definition: &IndexDefinition) -> Result<(), RagError> {
        if definition.name.trim().is_empty() {
            return Err(RagError::InvalidQuery(
                "Index name cannot be empty".to_string(),
            ));
        }

        if definition.vector_field != EMBEDDING_FIELD {
            return Err(RagError::InvalidQuery(format!(
                "Vectors are stored in '{}', not '{}'",
                EMBEDDING_FIELD, definition.vector_field
            )));
        }

        self.check_dimension(definition.dimensions)?;

        if let Some(field) = definition
            .filter_fields
            .iter()
            .find(|f| f.trim().is_empty() || RESERVED_COLUMNS.contains(&column_name(f).as_str()))
        {
            return Err(RagError::InvalidQuery(format!(
                "'{}' cannot be used as a filter field",
                field
            )));
        }

        Ok(())
    }

    async fn open_table_if_exists(
        &self,
        collection: &str,
    ) -> Result<Option<lancedb::Table>, RagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == collection) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        Ok(Some(table))
    }

    async fn drop_table_if_exists(&self, collection: &str) -> Result<(), RagError> {
        let table_names = self.connection.table_names().execute().await.map_err(|e| {
            RagError::Database(format!("Failed to list tables for drop: {}", e))
        })?;

        if table_names.iter().any(|name| name == collection) {
            info!("Dropping existing table {}", collection);
            self.connection
                .drop_table(collection)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    /// Wait for every build started by this store to finish
    ///
    /// Builds run on the caller's runtime and die with it, so a short-lived
    /// process must call this before exiting.
    #[inline]
    pub async fn finish_pending_builds(&self) {
        loop {
            let running: Vec<_> = {
                let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
                builds.drain().collect()
            };
            if running.is_empty() {
                return;
            }

            for ((collection, name), (generation, handle)) in running {
                debug!(
                    "Waiting for build of {}/{} generation {}",
                    collection, name, generation
                );
                if let Err(e) = handle.await {
                    error!("Build task for {}/{} aborted: {}", collection, name, e);
                }
            }
        }
    }

    async fn resume_orphaned_build(
        &self,
        collection: &str,
        index_name: &str,
    ) -> Result<(), RagError> {
        let index = self.get_index(collection, index_name).await?;
        if !matches!(index.status, IndexStatus::Pending | IndexStatus::Building) {
            return Ok(());
        }

        let live = {
            let builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
            builds
                .get(&(collection.to_string(), index_name.to_string()))
                .is_some_and(|(generation, handle)| {
                    *generation == index.generation && !handle.is_finished()
                })
        };
        if !live {
            info!(
                "Index {}/{} is {} with no running build, rebuilding generation {}",
                collection, index_name, index.status, index.generation
            );
            self.spawn_build(index);
        }
        Ok(())
    }

    fn spawn_build(&self, index: VectorIndex) {
        let connection = self.connection.clone();
        let database = self.database.clone();
        let ann_min_rows = self.ann_min_rows;
        let key = (index.collection.clone(), index.name.clone());
        let generation = index.generation;

        let handle = tokio::spawn(async move {
            build_index(&connection, &database, &index, ann_min_rows).await;
        });

        let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
        // A superseded build keeps running detached; its status writes are ignored
        builds.insert(key, (generation, handle));
    }
}

#[async_trait]
impl IndexStatusSource for VectorStore {
    #[inline]
    async fn index_progress(
        &self,
        collection: &str,
        index: &str,
    ) -> Result<IndexProgress, RagError> {
        let index = self.get_index(collection, index).await?;
        Ok(IndexProgress {
            status: index.status,
            error_message: index.error_message,
        })
    }
}

/// Background build of one index generation
///
/// Every status write is conditional on the generation, so a build that has
/// been superseded by a newer definition or ingest cannot report over it.
async fn build_index(
    connection: &Connection,
    database: &Database,
    index: &VectorIndex,
    ann_min_rows: usize,
) {
    match database
        .set_vector_index_status(index, IndexStatus::Building, None)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            debug!(
                "Build of {}/{} generation {} superseded before start",
                index.collection, index.name, index.generation
            );
            return;
        }
        Err(e) => {
            error!(
                "Failed to mark {}/{} as building: {}",
                index.collection, index.name, e
            );
            return;
        }
    }

    let (status, message) = match reconcile_physical_index(connection, index, ann_min_rows).await
    {
        Ok(()) => (IndexStatus::Ready, None),
        Err(e) => {
            error!(
                "Building index {}/{} failed: {}",
                index.collection, index.name, e
            );
            (IndexStatus::Failed, Some(e.to_string()))
        }
    };

    if let Err(e) = database
        .set_vector_index_status(index, status, message.as_deref())
        .await
    {
        error!(
            "Failed to record status of {}/{}: {}",
            index.collection, index.name, e
        );
    }
}

async fn reconcile_physical_index(
    connection: &Connection,
    index: &VectorIndex,
    ann_min_rows: usize,
) -> Result<(), RagError> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

    if !table_names.iter().any(|name| name == &index.collection) {
        debug!("Collection {} is empty, nothing to index", index.collection);
        return Ok(());
    }

    let table = connection
        .open_table(&index.collection)
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

    let rows = table
        .count_rows(None)
        .await
        .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

    if rows < ann_min_rows {
        debug!(
            "Collection {} has {} rows, using exact search",
            index.collection, rows
        );
        return Ok(());
    }

    info!(
        "Building IVF-PQ index on {} ({} rows, {})",
        index.collection, rows, index.similarity
    );
    table
        .create_index(
            &[EMBEDDING_FIELD],
            Index::IvfPq(IvfPqIndexBuilder::default().distance_type(index.similarity.into())),
        )
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to create vector index: {}", e)))?;

    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

    for field in index.filter_fields.iter() {
        let column = column_name(field);
        if schema.field_with_name(&column).is_err() {
            debug!("No column for filter field {}, skipping scalar index", field);
            continue;
        }

        table
            .create_index(&[column.as_str()], Index::BTree(BTreeIndexBuilder::default()))
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to create scalar index on {}: {}", field, e))
            })?;
    }

    info!("Index {} on {} built", index.name, index.collection);
    Ok(())
}

fn validate_limits(request: &SearchRequest) -> Result<(), RagError> {
    if request.k == 0 {
        return Err(RagError::InvalidQuery("k must be at least 1".to_string()));
    }
    if request.num_candidates < request.k {
        return Err(RagError::InvalidQuery(format!(
            "num_candidates ({}) must be at least k ({})",
            request.num_candidates, request.k
        )));
    }
    if request.num_candidates > MAX_NUM_CANDIDATES {
        return Err(RagError::InvalidQuery(format!(
            "num_candidates ({}) cannot exceed {}",
            request.num_candidates, MAX_NUM_CANDIDATES
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafKind {
    Bool,
    Number,
    Text,
}

impl LeafKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(LeafKind::Bool),
            Value::Number(_) => Some(LeafKind::Number),
            Value::String(_) => Some(LeafKind::Text),
            _ => None,
        }
    }

    fn merge(self, other: Self) -> Self {
        if self == other { self } else { LeafKind::Text }
    }

    fn data_type(self) -> DataType {
        match self {
            LeafKind::Bool => DataType::Boolean,
            LeafKind::Number => DataType::Float64,
            LeafKind::Text => DataType::Utf8,
        }
    }
}

/// Scalar leaves of a chunk's document keyed by column name; the text field
/// lives in the body column instead
fn flatten_leaves(embedded: &EmbeddedChunk) -> BTreeMap<String, Value> {
    fn walk(prefix: &str, value: &Value, leaves: &mut BTreeMap<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    walk(&format!("{}.{}", prefix, key), child, leaves);
                }
            }
            Value::Array(_) => {}
            scalar => {
                let column = column_name(prefix);
                if RESERVED_COLUMNS.contains(&column.as_str()) {
                    debug!("Field {} collides with a reserved column, not flattened", prefix);
                    return;
                }
                leaves.entry(column).or_insert_with(|| scalar.clone());
            }
        }
    }

    let mut leaves = BTreeMap::new();
    for (key, value) in &embedded.chunk.document.fields {
        if *key != embedded.chunk.text_field {
            walk(key, value, &mut leaves);
        }
    }
    leaves
}

fn build_record_batch(chunks: &[EmbeddedChunk], dimension: usize) -> Result<RecordBatch, RagError> {
    let rows: Vec<BTreeMap<String, Value>> = chunks.iter().map(flatten_leaves).collect();

    let mut column_kinds: BTreeMap<&str, Option<LeafKind>> = BTreeMap::new();
    for row in &rows {
        for (column, value) in row {
            let kind = LeafKind::of(value);
            let entry = column_kinds.entry(column.as_str()).or_insert(None);
            *entry = match (*entry, kind) {
                (Some(existing), Some(kind)) => Some(existing.merge(kind)),
                (existing, kind) => existing.or(kind),
            };
        }
    }

    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let mut fields = vec![
        Field::new(CHUNK_ID_COLUMN, DataType::Utf8, false),
        Field::new(DOCUMENT_ID_COLUMN, DataType::Utf8, false),
        Field::new(CHUNK_INDEX_COLUMN, DataType::UInt32, false),
        Field::new(BODY_COLUMN, DataType::Utf8, false),
        Field::new(DOCUMENT_COLUMN, DataType::Utf8, false),
        Field::new(
            EMBEDDING_FIELD,
            DataType::FixedSizeList(Arc::clone(&item_field), dimension as i32),
            false,
        ),
    ];

    let documents = chunks
        .iter()
        .map(|c| serde_json::to_string(&c.chunk.document))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RagError::Database(format!("Failed to serialize document: {}", e)))?;

    let mut flat_values = Vec::with_capacity(chunks.len() * dimension);
    for chunk in chunks {
        flat_values.extend_from_slice(&chunk.embedding);
    }
    let vector_array = FixedSizeListArray::try_new(
        item_field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            chunks.iter().map(|c| c.chunk.id()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            chunks
                .iter()
                .map(|c| c.chunk.document.id.as_str())
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(
            chunks
                .iter()
                .map(|c| c.chunk.chunk_index as u32)
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            chunks.iter().map(|c| c.chunk.text()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(documents)),
        Arc::new(vector_array),
    ];

    for (column, kind) in column_kinds {
        let kind = kind.unwrap_or(LeafKind::Text);
        let array: ArrayRef = match kind {
            LeafKind::Bool => Arc::new(BooleanArray::from(
                rows.iter()
                    .map(|row| row.get(column).and_then(Value::as_bool))
                    .collect::<Vec<_>>(),
            )),
            LeafKind::Number => Arc::new(Float64Array::from(
                rows.iter()
                    .map(|row| row.get(column).and_then(Value::as_f64))
                    .collect::<Vec<_>>(),
            )),
            LeafKind::Text => Arc::new(StringArray::from(
                rows.iter()
                    .map(|row| match row.get(column) {
                        Some(Value::String(s)) => Some(s.clone()),
                        Some(Value::Null) | None => None,
                        Some(other) => Some(other.to_string()),
                    })
                    .collect::<Vec<_>>(),
            )),
        };
        fields.push(Field::new(column, kind.data_type(), true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(
    batch: &RecordBatch,
    index: &VectorIndex,
    projection: &[String],
) -> Result<Vec<SearchResult>, RagError> {
    let chunk_ids = string_column(batch, CHUNK_ID_COLUMN)?;
    let document_ids = string_column(batch, DOCUMENT_ID_COLUMN)?;
    let bodies = string_column(batch, BODY_COLUMN)?;
    let documents = string_column(batch, DOCUMENT_COLUMN)?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| RagError::Database("Missing _distance column".to_string()))?;

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let document: Document = serde_json::from_str(documents.value(row)).map_err(|e| {
            RagError::Database(format!(
                "Stored document for {} is corrupt: {}",
                chunk_ids.value(row),
                e
            ))
        })?;

        let fields = if projection.is_empty() {
            document.fields
        } else {
            projection
                .iter()
                .filter_map(|path| {
                    document
                        .get_path(path)
                        .map(|value| (path.clone(), value.clone()))
                })
                .collect::<Map<String, Value>>()
        };

        let distance = if distances.is_null(row) {
            f32::MAX
        } else {
            distances.value(row)
        };

        results.push(SearchResult {
            chunk_id: chunk_ids.value(row).to_string(),
            document_id: document_ids.value(row).to_string(),
            body: bodies.value(row).to_string(),
            fields,
            score: similarity_score(index.similarity, distance),
        });
    }

    Ok(results)
}
