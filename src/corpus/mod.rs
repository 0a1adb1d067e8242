// Corpus module
// Source documents and the loaders that bring them into the pipeline

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::RagError;

pub const DEFAULT_DATASETS_SERVER: &str = "https://datasets-server.huggingface.co";
pub const DEFAULT_DATASET: &str = "mongodb/devcenter-articles";
pub const DEFAULT_SPLIT: &str = "train";
pub const DEFAULT_ROW_LIMIT: usize = 20;

// The rows endpoint refuses pages larger than this
const MAX_PAGE_LENGTH: usize = 100;

/// Immutable source record from the corpus
///
/// Everything except the id is kept as a JSON object so that chunking and
/// filtering can address arbitrary fields (`body`, `metadata.contentType`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "generate_document_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn generate_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Document {
    /// Build a document with a `body` text field and a `metadata` object
    #[inline]
    pub fn new(id: impl Into<String>, body: impl Into<String>, metadata: Value) -> Self {
        let mut fields = Map::new();
        fields.insert("body".to_string(), Value::String(body.into()));
        fields.insert("metadata".to_string(), metadata);
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Read a string field, failing loudly when it is absent or not text
    #[inline]
    pub fn text(&self, field: &str) -> Result<&str, RagError> {
        match self.fields.get(field) {
            Some(Value::String(text)) => Ok(text),
            Some(other) => Err(RagError::MalformedDocument {
                id: self.id.clone(),
                reason: format!("field '{}' is not text (found {})", field, json_kind(other)),
            }),
            None => Err(RagError::MalformedDocument {
                id: self.id.clone(),
                reason: format!("missing text field '{}'", field),
            }),
        }
    }

    /// Resolve a dotted path such as `metadata.contentType`
    #[inline]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Copy of this document with `field` replaced by `text`
    #[inline]
    pub fn with_text(&self, field: &str, text: String) -> Self {
        let mut copy = self.clone();
        copy.fields.insert(field.to_string(), Value::String(text));
        copy
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load documents from a JSON Lines file, one object per line
#[inline]
pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open corpus: {}", path.display()))?;

    let mut documents = Vec::new();
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut document: Document = serde_json::from_str(&line).with_context(|| {
            format!("Invalid document on line {} of {}", line_number + 1, path.display())
        })?;
        if document.id.is_empty() {
            document.id = (line_number + 1).to_string();
        }
        documents.push(document);
    }

    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

#[derive(Debug, Deserialize)]
struct RowsResponse {
    rows: Vec<DatasetRow>,
}

#[derive(Debug, Deserialize)]
struct DatasetRow {
    row_idx: u64,
    row: Map<String, Value>,
}

/// Stream the first `limit` rows of a Hugging Face dataset through the
/// datasets-server `/rows` API
#[inline]
pub fn fetch_dataset_rows(
    base_url: &str,
    dataset: &str,
    split: &str,
    limit: usize,
) -> Result<Vec<Document>> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(60)))
        .build()
        .into();

    let mut documents = Vec::with_capacity(limit);
    while documents.len() < limit {
        let offset = documents.len();
        let length = (limit - offset).min(MAX_PAGE_LENGTH);

        let mut url = Url::parse(base_url)
            .with_context(|| format!("Invalid datasets server URL: {}", base_url))?
            .join("/rows")
            .context("Failed to build rows URL")?;
        url.query_pairs_mut()
            .append_pair("dataset", dataset)
            .append_pair("config", "default")
            .append_pair("split", split)
            .append_pair("offset", &offset.to_string())
            .append_pair("length", &length.to_string());

        debug!("Fetching dataset rows from {}", url);

        let body = agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .with_context(|| format!("Failed to fetch rows of dataset {}", dataset))?;

        let page: RowsResponse =
            serde_json::from_str(&body).context("Failed to parse rows response")?;

        if page.rows.is_empty() {
            break;
        }

        documents.extend(page.rows.into_iter().map(|row| {
            let id = row
                .row
                .get("id")
                .and_then(Value::as_str)
                .map_or_else(|| row.row_idx.to_string(), str::to_string);
            let mut fields = row.row;
            fields.remove("id");
            Document { id, fields }
        }));
    }

    documents.truncate(limit);
    info!(
        "Fetched {} documents from dataset {} ({})",
        documents.len(),
        dataset,
        split
    );
    Ok(documents)
}
