
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::tokenizer::{DEFAULT_TOKENIZER, TokenizerCounter};
use crate::RagError;
use crate::corpus::Document;

/// A document copy whose text field holds one segment of the original text
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Source document with the text field overwritten by this segment
    pub document: Document,
    /// Name of the field that was chunked
    pub text_field: String,
    /// The index of this chunk within its document
    pub chunk_index: usize,
    /// Token count of the segment as measured by the chunker
    pub token_count: usize,
}

impl Chunk {
    /// Stable identifier: `<document id>:<chunk index>`
    #[inline]
    pub fn id(&self) -> String {
        format!("{}:{}", self.document.id, self.chunk_index)
    }

    /// The segment text
    #[inline]
    pub fn text(&self) -> &str {
        self.document
            .fields
            .get(&self.text_field)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in tokens
    pub chunk_size: usize,
    /// Maximum number of tokens a chunk repeats from its predecessor
    pub chunk_overlap: usize,
    /// Split points in priority order; character boundary is always tried last
    pub separators: Vec<String>,
    /// `tokenizer.json` path or Hugging Face Hub id of the generation model's
    /// tokenizer; empty selects the built-in estimate
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 30,
            separators: vec!["\n\n".to_string(), "\n".to_string(), " ".to_string()],
            tokenizer: DEFAULT_TOKENIZER.to_string(),
        }
    }
}

/// Measures text length in model tokens
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Word and punctuation based approximation of a BPE tokenizer
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    #[inline]
    fn count(&self, text: &str) -> usize {
        estimate_token_count(text)
    }
}

/// Splits documents into bounded, overlapping chunks
pub struct Chunker {
    config: ChunkingConfig,
    counter: Box<dyn TokenCounter>,
}

impl std::fmt::Debug for Chunker {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Chunker {
    #[inline]
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl Chunker {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            counter: Box::new(HeuristicTokenCounter),
        }
    }

    /// Chunker measuring with the tokenizer named in `config`
    ///
    /// A tokenizer that cannot be loaded falls back to the estimate.
    #[inline]
    pub fn from_config(config: ChunkingConfig) -> Self {
        let source = config.tokenizer.trim().to_string();
        let chunker = Self::new(config);
        if source.is_empty() {
            return chunker;
        }

        match TokenizerCounter::load(&source) {
            Ok(counter) => chunker.with_counter(Box::new(counter)),
            Err(e) => {
                warn!("{:#}; chunk sizes will be estimated", e);
                chunker
            }
        }
    }

    /// Measure chunks with the tokenizer of the target generation model
    #[inline]
    #[must_use]
    pub fn with_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk `document[text_field]`; every other field is carried through unchanged
    #[inline]
    pub fn chunk(&self, document: &Document, text_field: &str) -> Result<Vec<Chunk>, RagError> {
        let text = document.text(text_field)?;
        let segments = self.split_text(text);

        let chunks: Vec<Chunk> = segments
            .into_iter()
            .enumerate()
            .map(|(chunk_index, segment)| Chunk {
                token_count: self.counter.count(&segment),
                document: document.with_text(text_field, segment),
                text_field: text_field.to_string(),
                chunk_index,
            })
            .collect();

        debug!(
            "Chunked document '{}' into {} chunks (avg {} tokens)",
            document.id,
            chunks.len(),
            chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
        );

        Ok(chunks)
    }

    /// Split text into trimmed segments of at most `chunk_size` tokens
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.split_recursive(text, &self.config.separators)
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text wins; an exhausted list means characters
        let position = separators
            .iter()
            .position(|sep| !sep.is_empty() && text.contains(sep.as_str()));
        let (pieces, remaining) = match position {
            Some(i) => (split_keeping_separator(text, &separators[i]), &separators[i + 1..]),
            None => (split_characters(text), &separators[separators.len()..]),
        };
        let at_characters = position.is_none();

        let mut segments = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if self.counter.count(piece) <= self.config.chunk_size || at_characters {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                segments.extend(self.merge_pieces(&fitting));
                fitting.clear();
            }
            segments.extend(self.split_recursive(piece, remaining));
        }

        if !fitting.is_empty() {
            segments.extend(self.merge_pieces(&fitting));
        }

        segments
    }

    /// Greedily pack pieces into chunks, carrying a bounded tail of each chunk into the next
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();

        for &piece in pieces {
            if !window.is_empty() && self.count_joined(&window, Some(piece)) > self.config.chunk_size
            {
                let segment = join(&window, None);
                let trimmed = segment.trim();
                if !trimmed.is_empty() {
                    merged.push(trimmed.to_string());
                }

                while !window.is_empty()
                    && (self.count_joined(&window, None) > self.config.chunk_overlap
                        || self.count_joined(&window, Some(piece)) > self.config.chunk_size)
                {
                    window.pop_front();
                }
            }
            window.push_back(piece);
        }

        let segment = join(&window, None);
        let trimmed = segment.trim();
        if !trimmed.is_empty() {
            merged.push(trimmed.to_string());
        }

        merged
    }

    fn count_joined(&self, window: &VecDeque<&str>, next: Option<&str>) -> usize {
        self.counter.count(&join(window, next))
    }
}

fn join(window: &VecDeque<&str>, next: Option<&str>) -> String {
    let mut joined = String::new();
    for piece in window.iter().copied().chain(next) {
        joined.push_str(piece);
    }
    joined
}

/// Split on `separator`, attaching each separator to the piece that follows it
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn split_characters(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(index, c)| &text[index..index + c.len_utf8()])
        .collect()
}

// BPE encodings rarely pack more characters than this into one token
const MAX_CHARS_PER_TOKEN: usize = 6;

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    let estimate = (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize;

    // Long runs without whitespace (URLs, base64, minified code) are many tokens
    estimate.max(text.chars().count().div_ceil(MAX_CHARS_PER_TOKEN))
}
