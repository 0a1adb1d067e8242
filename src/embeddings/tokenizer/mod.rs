
use std::path::Path;

use anyhow::{Result, anyhow};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::chunking::{TokenCounter, estimate_token_count};

/// Hugging Face port of the `cl100k_base` encoding used by GPT-4
pub const DEFAULT_TOKENIZER: &str = "Xenova/gpt-4";

/// Token counts from a Hugging Face `tokenizer.json`
pub struct TokenizerCounter {
    source: String,
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for TokenizerCounter {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerCounter")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl TokenizerCounter {
    /// Load from a local `tokenizer.json`, or by Hugging Face Hub model id
    #[inline]
    pub fn load(source: &str) -> Result<Self> {
        let tokenizer = if Path::new(source).is_file() {
            debug!("Loading tokenizer from file {}", source);
            Tokenizer::from_file(source)
        } else {
            debug!("Fetching tokenizer {} from the Hugging Face Hub", source);
            Tokenizer::from_pretrained(source, None)
        }
        .map_err(|e| anyhow!("Failed to load tokenizer {}: {}", source, e))?;

        info!("Using tokenizer {} for chunk budgets", source);
        Ok(Self {
            source: source.to_string(),
            tokenizer,
        })
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl TokenCounter for TokenizerCounter {
    #[inline]
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                debug!("Tokenizer failed, estimating instead: {}", e);
                estimate_token_count(text)
            }
        }
    }
}
