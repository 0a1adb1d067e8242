// Rerank module
// Cross-encoder re-ranking of retrieved passages

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_RERANK_MODEL: &str = "mixedbread-ai/mxbai-rerank-xsmall-v1";
pub const DEFAULT_RERANK_URL: &str = "http://localhost:8080";

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// A candidate passage with its relevance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct RankedText {
    pub text: String,
    /// Position of the passage in the candidate list
    pub index: usize,
    pub score: f32,
}

/// Re-orders candidate passages by relevance to a query
///
/// The result holds at most `top_k` members of `candidates`, most relevant
/// first.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: &[String], top_k: usize) -> Result<Vec<RankedText>>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

/// Client for a cross-encoder served behind a `/rerank` endpoint
///
/// Built once and shared; the agent keeps its connection pool between calls.
#[derive(Debug, Clone)]
pub struct HttpReranker {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

impl HttpReranker {
    #[inline]
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid reranker URL: {}", base_url))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: model.to_string(),
            agent,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Reranker for HttpReranker {
    #[inline]
    fn rerank(&self, query: &str, candidates: &[String], top_k: usize) -> Result<Vec<RankedText>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let url = self
            .base_url
            .join("/rerank")
            .context("Failed to build rerank URL")?;

        let request_json = serde_json::to_string(&RerankRequest {
            query,
            texts: candidates,
        })
        .context("Failed to serialize rerank request")?;

        debug!(
            "Re-ranking {} candidates with {} at {}",
            candidates.len(),
            self.model,
            url
        );

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .with_context(|| format!("Rerank request to {} failed", url))?;

        let scores: Vec<RerankScore> =
            serde_json::from_str(&response_text).context("Failed to parse rerank response")?;

        Ok(select_top(candidates, scores, top_k))
    }
}

fn select_top(candidates: &[String], scores: Vec<RerankScore>, top_k: usize) -> Vec<RankedText> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<RankedText> = scores
        .into_iter()
        .filter(|s| {
            if s.index >= candidates.len() {
                warn!("Reranker returned out-of-range index {}", s.index);
                return false;
            }
            seen.insert(s.index)
        })
        .map(|s| RankedText {
            text: candidates[s.index].clone(),
            index: s.index,
            score: s.score,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    ranked.truncate(top_k);
    ranked
}
