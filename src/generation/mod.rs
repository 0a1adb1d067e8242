// Generation module
// Chat messages, prompt assembly and the language model clients


pub mod openai;
pub mod prompt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use crate::database::sqlite::models::Role;
use crate::database::sqlite::models::SessionTurn;
pub use openai::{DEFAULT_API_KEY_ENV, DEFAULT_GENERATOR_MODEL, DEFAULT_GENERATOR_URL, ChatClient};
pub use prompt::{build_stateful_prompt, build_stateless_prompt, join_context};

/// Finite, single-pass sequence of answer fragments
pub type TokenStream = Box<dyn Iterator<Item = Result<String>> + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&SessionTurn> for ChatMessage {
    #[inline]
    fn from(turn: &SessionTurn) -> Self {
        Self::new(turn.role, turn.content.clone())
    }
}

/// A language model that answers a conversation
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Complete answer for `messages`
    fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// The same answer delivered fragment by fragment
    fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}

/// Drain a stream into the full answer, stopping at the first error
#[inline]
pub fn collect_stream(stream: TokenStream) -> Result<String> {
    stream.collect()
}
