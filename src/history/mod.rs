// History module
// Append-only conversation turns grouped by session

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::RagError;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewSessionTurn;
pub use crate::database::sqlite::models::{Role, SessionSummary, SessionTurn};

/// Session history backed by the metadata database
#[derive(Debug, Clone)]
pub struct HistoryStore {
    database: Database,
}

impl HistoryStore {
    #[inline]
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Record one turn; the timestamp is assigned by the store
    #[inline]
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<SessionTurn, RagError> {
        if session_id.trim().is_empty() {
            return Err(RagError::InvalidQuery(
                "Session id cannot be empty".to_string(),
            ));
        }

        let turn = self
            .database
            .append_session_turn(NewSessionTurn {
                session_id: session_id.to_string(),
                role,
                content: content.to_string(),
            })
            .await
            .map_err(|e| RagError::Database(format!("Failed to append turn: {}", e)))?;

        debug!(
            "Appended {} turn {} to session {}",
            turn.role, turn.id, session_id
        );
        Ok(turn)
    }

    /// Record a user question and the assistant's answer atomically
    #[inline]
    pub async fn append_exchange(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), RagError> {
        if session_id.trim().is_empty() {
            return Err(RagError::InvalidQuery(
                "Session id cannot be empty".to_string(),
            ));
        }

        self.database
            .append_session_exchange(session_id, question, answer)
            .await
            .map_err(|e| RagError::Database(format!("Failed to append exchange: {}", e)))?;

        debug!("Appended exchange to session {}", session_id);
        Ok(())
    }

    /// All turns of a session in chronological order; empty for unknown sessions
    #[inline]
    pub async fn get_session(&self, session_id: &str) -> Result<Vec<SessionTurn>, RagError> {
        self.database
            .get_session_turns(session_id)
            .await
            .map_err(|e| RagError::Database(format!("Failed to load session: {}", e)))
    }

    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RagError> {
        self.database
            .list_sessions()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list sessions: {}", e)))
    }
}
