
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::types::Json;
use tracing::{debug, warn};

const VECTOR_INDEX_COLUMNS: &str = "collection, name, vector_field, dimensions, similarity, \
     filter_fields, status, generation, error_message, created_date, updated_date";

pub struct VectorIndexQueries;

impl VectorIndexQueries {
    /// Register a new definition as `pending`, generation 1
    #[inline]
    pub async fn create(
        pool: &SqlitePool,
        collection: &str,
        definition: &IndexDefinition,
    ) -> Result<VectorIndex> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO vector_indexes \
             (collection, name, vector_field, dimensions, similarity, filter_fields, status, generation, created_date, updated_date) \
             VALUES (?, ?, ?, ?, ?, ?, 'pending', 1, ?, ?)",
        )
        .bind(collection)
        .bind(&definition.name)
        .bind(&definition.vector_field)
        .bind(definition.dimensions as i64)
        .bind(definition.similarity)
        .bind(Json(&definition.filter_fields))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create vector index")?;

        Self::get(pool, collection, &definition.name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created vector index"))
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, collection: &str, name: &str) -> Result<Option<VectorIndex>> {
        let index = sqlx::query_as::<_, VectorIndex>(&format!(
            "SELECT {} FROM vector_indexes WHERE collection = ? AND name = ?",
            VECTOR_INDEX_COLUMNS
        ))
        .bind(collection)
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get vector index")?;

        Ok(index)
    }

    #[inline]
    pub async fn list_for_collection(pool: &SqlitePool, collection: &str) -> Result<Vec<VectorIndex>> {
        let indexes = sqlx::query_as::<_, VectorIndex>(&format!(
            "SELECT {} FROM vector_indexes WHERE collection = ? ORDER BY name",
            VECTOR_INDEX_COLUMNS
        ))
        .bind(collection)
        .fetch_all(pool)
        .await
        .context("Failed to list vector indexes")?;

        Ok(indexes)
    }

    /// Replace the definition, bump the generation and return to `pending`
    #[inline]
    pub async fn replace_definition(
        pool: &SqlitePool,
        collection: &str,
        name: &str,
        definition: &IndexDefinition,
    ) -> Result<Option<VectorIndex>> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE vector_indexes \
             SET vector_field = ?, dimensions = ?, similarity = ?, filter_fields = ?, \
                 status = 'pending', generation = generation + 1, error_message = NULL, updated_date = ? \
             WHERE collection = ? AND name = ?",
        )
        .bind(&definition.vector_field)
        .bind(definition.dimensions as i64)
        .bind(definition.similarity)
        .bind(Json(&definition.filter_fields))
        .bind(now)
        .bind(collection)
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to update vector index definition")?;

        if result.rows_affected() == 0 {
            warn!("No vector index {} on collection {} to update", name, collection);
            return Ok(None);
        }

        Self::get(pool, collection, name).await
    }

    /// Send every index of a collection back to `pending` under a new generation
    #[inline]
    pub async fn reset_collection(pool: &SqlitePool, collection: &str) -> Result<Vec<VectorIndex>> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE vector_indexes \
             SET status = 'pending', generation = generation + 1, error_message = NULL, updated_date = ? \
             WHERE collection = ?",
        )
        .bind(now)
        .bind(collection)
        .execute(pool)
        .await
        .context("Failed to reset vector indexes")?;

        debug!(
            "Reset {} vector indexes on collection {}",
            result.rows_affected(),
            collection
        );

        Self::list_for_collection(pool, collection).await
    }

    /// Record a build transition; returns false when `generation` is stale
    #[inline]
    pub async fn set_status(
        pool: &SqlitePool,
        collection: &str,
        name: &str,
        generation: i64,
        status: IndexStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE vector_indexes SET status = ?, error_message = ?, updated_date = ? \
             WHERE collection = ? AND name = ? AND generation = ?",
        )
        .bind(status)
        .bind(error_message)
        .bind(now)
        .bind(collection)
        .bind(name)
        .bind(generation)
        .execute(pool)
        .await
        .context("Failed to update vector index status")?;

        let applied = result.rows_affected() > 0;
        if !applied {
            debug!(
                "Ignored {} transition for {}/{} generation {} (superseded)",
                status, collection, name, generation
            );
        }
        Ok(applied)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, collection: &str, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vector_indexes WHERE collection = ? AND name = ?")
            .bind(collection)
            .bind(name)
            .execute(pool)
            .await
            .context("Failed to delete vector index")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct SessionTurnQueries;

impl SessionTurnQueries {
    #[inline]
    pub async fn append(pool: &SqlitePool, turn: NewSessionTurn) -> Result<SessionTurn> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO session_turns (session_id, role, content, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(&turn.session_id)
        .bind(turn.role)
        .bind(&turn.content)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to append session turn")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve appended session turn"))
    }

    /// Record a question and its answer together; neither is stored if either insert fails
    #[inline]
    pub async fn append_exchange(
        pool: &SqlitePool,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for session exchange")?;

        let now = Utc::now().naive_utc();
        for (role, content) in [(Role::User, question), (Role::Assistant, answer)] {
            sqlx::query(
                "INSERT INTO session_turns (session_id, role, content, created_date) VALUES (?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(role)
            .bind(content)
            .bind(now)
            .execute(&mut *transaction)
            .await
            .with_context(|| format!("Failed to append {} turn", role))?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit session exchange")?;
        Ok(())
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<SessionTurn>> {
        let turn = sqlx::query_as::<_, SessionTurn>(
            "SELECT id, session_id, role, content, created_date FROM session_turns WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session turn")?;

        Ok(turn)
    }

    /// Turns of a session, oldest first; ties broken by insertion order
    #[inline]
    pub async fn list_for_session(pool: &SqlitePool, session_id: &str) -> Result<Vec<SessionTurn>> {
        let turns = sqlx::query_as::<_, SessionTurn>(
            "SELECT id, session_id, role, content, created_date FROM session_turns \
             WHERE session_id = ? ORDER BY created_date ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
        .context("Failed to list session turns")?;

        Ok(turns)
    }

    #[inline]
    pub async fn list_sessions(pool: &SqlitePool) -> Result<Vec<SessionSummary>> {
        let sessions = sqlx::query_as::<_, SessionSummary>(
            "SELECT session_id, COUNT(*) AS turn_count, MAX(created_date) AS last_activity \
             FROM session_turns GROUP BY session_id ORDER BY last_activity DESC, session_id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list sessions")?;

        Ok(sessions)
    }
}
