use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    IndexDefinition, IndexStatus, NewSessionTurn, SessionSummary, SessionTurn, VectorIndex,
};
use crate::database::sqlite::queries::{SessionTurnQueries, VectorIndexQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite metadata database: vector index registry and session history
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_path).await
    }

    // Vector index registry
    #[inline]
    pub async fn create_vector_index(
        &self,
        collection: &str,
        definition: &IndexDefinition,
    ) -> Result<VectorIndex> {
        VectorIndexQueries::create(&self.pool, collection, definition).await
    }

    #[inline]
    pub async fn get_vector_index(&self, collection: &str, name: &str) -> Result<Option<VectorIndex>> {
        VectorIndexQueries::get(&self.pool, collection, name).await
    }

    #[inline]
    pub async fn list_vector_indexes(&self, collection: &str) -> Result<Vec<VectorIndex>> {
        VectorIndexQueries::list_for_collection(&self.pool, collection).await
    }

    #[inline]
    pub async fn replace_vector_index(
        &self,
        collection: &str,
        name: &str,
        definition: &IndexDefinition,
    ) -> Result<Option<VectorIndex>> {
        VectorIndexQueries::replace_definition(&self.pool, collection, name, definition).await
    }

    #[inline]
    pub async fn reset_vector_indexes(&self, collection: &str) -> Result<Vec<VectorIndex>> {
        VectorIndexQueries::reset_collection(&self.pool, collection).await
    }

    #[inline]
    pub async fn set_vector_index_status(
        &self,
        index: &VectorIndex,
        status: IndexStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        VectorIndexQueries::set_status(
            &self.pool,
            &index.collection,
            &index.name,
            index.generation,
            status,
            error_message,
        )
        .await
    }

    #[inline]
    pub async fn delete_vector_index(&self, collection: &str, name: &str) -> Result<bool> {
        VectorIndexQueries::delete(&self.pool, collection, name).await
    }

    // Session history
    #[inline]
    pub async fn append_session_turn(&self, turn: NewSessionTurn) -> Result<SessionTurn> {
        SessionTurnQueries::append(&self.pool, turn).await
    }

    #[inline]
    pub async fn append_session_exchange(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        SessionTurnQueries::append_exchange(&self.pool, session_id, question, answer).await
    }

    #[inline]
    pub async fn get_session_turns(&self, session_id: &str) -> Result<Vec<SessionTurn>> {
        SessionTurnQueries::list_for_session(&self.pool, session_id).await
    }

    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        SessionTurnQueries::list_sessions(&self.pool).await
    }
}
