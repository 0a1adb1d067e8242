
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Type};

/// Vector similarity function of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "TEXT", rename_all = "camelCase")]
pub enum Similarity {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl std::fmt::Display for Similarity {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Similarity::Cosine => write!(f, "cosine"),
            Similarity::Euclidean => write!(f, "euclidean"),
            Similarity::DotProduct => write!(f, "dotProduct"),
        }
    }
}

impl FromStr for Similarity {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "cosine" => Ok(Similarity::Cosine),
            "euclidean" | "l2" => Ok(Similarity::Euclidean),
            "dotproduct" | "dot" => Ok(Similarity::DotProduct),
            _ => Err(format!(
                "unknown similarity '{}' (expected cosine, euclidean or dotProduct)",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum IndexStatus {
    Pending,
    Building,
    Ready,
    Failed,
}

impl std::fmt::Display for IndexStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            IndexStatus::Pending => write!(f, "Pending"),
            IndexStatus::Building => write!(f, "Building"),
            IndexStatus::Ready => write!(f, "Ready"),
            IndexStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// User-supplied shape of a vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    /// Document path holding the vector
    pub vector_field: String,
    pub dimensions: usize,
    pub similarity: Similarity,
    /// Dotted document paths that may appear in search filters
    #[serde(default)]
    pub filter_fields: Vec<String>,
}

/// Registered index with its build lifecycle
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VectorIndex {
    pub collection: String,
    pub name: String,
    pub vector_field: String,
    pub dimensions: i64,
    pub similarity: Similarity,
    pub filter_fields: Json<Vec<String>>,
    pub status: IndexStatus,
    pub generation: i64,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

impl VectorIndex {
    #[inline]
    pub fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            name: self.name.clone(),
            vector_field: self.vector_field.clone(),
            dimensions: self.dimensions as usize,
            similarity: self.similarity,
            filter_fields: self.filter_fields.0.clone(),
        }
    }

    #[inline]
    pub fn is_filter_field(&self, path: &str) -> bool {
        self.filter_fields.iter().any(|field| field == path)
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SessionTurn {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSessionTurn {
    pub session_id: String,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: i64,
    pub last_activity: NaiveDateTime,
}
