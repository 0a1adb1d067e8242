// Database module
// SQLite holds index definitions and chat history, LanceDB holds chunks and vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
