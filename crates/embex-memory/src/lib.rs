//! Vector persistence and cross-session agent memory.

pub mod error;
pub mod in_memory_store;
pub mod memory;
pub mod sqlite;
pub mod sqlite_vector_store;
pub mod types;
pub mod vector_store;

pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use memory::{MEMORY_COLLECTION, MemoryStore};
pub use sqlite_vector_store::SqliteVectorStore;
pub use types::{MemoryEntry, MemoryId, RecalledMemory};
pub use vector_store::{
    FieldCondition, FieldValue, ScoredVectorPoint, ScrolledPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
