//! Capability traits for the external embedding model and answer generator.
//!
//! The indexing core never talks to a model directly; it consumes these
//! traits so any backend (local model, HTTP API, test double) can be plugged in.

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;

pub use error::LlmError;
pub use provider::{AnswerGenerator, ContextChunk, Embedder};
