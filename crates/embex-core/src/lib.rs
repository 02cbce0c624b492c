//! Project-level entry point for embex.
//!
//! A [`Project`] binds a directory's configuration, code index, version
//! history and agent memory together and exposes the operations callers
//! use: scan, watch, query, ask, history, memory and status.

pub mod config;
pub mod error;
pub mod project;
pub mod status;

pub use config::{Config, find_project_root};
pub use error::{CoreError, ErrorKind, Result};
pub use project::{AskOutcome, PatternMode, Project};
pub use status::ProjectStatus;
