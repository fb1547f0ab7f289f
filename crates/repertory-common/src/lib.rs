//! Repertory Common - shared types, error taxonomy, binary codec and configuration
//!
//! This crate has no knowledge of any particular backend; it is the vocabulary
//! every other crate in the workspace builds on.

pub mod codec;
pub mod config;
pub mod error;
pub mod meta_keys;
pub mod types;

pub use config::AppConfig;
pub use error::{ApiError, Result};
pub use types::{ApiFile, ApiMetaMap, ByteRange, DirectoryItem, HeadObjectResult};
