//! Repertory Meta - the embedded per-path metadata store (spec §4.4, C4).
//!
//! Mirrors filesystem attributes (times, mode, uid/gid, size, encryption
//! key, source-path, pinned flag) for every path the provider has observed,
//! keyed by api_path, with a secondary index for reverse lookup by
//! source_path.

pub mod tables;
pub mod types;
pub mod store;

pub use store::MetaStore;
pub use types::MetaRow;
