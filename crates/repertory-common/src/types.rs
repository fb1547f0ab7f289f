//! Core data-model types shared by every provider (spec §3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta_keys;

/// String→string attribute map keyed by the reserved `META_*` names plus any
/// caller-defined keys. A `BTreeMap` keeps JSON/bincode encodings stable,
/// which matters for on-disk compatibility across `repertory-meta` versions.
pub type ApiMetaMap = BTreeMap<String, String>;

/// An inclusive byte range `[begin, end]`. An empty range is never
/// constructed at the HTTP layer (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub begin: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.begin + 1
    }

    #[must_use]
    pub const fn start_chunk(&self, chunk_size: u64) -> u64 {
        self.begin / chunk_size
    }

    #[must_use]
    pub const fn end_chunk(&self, chunk_size: u64) -> u64 {
        self.end / chunk_size
    }
}

/// A file entry as understood by the gateway (spec §3 "Api-file").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiFile {
    pub api_path: String,
    pub api_parent: String,
    pub accessed_date: u64,
    pub changed_date: u64,
    pub creation_date: u64,
    pub modified_date: u64,
    /// Plaintext size, regardless of how the object is stored at rest.
    pub file_size: u64,
    /// Opaque per-file encryption token; empty when encryption is disabled.
    pub encryption_token: String,
    /// Encrypted path for this entry, if the provider uses per-path encryption.
    pub key: String,
    /// Local cache file backing this entry, if any (`META_SOURCE`).
    pub source_path: String,
}

/// A listing entry (spec §3 "Directory-item").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryItem {
    pub api_path: String,
    pub api_parent: String,
    pub directory: bool,
    pub size: u64,
    pub resolved: bool,
    pub meta: ApiMetaMap,
}

impl DirectoryItem {
    /// The synthetic `.` entry every Unix listing begins with.
    #[must_use]
    pub fn dot(api_path: &str) -> Self {
        Self {
            api_path: api_path.to_string(),
            api_parent: api_path.to_string(),
            directory: true,
            size: 0,
            resolved: true,
            meta: ApiMetaMap::new(),
        }
    }

    /// The synthetic `..` entry at listing offset 1.
    #[must_use]
    pub fn dot_dot(parent_api_path: &str) -> Self {
        Self {
            api_path: parent_api_path.to_string(),
            api_parent: parent_api_path.to_string(),
            directory: true,
            size: 0,
            resolved: true,
            meta: ApiMetaMap::new(),
        }
    }
}

/// Result of a HEAD request against a backend object (spec §3).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct HeadObjectResult {
    pub content_length: u64,
    /// Unix nanoseconds, converted from the backend's HTTP-date header.
    pub last_modified: u64,
}

/// Builds a meta map for a freshly created directory: the caller-supplied
/// keys plus `META_DIRECTORY = "1"` (spec §8 "Metadata linkage").
#[must_use]
pub fn directory_meta(mut meta: ApiMetaMap) -> ApiMetaMap {
    meta.insert(
        meta_keys::META_DIRECTORY.to_string(),
        meta_keys::bool_to_meta(true).to_string(),
    );
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_len() {
        let r = ByteRange::new(20_000_000, 21_048_575);
        assert_eq!(r.len(), 1_048_576);
    }

    #[test]
    fn byte_range_chunking() {
        let r = ByteRange::new(20_000_000, 21_048_575);
        let chunk = 8 * 1024 * 1024;
        assert_eq!(r.start_chunk(chunk), 2);
        assert_eq!(r.end_chunk(chunk), 2);
    }

    #[test]
    fn directory_meta_sets_flag() {
        let meta = directory_meta(ApiMetaMap::new());
        assert_eq!(
            meta.get(meta_keys::META_DIRECTORY).map(String::as_str),
            Some("1")
        );
    }
}
