//! Stored row shape (spec §4.4), grounded on `meta_db.cpp`'s `meta` table
//! schema: `api_path TEXT PRIMARY KEY, data TEXT, directory INTEGER,
//! pinned INTEGER, source_path TEXT`.

use repertory_common::ApiMetaMap;
use serde::{Deserialize, Serialize};

/// Everything stored for one api-path. `directory`/`pinned`/`source_path`
/// are promoted to dedicated fields (spec's reserved-key promotion); every
/// other `META_*` key lives in `data`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetaRow {
    pub data: ApiMetaMap,
    pub directory: bool,
    pub pinned: bool,
    pub source_path: String,
}

impl MetaRow {
    /// Expands the stored row back into a single flat meta map, with
    /// `META_DIRECTORY`/`META_PINNED`/`META_SOURCE` reinserted (spec §4.4 /
    /// `get_item_meta`).
    #[must_use]
    pub fn to_meta_map(&self) -> ApiMetaMap {
        use repertory_common::meta_keys::{bool_to_meta, META_DIRECTORY, META_PINNED, META_SOURCE};

        let mut meta = self.data.clone();
        meta.insert(META_DIRECTORY.to_string(), bool_to_meta(self.directory).to_string());
        meta.insert(META_PINNED.to_string(), bool_to_meta(self.pinned).to_string());
        meta.insert(META_SOURCE.to_string(), self.source_path.clone());
        meta
    }

    /// Splits a flat meta map back into a [`MetaRow`] (spec §4.4 /
    /// `update_item_meta`): pulls the three promoted keys out of `meta` and
    /// stores the remainder verbatim.
    #[must_use]
    pub fn from_meta_map(mut meta: ApiMetaMap) -> Self {
        use repertory_common::meta_keys::{meta_to_bool, META_DIRECTORY, META_PINNED, META_SOURCE};

        let directory = meta
            .remove(META_DIRECTORY)
            .is_some_and(|v| meta_to_bool(&v));
        let pinned = meta.remove(META_PINNED).is_some_and(|v| meta_to_bool(&v));
        let source_path = meta.remove(META_SOURCE).unwrap_or_default();

        Self {
            data: meta,
            directory,
            pinned,
            source_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_flat_meta_map() {
        let mut meta = ApiMetaMap::new();
        meta.insert("META_DIRECTORY".to_string(), "1".to_string());
        meta.insert("META_PINNED".to_string(), "0".to_string());
        meta.insert("META_SOURCE".to_string(), "/cache/abc".to_string());
        meta.insert("META_SIZE".to_string(), "1024".to_string());

        let row = MetaRow::from_meta_map(meta.clone());
        assert!(row.directory);
        assert!(!row.pinned);
        assert_eq!(row.source_path, "/cache/abc");
        assert_eq!(row.data.get("META_SIZE").map(String::as_str), Some("1024"));

        assert_eq!(row.to_meta_map(), meta);
    }
}
