//! The metadata store (spec §4.4, C4), grounded operation-for-operation on
//! `examples/original_source/src/providers/meta_db.cpp`.

use std::path::Path;

use redb::{Database, ReadableTable};
use repertory_common::{ApiError, ApiMetaMap, Result};

use crate::tables::{META, SOURCE_PATH_INDEX};
use crate::types::MetaRow;

/// Embedded per-path attribute store backed by `redb`.
pub struct MetaStore {
    db: Database,
}

fn encode(row: &MetaRow) -> Result<Vec<u8>> {
    bincode::serialize(row).map_err(|e| ApiError::Error(format!("meta encode failed: {e}")))
}

fn decode(bytes: &[u8]) -> Result<MetaRow> {
    bincode::deserialize(bytes).map_err(|e| ApiError::Error(format!("meta decode failed: {e}")))
}

fn db_err(e: impl std::fmt::Display) -> ApiError {
    ApiError::Error(format!("metadata store error: {e}"))
}

impl MetaStore {
    /// Opens (creating if absent) the store at `path`, typically
    /// `<data_directory>/meta.db` (spec §8 Scenario 1).
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(db_err)?;

        let wtx = db.begin_write().map_err(db_err)?;
        wtx.open_table(META).map_err(db_err)?;
        wtx.open_table(SOURCE_PATH_INDEX).map_err(db_err)?;
        wtx.commit().map_err(db_err)?;

        Ok(Self { db })
    }

    /// `get_api_path` — reverse lookup by `source_path`.
    pub fn get_api_path(&self, source_path: &str) -> Result<String> {
        let rtx = self.db.begin_read().map_err(db_err)?;
        let table = rtx.open_table(SOURCE_PATH_INDEX).map_err(db_err)?;
        table
            .get(source_path)
            .map_err(db_err)?
            .map(|v| v.value().to_string())
            .ok_or(ApiError::ItemNotFound)
    }

    /// `get_api_path_list` — every known api_path, unordered.
    pub fn get_api_path_list(&self) -> Result<Vec<String>> {
        let rtx = self.db.begin_read().map_err(db_err)?;
        let table = rtx.open_table(META).map_err(db_err)?;
        table
            .iter()
            .map_err(db_err)?
            .map(|entry| entry.map(|(k, _)| k.value().to_string()).map_err(db_err))
            .collect()
    }

    /// `get_item_meta(api_path, meta)` — full meta map for one path.
    pub fn get_item_meta(&self, api_path: &str) -> Result<ApiMetaMap> {
        Ok(self.get_row(api_path)?.to_meta_map())
    }

    /// `get_item_meta(api_path, key, value)` — single key lookup.
    pub fn get_item_meta_key(&self, api_path: &str, key: &str) -> Result<String> {
        self.get_item_meta(api_path)?
            .get(key)
            .cloned()
            .ok_or(ApiError::XattrNotFound)
    }

    /// `get_pinned_files`.
    pub fn get_pinned_files(&self) -> Result<Vec<String>> {
        let rtx = self.db.begin_read().map_err(db_err)?;
        let table = rtx.open_table(META).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            let row = decode(value.value())?;
            if row.pinned {
                out.push(key.value().to_string());
            }
        }
        Ok(out)
    }

    /// `get_total_item_count`.
    pub fn get_total_item_count(&self) -> Result<u64> {
        let rtx = self.db.begin_read().map_err(db_err)?;
        let table = rtx.open_table(META).map_err(db_err)?;
        Ok(table.len().map_err(db_err)?)
    }

    /// `remove_api_path` — unconditional delete, ignored if absent (matches
    /// the original, which logs but does not propagate a not-found error).
    pub fn remove_api_path(&self, api_path: &str) -> Result<()> {
        let wtx = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wtx.open_table(META).map_err(db_err)?;
            if let Some(existing) = table.remove(api_path).map_err(db_err)? {
                let row = decode(existing.value())?;
                if !row.source_path.is_empty() {
                    let mut index = wtx.open_table(SOURCE_PATH_INDEX).map_err(db_err)?;
                    index.remove(row.source_path.as_str()).map_err(db_err)?;
                }
            }
        }
        wtx.commit().map_err(db_err)
    }

    /// `remove_item_meta` — deletes a single key from an existing row.
    pub fn remove_item_meta(&self, api_path: &str, key: &str) -> Result<()> {
        let mut meta = self.get_item_meta(api_path)?;
        meta.remove(key);
        self.update_item_meta(api_path, meta)
    }

    /// `rename_item_meta`. Unlike the original's non-atomic get+delete+insert,
    /// this performs the delete-at-`from` and insert-at-`to` inside a single
    /// `redb::WriteTransaction`, so a concurrent reader observes `from` XOR
    /// `to`, never neither (spec §8 "Rename atomicity").
    pub fn rename_item_meta(&self, from_api_path: &str, to_api_path: &str) -> Result<()> {
        let wtx = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wtx.open_table(META).map_err(db_err)?;
            let existing = table
                .remove(from_api_path)
                .map_err(db_err)?
                .ok_or(ApiError::ItemNotFound)?;
            let row = decode(existing.value())?;
            let encoded = encode(&row)?;
            table.insert(to_api_path, encoded.as_slice()).map_err(db_err)?;

            if !row.source_path.is_empty() {
                let mut index = wtx.open_table(SOURCE_PATH_INDEX).map_err(db_err)?;
                index
                    .insert(row.source_path.as_str(), to_api_path)
                    .map_err(db_err)?;
            }
        }
        wtx.commit().map_err(db_err)
    }

    /// `set_item_meta(api_path, key, value)`.
    pub fn set_item_meta_key(&self, api_path: &str, key: &str, value: &str) -> Result<()> {
        let mut meta = ApiMetaMap::new();
        meta.insert(key.to_string(), value.to_string());
        self.set_item_meta(api_path, meta)
    }

    /// `set_item_meta(api_path, meta)` — merges `meta` into the existing row,
    /// creating it if absent.
    pub fn set_item_meta(&self, api_path: &str, meta: ApiMetaMap) -> Result<()> {
        let mut existing = self.get_item_meta(api_path).unwrap_or_default();
        existing.extend(meta);
        self.update_item_meta(api_path, existing)
    }

    /// `update_item_meta` — replaces the full row for `api_path`.
    pub fn update_item_meta(&self, api_path: &str, meta: ApiMetaMap) -> Result<()> {
        let row = MetaRow::from_meta_map(meta);
        let encoded = encode(&row)?;

        let wtx = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wtx.open_table(META).map_err(db_err)?;

            // Drop a stale source_path index entry if the source_path changed.
            if let Some(previous) = table.get(api_path).map_err(db_err)? {
                let previous_row = decode(previous.value())?;
                if previous_row.source_path != row.source_path && !previous_row.source_path.is_empty() {
                    drop(previous);
                    let mut index = wtx.open_table(SOURCE_PATH_INDEX).map_err(db_err)?;
                    index.remove(previous_row.source_path.as_str()).map_err(db_err)?;
                }
            }

            table.insert(api_path, encoded.as_slice()).map_err(db_err)?;

            if !row.source_path.is_empty() {
                let mut index = wtx.open_table(SOURCE_PATH_INDEX).map_err(db_err)?;
                index.insert(row.source_path.as_str(), api_path).map_err(db_err)?;
            }
        }
        wtx.commit().map_err(db_err)
    }

    fn get_row(&self, api_path: &str) -> Result<MetaRow> {
        let rtx = self.db.begin_read().map_err(db_err)?;
        let table = rtx.open_table(META).map_err(db_err)?;
        let value = table
            .get(api_path)
            .map_err(db_err)?
            .ok_or(ApiError::ItemNotFound)?;
        decode(value.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, MetaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("meta.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn set_and_get_roundtrip() {
        let (_dir, store) = open_temp();
        let mut meta = ApiMetaMap::new();
        meta.insert("META_SIZE".to_string(), "42".to_string());
        meta.insert("META_SOURCE".to_string(), "/cache/a".to_string());
        store.update_item_meta("/a.txt", meta).unwrap();

        let fetched = store.get_item_meta("/a.txt").unwrap();
        assert_eq!(fetched.get("META_SIZE").map(String::as_str), Some("42"));
        assert_eq!(store.get_api_path("/cache/a").unwrap(), "/a.txt");
    }

    #[test]
    fn not_found_for_unknown_path() {
        let (_dir, store) = open_temp();
        assert!(matches!(
            store.get_item_meta("/missing"),
            Err(ApiError::ItemNotFound)
        ));
    }

    #[test]
    fn pinned_files_are_filtered() {
        let (_dir, store) = open_temp();
        let mut meta_a = ApiMetaMap::new();
        meta_a.insert("META_PINNED".to_string(), "1".to_string());
        store.update_item_meta("/a", meta_a).unwrap();
        store.update_item_meta("/b", ApiMetaMap::new()).unwrap();

        let pinned = store.get_pinned_files().unwrap();
        assert_eq!(pinned, vec!["/a".to_string()]);
    }

    #[test]
    fn rename_preserves_meta_and_source_index() {
        let (_dir, store) = open_temp();
        let mut meta = ApiMetaMap::new();
        meta.insert("META_SOURCE".to_string(), "/cache/x".to_string());
        meta.insert("META_SIZE".to_string(), "7".to_string());
        store.update_item_meta("/old", meta).unwrap();

        store.rename_item_meta("/old", "/new").unwrap();

        assert!(matches!(
            store.get_item_meta("/old"),
            Err(ApiError::ItemNotFound)
        ));
        let renamed = store.get_item_meta("/new").unwrap();
        assert_eq!(renamed.get("META_SIZE").map(String::as_str), Some("7"));
        assert_eq!(store.get_api_path("/cache/x").unwrap(), "/new");
    }

    #[test]
    fn rename_missing_source_is_not_found() {
        let (_dir, store) = open_temp();
        assert!(matches!(
            store.rename_item_meta("/nope", "/new"),
            Err(ApiError::ItemNotFound)
        ));
    }

    #[test]
    fn remove_item_meta_key() {
        let (_dir, store) = open_temp();
        let mut meta = ApiMetaMap::new();
        meta.insert("CUSTOM".to_string(), "1".to_string());
        store.update_item_meta("/a", meta).unwrap();
        store.remove_item_meta("/a", "CUSTOM").unwrap();
        assert!(store.get_item_meta("/a").unwrap().get("CUSTOM").is_none());
    }

    #[test]
    fn total_item_count_tracks_inserts_and_removals() {
        let (_dir, store) = open_temp();
        store.update_item_meta("/a", ApiMetaMap::new()).unwrap();
        store.update_item_meta("/b", ApiMetaMap::new()).unwrap();
        assert_eq!(store.get_total_item_count().unwrap(), 2);
        store.remove_api_path("/a").unwrap();
        assert_eq!(store.get_total_item_count().unwrap(), 1);
    }
}
