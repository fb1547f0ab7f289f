//! The local-directory encrypt provider (spec §4.8, C8).
//!
//! A read-only mirror of a local directory tree under per-path encryption:
//! every visible api-path is the encrypted-name form of a real path (spec
//! §4.3's `encrypt_path`), and reads decrypt on the fly through C3's range
//! reader with a positioned `std::fs::File` read standing in for the HTTP
//! round trip the remote providers use.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use repertory_common::config::EncryptConfig;
use repertory_common::{meta_keys, ApiError, ApiFile, ApiMetaMap, DirectoryItem, Result};
use repertory_crypto::{decrypt_path, encrypt_path, ChunkKey, ChunkSource, EncryptedRangeReader};
use repertory_meta::MetaStore;

use crate::provider::ItemAddedCallback;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Fetches ciphertext ranges from a local file instead of over HTTP —
/// trivially satisfies `ChunkSource` with a positioned read (spec §4.8).
struct FileChunkSource {
    file: File,
}

impl ChunkSource for FileChunkSource {
    fn fetch(&mut self, range: repertory_common::ByteRange) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(range.begin)).map_err(ApiError::Io)?;
        let mut buf = vec![0u8; range.len() as usize];
        self.file.read_exact(&mut buf).map_err(ApiError::Io)?;
        Ok(buf)
    }
}

pub struct EncryptProvider {
    root: PathBuf,
    key: ChunkKey,
    meta: Arc<MetaStore>,
    online: AtomicBool,
    on_item_added: RwLock<Option<ItemAddedCallback>>,
}

impl EncryptProvider {
    #[must_use]
    pub fn new(config: EncryptConfig, meta: Arc<MetaStore>) -> Result<Self> {
        let (key, _) = repertory_crypto::derive_key(
            &config.encryption_token,
            repertory_crypto::KdfVariant::Legacy,
            None,
        )?;
        Ok(Self {
            root: config.path,
            key,
            meta,
            online: AtomicBool::new(false),
            on_item_added: RwLock::new(None),
        })
    }

    fn notify_added(&self, directory: bool, file: &ApiFile) {
        if let Some(cb) = self.on_item_added.read().unwrap().as_ref() {
            cb(directory, file);
        }
    }

    /// Walks `self.root`, mapping each entry's real name to its encrypted
    /// api-path and registering unseen entries with C4.
    fn scan_directory(&self, real_dir: &Path, api_parent: &str) -> Result<Vec<DirectoryItem>> {
        let mut items = Vec::new();
        let entries = std::fs::read_dir(real_dir).map_err(ApiError::Io)?;
        for entry in entries {
            let entry = entry.map_err(ApiError::Io)?;
            let real_name = entry.file_name().to_string_lossy().into_owned();
            let encrypted_name = encrypt_path(&self.key, repertory_crypto::KdfVariant::Legacy, &real_name)?;
            let api_path = format!("{}/{encrypted_name}", api_parent.trim_end_matches('/'));
            let directory = entry.path().is_dir();
            let size = if directory { 0 } else { entry.metadata().map_err(ApiError::Io)?.len() };

            if self.meta.get_item_meta(&api_path).is_err() {
                let mut meta = ApiMetaMap::new();
                meta.insert(meta_keys::META_SOURCE.to_string(), entry.path().to_string_lossy().into_owned());
                meta.insert(meta_keys::META_SIZE.to_string(), size.to_string());
                if directory {
                    meta = repertory_common::directory_meta(meta);
                }
                let _ = self.meta.set_item_meta(&api_path, meta);

                let file = ApiFile {
                    api_path: api_path.clone(),
                    api_parent: api_parent.to_string(),
                    accessed_date: now_unix(),
                    changed_date: now_unix(),
                    creation_date: now_unix(),
                    modified_date: now_unix(),
                    file_size: size,
                    encryption_token: String::new(),
                    key: String::new(),
                    source_path: entry.path().to_string_lossy().into_owned(),
                };
                self.notify_added(directory, &file);
            }

            items.push(DirectoryItem {
                api_path,
                api_parent: api_parent.to_string(),
                directory,
                size,
                resolved: true,
                meta: ApiMetaMap::new(),
            });
        }
        Ok(items)
    }

    fn real_path_for(&self, api_path: &str) -> Result<PathBuf> {
        if let Ok(meta) = self.meta.get_item_meta(api_path) {
            if let Some(source) = meta.get(meta_keys::META_SOURCE) {
                return Ok(PathBuf::from(source));
            }
        }
        let decrypted = decrypt_path(&self.key, repertory_crypto::KdfVariant::Legacy, api_path.trim_start_matches('/'))?;
        Ok(self.root.join(decrypted))
    }
}

#[async_trait]
impl crate::provider::Provider for EncryptProvider {
    async fn start(&self, on_item_added: ItemAddedCallback) -> Result<()> {
        *self.on_item_added.write().unwrap() = Some(on_item_added);
        self.online.store(self.root.is_dir(), Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn is_rename_supported(&self) -> bool {
        false
    }

    async fn create_directory(&self, _path: &str, _meta: ApiMetaMap) -> Result<()> {
        Err(ApiError::NotImplemented("encrypt provider is read-only".to_string()))
    }

    async fn remove_directory(&self, _path: &str) -> Result<()> {
        Err(ApiError::NotImplemented("encrypt provider is read-only".to_string()))
    }

    async fn remove_file(&self, _path: &str) -> Result<()> {
        Err(ApiError::NotImplemented("encrypt provider is read-only".to_string()))
    }

    async fn rename_file(&self, _from: &str, _to: &str) -> Result<()> {
        Err(ApiError::NotImplemented("encrypt provider does not support rename".to_string()))
    }

    async fn is_file(&self, path: &str) -> Result<bool> {
        Ok(self.real_path_for(path)?.is_file())
    }

    async fn is_directory(&self, path: &str) -> Result<bool> {
        if path == "/" || path.is_empty() {
            return Ok(true);
        }
        Ok(self.real_path_for(path)?.is_dir())
    }

    async fn get_file(&self, path: &str) -> Result<ApiFile> {
        let meta = self.meta.get_item_meta(path)?;
        let real_path = self.real_path_for(path)?;
        let file_size = repertory_crypto::decrypted_size(
            std::fs::metadata(&real_path).map_err(ApiError::Io)?.len(),
            false,
        );
        Ok(ApiFile {
            api_path: path.to_string(),
            api_parent: crate::s3::parent_of(path),
            accessed_date: meta.get(meta_keys::META_ACCESSED).and_then(|v| v.parse().ok()).unwrap_or(0),
            changed_date: meta.get(meta_keys::META_CHANGED).and_then(|v| v.parse().ok()).unwrap_or(0),
            creation_date: meta.get(meta_keys::META_CREATION).and_then(|v| v.parse().ok()).unwrap_or(0),
            modified_date: meta.get(meta_keys::META_MODIFIED).and_then(|v| v.parse().ok()).unwrap_or(0),
            file_size,
            encryption_token: String::new(),
            key: String::new(),
            source_path: real_path.to_string_lossy().into_owned(),
        })
    }

    async fn get_file_list(&self) -> Result<Vec<ApiFile>> {
        let mut files = Vec::new();
        for api_path in self.meta.get_api_path_list()? {
            if let Ok(file) = self.get_file(&api_path).await {
                files.push(file);
            }
        }
        Ok(files)
    }

    async fn get_directory_item_count(&self, path: &str) -> Result<u64> {
        Ok(self.get_directory_items(path).await?.len() as u64)
    }

    async fn get_directory_items(&self, path: &str) -> Result<Vec<DirectoryItem>> {
        let real_dir = if path == "/" || path.is_empty() {
            self.root.clone()
        } else {
            self.real_path_for(path)?
        };
        self.scan_directory(&real_dir, path)
    }

    async fn get_total_drive_space(&self) -> Result<u64> {
        Ok((i64::MAX / 2) as u64)
    }

    async fn get_used_drive_space(&self) -> Result<u64> {
        let items = self.get_directory_items("/").await?;
        Ok(items.iter().map(|i| i.size).sum())
    }

    async fn read_file_bytes(
        &self,
        path: &str,
        size: u64,
        offset: u64,
        _cancel: &repertory_net::CancelToken,
    ) -> Result<Vec<u8>> {
        let real_path = self.real_path_for(path)?;
        let file = File::open(&real_path).map_err(ApiError::Io)?;
        let total_encrypted_size = file.metadata().map_err(ApiError::Io)?.len();
        let source = FileChunkSource { file };
        let mut reader = EncryptedRangeReader::new(source, self.key, total_encrypted_size);
        let mut buf = vec![0u8; size as usize];
        let read = reader.read(&mut buf, offset)?;
        buf.truncate(read);
        Ok(buf)
    }

    async fn upload_file(&self, _path: &str, _source_path: &str, _cancel: &repertory_net::CancelToken) -> Result<()> {
        Err(ApiError::NotImplemented("encrypt provider is read-only".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Arc<MetaStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("meta.db")).unwrap();
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn is_directory_true_for_root() {
        let (_dir, meta) = temp_store();
        let root = tempfile::tempdir().unwrap();
        let config = EncryptConfig { path: root.path().to_path_buf(), encryption_token: "token".to_string() };
        let provider = EncryptProvider::new(config, meta).unwrap();
        assert!(
            <EncryptProvider as crate::provider::Provider>::is_directory(&provider, "/")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn mutations_are_not_implemented() {
        let (_dir, meta) = temp_store();
        let root = tempfile::tempdir().unwrap();
        let config = EncryptConfig { path: root.path().to_path_buf(), encryption_token: "token".to_string() };
        let provider = EncryptProvider::new(config, meta).unwrap();
        assert!(matches!(
            <EncryptProvider as crate::provider::Provider>::remove_file(&provider, "/a").await,
            Err(ApiError::NotImplemented(_))
        ));
    }
}
