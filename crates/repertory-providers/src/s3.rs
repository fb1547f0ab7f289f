//! The S3-compatible provider (spec §4.6, C6).
//!
//! Grounded on `examples/original_source/src/providers/s3/s3_provider.cpp`
//! for object-name mapping, directory synthesis, and the free/used-space
//! reporting convention (`i64::MAX / 2` for total space); XML listing is
//! parsed with `crate::xml`, SigV4 signing and retries come from
//! `repertory-net`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use repertory_common::config::S3Config;
use repertory_common::{meta_keys, ApiError, ApiFile, ApiMetaMap, DirectoryItem, Result};
use repertory_crypto::{decrypt_path, decrypted_size, ChunkKey, EncryptingReader, KdfVariant};
use repertory_meta::MetaStore;
use repertory_net::{CancelToken, HttpTransport, PutSource, Request, ResolvedHost, SigningCredentials};

use crate::provider::ItemAddedCallback;
use crate::xml::parse_list_bucket_result;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

pub struct S3Provider {
    config: S3Config,
    transport: HttpTransport,
    meta: Arc<MetaStore>,
    encryption_key: Option<ChunkKey>,
    retry_read_count: u32,
    online: AtomicBool,
    on_item_added: RwLock<Option<ItemAddedCallback>>,
}

impl S3Provider {
    #[must_use]
    pub fn new(config: S3Config, meta: Arc<MetaStore>, retry_read_count: u32) -> Self {
        let host = ResolvedHost::from_s3(&config, true);
        let transport = HttpTransport::new(host).with_s3_signing(SigningCredentials {
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            region: config.region.clone(),
            service: "s3".to_string(),
        });
        let encryption_key = if config.encryption_token.is_empty() {
            None
        } else {
            Some(
                repertory_crypto::derive_key(
                    &config.encryption_token,
                    repertory_crypto::KdfVariant::Legacy,
                    None,
                )
                .expect("legacy KDF never fails")
                .0,
            )
        };

        Self {
            config,
            transport,
            meta,
            encryption_key,
            retry_read_count,
            online: AtomicBool::new(false),
            on_item_added: RwLock::new(None),
        }
    }

    fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// Object name for `api_path`: plaintext `api_path` minus leading `/`,
    /// or the stored `META_KEY` when encryption is enabled (spec §4.6
    /// "Object-name mapping").
    fn object_name(&self, api_path: &str, directory: bool) -> Result<String> {
        let trimmed = api_path.trim_start_matches('/');
        let mut name = if self.is_encrypted() {
            match self.meta.get_item_meta_key(api_path, meta_keys::META_KEY) {
                Ok(key) => key,
                Err(ApiError::ItemNotFound | ApiError::XattrNotFound) if trimmed.is_empty() => {
                    String::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            trimmed.to_string()
        };
        if directory && !name.is_empty() && !name.ends_with('/') {
            name.push('/');
        }
        Ok(name)
    }

    /// Recovers the plaintext api-path from a raw S3 object key or common
    /// prefix, decrypting it segment by segment when the bucket is
    /// encrypted (spec §4.6 "Names must be decrypted segment by segment
    /// before being returned to callers.").
    fn decode_object_path(&self, raw_key: &str) -> Result<String> {
        let trimmed = raw_key.trim_end_matches('/');
        let decoded = if self.is_encrypted() {
            decrypt_path(self.encryption_key.as_ref().unwrap(), KdfVariant::Legacy, trimmed)?
        } else {
            trimmed.to_string()
        };
        Ok(format!("/{decoded}"))
    }

    fn notify_added(&self, directory: bool, file: &ApiFile) {
        if let Some(cb) = self.on_item_added.read().unwrap().as_ref() {
            cb(directory, file);
        }
    }

    async fn head_object(&self, object_name: &str) -> Result<Option<repertory_common::HeadObjectResult>> {
        let response = self
            .transport
            .send(
                &Request::Head {
                    relative_path: object_name.to_string(),
                    query: BTreeMap::new(),
                },
                &CancelToken::new(),
            )
            .await?;

        if response.status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status.is_success() {
            return Err(ApiError::CommError(format!(
                "HEAD {object_name} returned {}",
                response.status
            )));
        }

        let content_length = response
            .headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(Some(repertory_common::HeadObjectResult {
            content_length,
            last_modified: now_unix() * 1_000_000_000,
        }))
    }

    /// Walks every prefix of `api_path` that does not already exist in C4,
    /// synthesizing directory entries for each (spec §4.6 "Directory
    /// modeling": `create_path_directories`).
    fn create_path_directories(&self, api_path: &str) {
        let mut parent = String::new();
        for segment in api_path.trim_matches('/').split('/') {
            if segment.is_empty() {
                continue;
            }
            let current = format!("{parent}/{segment}");
            if self.meta.get_item_meta(&current).is_err() {
                let meta = repertory_common::directory_meta(ApiMetaMap::new());
                let _ = self.meta.set_item_meta(&current, meta);
                let file = ApiFile {
                    api_path: current.clone(),
                    api_parent: parent.clone(),
                    accessed_date: now_unix(),
                    changed_date: now_unix(),
                    creation_date: now_unix(),
                    modified_date: now_unix(),
                    file_size: 0,
                    encryption_token: String::new(),
                    key: String::new(),
                    source_path: String::new(),
                };
                self.notify_added(true, &file);
            }
            parent = current;
        }
    }
}

#[async_trait]
impl crate::provider::Provider for S3Provider {
    async fn start(&self, on_item_added: ItemAddedCallback) -> Result<()> {
        *self.on_item_added.write().unwrap() = Some(on_item_added);
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn is_rename_supported(&self) -> bool {
        false
    }

    async fn create_directory(&self, path: &str, meta: ApiMetaMap) -> Result<()> {
        let object_name = self.object_name(path, true)?;
        self.transport
            .send(
                &Request::PutFile {
                    relative_path: object_name,
                    query: BTreeMap::new(),
                    source: PutSource::Empty,
                },
                &CancelToken::new(),
            )
            .await?;
        self.meta
            .set_item_meta(path, repertory_common::directory_meta(meta))
    }

    async fn remove_directory(&self, path: &str) -> Result<()> {
        let object_name = self.object_name(path, true)?;
        let response = self
            .transport
            .send(
                &Request::Delete {
                    relative_path: object_name,
                    query: BTreeMap::new(),
                },
                &CancelToken::new(),
            )
            .await?;
        if !response.status.is_success() && response.status != reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::CommError(format!(
                "DELETE {path} returned {}",
                response.status
            )));
        }
        self.meta.remove_api_path(path)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let object_name = self.object_name(path, false)?;
        let response = self
            .transport
            .send(
                &Request::Delete {
                    relative_path: object_name,
                    query: BTreeMap::new(),
                },
                &CancelToken::new(),
            )
            .await?;
        if !response.status.is_success() && response.status != reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::CommError(format!(
                "DELETE {path} returned {}",
                response.status
            )));
        }
        self.meta.remove_api_path(path)
    }

    async fn rename_file(&self, _from: &str, _to: &str) -> Result<()> {
        Err(ApiError::NotImplemented("S3 provider does not support rename".to_string()))
    }

    async fn is_file(&self, path: &str) -> Result<bool> {
        Ok(self
            .meta
            .get_item_meta(path)
            .map(|meta| !meta_keys::meta_to_bool(meta.get(meta_keys::META_DIRECTORY).map_or("0", String::as_str)))
            .unwrap_or(false))
    }

    async fn is_directory(&self, path: &str) -> Result<bool> {
        if path == "/" || path.is_empty() {
            return Ok(true);
        }
        Ok(self
            .meta
            .get_item_meta(path)
            .map(|meta| meta_keys::meta_to_bool(meta.get(meta_keys::META_DIRECTORY).map_or("0", String::as_str)))
            .unwrap_or(false))
    }

    async fn get_file(&self, path: &str) -> Result<ApiFile> {
        let meta = self.meta.get_item_meta(path)?;
        let raw_size: u64 = meta
            .get(meta_keys::META_SIZE)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let file_size = if self.is_encrypted() {
            decrypted_size(raw_size, false)
        } else {
            raw_size
        };
        Ok(ApiFile {
            api_path: path.to_string(),
            api_parent: parent_of(path),
            accessed_date: meta.get(meta_keys::META_ACCESSED).and_then(|v| v.parse().ok()).unwrap_or(0),
            changed_date: meta.get(meta_keys::META_CHANGED).and_then(|v| v.parse().ok()).unwrap_or(0),
            creation_date: meta.get(meta_keys::META_CREATION).and_then(|v| v.parse().ok()).unwrap_or(0),
            modified_date: meta.get(meta_keys::META_MODIFIED).and_then(|v| v.parse().ok()).unwrap_or(0),
            file_size,
            encryption_token: self.config.encryption_token.clone(),
            key: meta.get(meta_keys::META_KEY).cloned().unwrap_or_default(),
            source_path: meta.get(meta_keys::META_SOURCE).cloned().unwrap_or_default(),
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
        let prefix = self.object_name(path, true)?;
        let mut items = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = BTreeMap::new();
            query.insert("list-type".to_string(), "2".to_string());
            query.insert("delimiter".to_string(), "/".to_string());
            query.insert("prefix".to_string(), prefix.clone());
            if let Some(token) = &continuation_token {
                query.insert("continuation-token".to_string(), token.clone());
            }

            let response = self
                .transport
                .send(
                    &Request::Get { relative_path: String::new(), query, range: None },
                    &CancelToken::new(),
                )
                .await?;
            let body = String::from_utf8_lossy(&response.body).into_owned();
            let page = parse_list_bucket_result(&body)?;

            for common_prefix in &page.common_prefixes {
                if common_prefix.prefix == prefix {
                    continue;
                }
                let api_path = self.decode_object_path(&common_prefix.prefix)?;
                self.create_path_directories(&api_path);
                items.push(DirectoryItem {
                    api_path: api_path.clone(),
                    api_parent: path.to_string(),
                    directory: true,
                    size: 0,
                    resolved: true,
                    meta: self.meta.get_item_meta(&api_path).unwrap_or_default(),
                });
            }

            for content in &page.contents {
                if content.key == prefix || content.key.ends_with('/') {
                    continue;
                }
                let api_path = self.decode_object_path(&content.key)?;
                let size = if self.is_encrypted() {
                    decrypted_size(content.size, false)
                } else {
                    content.size
                };

                if self.meta.get_item_meta(&api_path).is_err() {
                    let mut meta = ApiMetaMap::new();
                    meta.insert(meta_keys::META_SIZE.to_string(), content.size.to_string());
                    let _ = self.meta.set_item_meta(&api_path, meta.clone());
                    let file = ApiFile {
                        api_path: api_path.clone(),
                        api_parent: path.to_string(),
                        accessed_date: now_unix(),
                        changed_date: now_unix(),
                        creation_date: now_unix(),
                        modified_date: now_unix(),
                        file_size: size,
                        encryption_token: self.config.encryption_token.clone(),
                        key: if self.is_encrypted() { content.key.clone() } else { String::new() },
                        source_path: String::new(),
                    };
                    self.notify_added(false, &file);
                }

                items.push(DirectoryItem {
                    api_path: api_path.clone(),
                    api_parent: path.to_string(),
                    directory: false,
                    size,
                    resolved: true,
                    meta: self.meta.get_item_meta(&api_path).unwrap_or_default(),
                });
            }

            if page.is_truncated {
                continuation_token = page.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(items)
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
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let object_name = self.object_name(path, false)?;
        let max_attempts = self.retry_read_count + 1;
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            let mut query = BTreeMap::new();
            query.insert("response-content-type".to_string(), "binary/octet-stream".to_string());
            let response = self
                .transport
                .send(
                    &Request::Get {
                        relative_path: object_name.clone(),
                        query,
                        range: Some((offset, offset + size.saturating_sub(1))),
                    },
                    cancel,
                )
                .await;

            match response {
                Ok(r) if r.status.is_success() => return Ok(r.body.to_vec()),
                Ok(r) => last_err = Some(ApiError::DownloadFailed(format!("status {}", r.status))),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => last_err = Some(e),
            }

            if attempt < max_attempts {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
        Err(last_err.unwrap_or(ApiError::DownloadFailed("exhausted retries".to_string())))
    }

    async fn upload_file(&self, path: &str, source_path: &str, cancel: &CancelToken) -> Result<()> {
        let object_name = self.object_name(path, false)?;
        let source = if let Some(key) = self.encryption_key {
            // `reqwest` reads this to completion before sending (see
            // `repertory_net::request::PutSource::Stream`), so Content-Length
            // comes out correct from the materialized body length without
            // needing the encrypted-size formula here.
            let reader = EncryptingReader::new(std::path::Path::new(source_path), key)?;
            PutSource::Stream(std::sync::Arc::new(std::sync::Mutex::new(reader)))
        } else {
            PutSource::File(source_path.into())
        };

        self.transport
            .send(
                &Request::PutFile { relative_path: object_name, query: BTreeMap::new(), source },
                cancel,
            )
            .await?;
        Ok(())
    }
}

pub(crate) use crate::provider::parent_of;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            bucket: "bucket".to_string(),
            access_key: "AKID".to_string(),
            secret_key: "secret".to_string(),
            region: "us-east-1".to_string(),
            url: "https://s3.amazonaws.com".to_string(),
            use_path_style: true,
            encryption_token: String::new(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, Arc<MetaStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("meta.db")).unwrap();
        (dir, Arc::new(store))
    }

    #[test]
    fn parent_of_computes_directory() {
        assert_eq!(parent_of("/a/b/c.txt"), "/a/b");
        assert_eq!(parent_of("/a.txt"), "/");
    }

    #[tokio::test]
    async fn object_name_uses_plaintext_path_when_unencrypted() {
        let (_dir, meta) = temp_store();
        let provider = S3Provider::new(test_config(), meta, 6);
        assert_eq!(provider.object_name("/a/b.txt", false).unwrap(), "a/b.txt");
        assert_eq!(provider.object_name("/a", true).unwrap(), "a/");
    }

    #[tokio::test]
    async fn is_directory_true_for_root() {
        let (_dir, meta) = temp_store();
        let provider = S3Provider::new(test_config(), meta, 6);
        assert!(
            <S3Provider as crate::provider::Provider>::is_directory(&provider, "/")
                .await
                .unwrap()
        );
    }
}
