//! The provider interface (spec §4.5, C5): the seam each backend implements.
//!
//! The original models this as a virtual-inheritance class hierarchy
//! (`providers/i_provider.hpp` with `s3_provider`/`sia_provider` overriding
//! it). The set of backends is closed and known at compile time, so this is
//! restated as a trait plus an enum-dispatch wrapper instead of `dyn`.

use async_trait::async_trait;
use repertory_common::{ApiFile, ApiMetaMap, DirectoryItem, Result};

use crate::encrypt::EncryptProvider;
use crate::s3::S3Provider;
use crate::sia::SiaProvider;

/// Invoked whenever a provider observes a path it has not recorded in the
/// metadata store before (e.g. while listing), so C4 can be populated
/// lazily instead of requiring an up-front full-tree sync.
pub type ItemAddedCallback = std::sync::Arc<dyn Fn(bool, &ApiFile) + Send + Sync>;

/// Parent api-path of `path` (spec §3 api-path rules): `/` for the root
/// and for any top-level entry.
pub(crate) fn parent_of(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}

/// Everything a backend (S3, Sia, local-encrypt) must implement (spec §4.5).
#[async_trait]
pub trait Provider: Send + Sync {
    // Lifecycle.
    async fn start(&self, on_item_added: ItemAddedCallback) -> Result<()>;
    async fn stop(&self);
    fn is_online(&self) -> bool;
    fn is_read_only(&self) -> bool;
    fn is_rename_supported(&self) -> bool;

    // Namespace.
    async fn create_directory(&self, path: &str, meta: ApiMetaMap) -> Result<()>;
    async fn remove_directory(&self, path: &str) -> Result<()>;
    async fn remove_file(&self, path: &str) -> Result<()>;
    async fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    // Introspection.
    async fn is_file(&self, path: &str) -> Result<bool>;
    async fn is_directory(&self, path: &str) -> Result<bool>;
    async fn get_file(&self, path: &str) -> Result<ApiFile>;
    async fn get_file_list(&self) -> Result<Vec<ApiFile>>;
    async fn get_directory_item_count(&self, path: &str) -> Result<u64>;
    async fn get_directory_items(&self, path: &str) -> Result<Vec<DirectoryItem>>;
    async fn get_total_drive_space(&self) -> Result<u64>;
    async fn get_used_drive_space(&self) -> Result<u64>;

    // Data plane.
    async fn read_file_bytes(
        &self,
        path: &str,
        size: u64,
        offset: u64,
        cancel: &repertory_net::CancelToken,
    ) -> Result<Vec<u8>>;
    async fn upload_file(
        &self,
        path: &str,
        source_path: &str,
        cancel: &repertory_net::CancelToken,
    ) -> Result<()>;
}

/// Enum-dispatch wrapper over the closed set of backends (spec §9's
/// resolution of the "virtual-inheritance providers" Open Question).
pub enum AnyProvider {
    S3(S3Provider),
    Sia(SiaProvider),
    Encrypt(EncryptProvider),
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::S3(p) => p.$method($($arg),*).await,
            Self::Sia(p) => p.$method($($arg),*).await,
            Self::Encrypt(p) => p.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl Provider for AnyProvider {
    async fn start(&self, on_item_added: ItemAddedCallback) -> Result<()> {
        dispatch!(self, start, on_item_added)
    }

    async fn stop(&self) {
        match self {
            Self::S3(p) => p.stop().await,
            Self::Sia(p) => p.stop().await,
            Self::Encrypt(p) => p.stop().await,
        }
    }

    fn is_online(&self) -> bool {
        match self {
            Self::S3(p) => p.is_online(),
            Self::Sia(p) => p.is_online(),
            Self::Encrypt(p) => p.is_online(),
        }
    }

    fn is_read_only(&self) -> bool {
        match self {
            Self::S3(p) => p.is_read_only(),
            Self::Sia(p) => p.is_read_only(),
            Self::Encrypt(p) => p.is_read_only(),
        }
    }

    fn is_rename_supported(&self) -> bool {
        match self {
            Self::S3(p) => p.is_rename_supported(),
            Self::Sia(p) => p.is_rename_supported(),
            Self::Encrypt(p) => p.is_rename_supported(),
        }
    }

    async fn create_directory(&self, path: &str, meta: ApiMetaMap) -> Result<()> {
        dispatch!(self, create_directory, path, meta)
    }

    async fn remove_directory(&self, path: &str) -> Result<()> {
        dispatch!(self, remove_directory, path)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        dispatch!(self, remove_file, path)
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        dispatch!(self, rename_file, from, to)
    }

    async fn is_file(&self, path: &str) -> Result<bool> {
        dispatch!(self, is_file, path)
    }

    async fn is_directory(&self, path: &str) -> Result<bool> {
        dispatch!(self, is_directory, path)
    }

    async fn get_file(&self, path: &str) -> Result<ApiFile> {
        dispatch!(self, get_file, path)
    }

    async fn get_file_list(&self) -> Result<Vec<ApiFile>> {
        dispatch!(self, get_file_list)
    }

    async fn get_directory_item_count(&self, path: &str) -> Result<u64> {
        dispatch!(self, get_directory_item_count, path)
    }

    async fn get_directory_items(&self, path: &str) -> Result<Vec<DirectoryItem>> {
        let parent = parent_of(path);
        let mut items = vec![DirectoryItem::dot(path), DirectoryItem::dot_dot(&parent)];
        items.extend(dispatch!(self, get_directory_items, path)?);
        Ok(items)
    }

    async fn get_total_drive_space(&self) -> Result<u64> {
        dispatch!(self, get_total_drive_space)
    }

    async fn get_used_drive_space(&self) -> Result<u64> {
        dispatch!(self, get_used_drive_space)
    }

    async fn read_file_bytes(
        &self,
        path: &str,
        size: u64,
        offset: u64,
        cancel: &repertory_net::CancelToken,
    ) -> Result<Vec<u8>> {
        dispatch!(self, read_file_bytes, path, size, offset, cancel)
    }

    async fn upload_file(
        &self,
        path: &str,
        source_path: &str,
        cancel: &repertory_net::CancelToken,
    ) -> Result<()> {
        dispatch!(self, upload_file, path, source_path, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::EncryptProvider;
    use repertory_common::config::EncryptConfig;
    use repertory_meta::MetaStore;
    use std::sync::Arc;

    #[test]
    fn parent_of_root_is_root() {
        assert_eq!(parent_of("/"), "/");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
    }

    #[tokio::test]
    async fn listings_start_with_dot_then_dot_dot() {
        let dir = tempfile::tempdir().unwrap();
        let meta_dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(&meta_dir.path().join("meta.db")).unwrap());
        let config = EncryptConfig {
            path: dir.path().to_path_buf(),
            encryption_token: "token".to_string(),
        };
        let provider = AnyProvider::Encrypt(EncryptProvider::new(config, meta).unwrap());

        let items = provider.get_directory_items("/").await.unwrap();
        assert_eq!(items[0].api_path, "/");
        assert!(items[0].directory);
        assert_eq!(items[1].api_path, "/");
        assert!(items[1].directory);
    }
}
