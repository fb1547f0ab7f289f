//! Application configuration (spec §8 Scenario 1).
//!
//! The loader, CLI flags, and file watcher are out of scope (spec §1); this
//! module only defines the config tree and its defaults, and the one piece
//! of I/O every caller needs — ensuring the data directory layout exists.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Which backend a mount talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ProviderType {
    #[default]
    Sia,
    S3,
    Encrypt,
}

impl ProviderType {
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Sia | Self::S3)
    }
}

/// S3-specific settings (spec §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Config {
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub url: String,
    /// Use `https://<bucket>.host/key` instead of `https://host/<bucket>/key`.
    pub use_path_style: bool,
    /// Encrypt object names and contents under a user-supplied passphrase.
    pub encryption_token: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            url: String::new(),
            use_path_style: true,
            encryption_token: String::new(),
        }
    }
}

/// Sia renterd-specific settings (spec §4.7).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiaConfig {
    pub bucket: String,
    pub username: String,
    pub password: String,
    pub host_config: HostConfig,
    pub encryption_token: String,
}

impl Default for SiaConfig {
    fn default() -> Self {
        Self {
            bucket: "default".to_string(),
            username: String::new(),
            password: String::new(),
            host_config: HostConfig::default(),
            encryption_token: String::new(),
        }
    }
}

/// Local-directory encrypt-provider settings (spec §4.8).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptConfig {
    pub path: PathBuf,
    pub encryption_token: String,
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            encryption_token: String::new(),
        }
    }
}

/// Remote backend host/port, shared by both the Sia API and the built-in RPC server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub host_name_or_ip: String,
    pub api_port: u16,
    pub agent_string: String,
    pub path: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_name_or_ip: "localhost".to_string(),
            api_port: 9980,
            agent_string: String::new(),
            path: String::new(),
        }
    }
}

/// Root configuration tree for a single mount (spec §8 Scenario 1).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    pub version: u32,
    pub provider: ProviderType,
    pub data_directory: PathBuf,
    pub api_port: u16,
    pub max_upload_count: u32,
    pub ring_buffer_file_size: u32,
    pub retry_read_count: u32,
    pub enable_download_timeout: bool,
    pub download_timeout_secs: u32,
    pub s3: S3Config,
    pub sia: SiaConfig,
    pub encrypt: EncryptConfig,
}

impl AppConfig {
    /// Builds a config for `data_directory` with every other field at its
    /// default, the way a fresh mount with no on-disk config file starts up.
    #[must_use]
    pub fn new(data_directory: PathBuf, provider: ProviderType) -> Self {
        Self {
            provider,
            data_directory,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn cache_directory(&self) -> PathBuf {
        self.data_directory.join("cache")
    }

    #[must_use]
    pub fn logs_directory(&self) -> PathBuf {
        self.data_directory.join("logs")
    }

    #[must_use]
    pub fn meta_db_path(&self) -> PathBuf {
        self.data_directory.join("meta.db")
    }

    /// Creates the data directory and its `cache`/`logs` children if absent
    /// (spec §8 Scenario 1: "the `cache` and `logs` subdirectories
    /// auto-created").
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.data_directory.as_path(),
            self.cache_directory().as_path(),
            self.logs_directory().as_path(),
        ] {
            create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn create_dir_all(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(ApiError::Io)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            provider: ProviderType::default(),
            data_directory: PathBuf::new(),
            api_port: 10_000,
            max_upload_count: 5,
            ring_buffer_file_size: 512,
            retry_read_count: 6,
            enable_download_timeout: true,
            download_timeout_secs: 60,
            s3: S3Config::default(),
            sia: SiaConfig::default(),
            encrypt: EncryptConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fresh_data_directory_scenario() {
        let cfg = AppConfig::new(PathBuf::from("/tmp/unused"), ProviderType::Sia);
        assert_eq!(cfg.api_port, 10_000);
        assert_eq!(cfg.sia.host_config.api_port, 9980);
        assert_eq!(cfg.max_upload_count, 5);
        assert_eq!(cfg.ring_buffer_file_size, 512);
        assert_eq!(cfg.retry_read_count, 6);
    }

    #[test]
    fn ensure_directories_creates_cache_and_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("repertory-data");
        let cfg = AppConfig::new(data_dir.clone(), ProviderType::S3);
        cfg.ensure_directories().unwrap();
        assert!(cfg.cache_directory().is_dir());
        assert!(cfg.logs_directory().is_dir());
        assert!(data_dir.is_dir());
    }

    #[test]
    fn derived_paths_are_relative_to_data_directory() {
        let cfg = AppConfig::new(PathBuf::from("/var/repertory/sia1"), ProviderType::Sia);
        assert_eq!(
            cfg.meta_db_path(),
            PathBuf::from("/var/repertory/sia1/meta.db")
        );
    }
}
