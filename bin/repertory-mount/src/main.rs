//! Repertory Mount - process entry point for a single mount.
//!
//! Loads `AppConfig`, builds the selected provider, starts it, and
//! optionally brings up the RPC server so a remote process can drive the
//! same provider surface (spec §4.9-§4.10, C12).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use repertory_common::config::{AppConfig, ProviderType};
use repertory_common::{ApiError, ApiFile};
use repertory_meta::MetaStore;
use repertory_providers::{AnyProvider, EncryptProvider, Provider, S3Provider, SiaProvider};
use repertory_rpc::{ClosedCallback, MessageHandler, PacketServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "repertory-mount")]
#[command(about = "Mount a remote object store (or local encrypted directory) as a filesystem")]
#[command(version)]
struct Args {
    /// JSON config file; defaults are used for any field it omits.
    #[arg(short, long, env = "REPERTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding `meta.db`, `cache/`, and `logs/`.
    #[arg(short, long, env = "REPERTORY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Which backend to mount: `s3`, `sia`, or `encrypt`.
    #[arg(short, long, env = "REPERTORY_PROVIDER")]
    provider: Option<String>,

    /// Start the RPC server so a remote client can drive this mount.
    #[arg(long, env = "REPERTORY_ENABLE_RPC", default_value_t = false)]
    enable_rpc: bool,

    /// Shared token the RPC server/clients encrypt messages with.
    #[arg(long, env = "REPERTORY_RPC_TOKEN", default_value = "")]
    rpc_token: String,

    /// Log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long, env = "REPERTORY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./repertory-data"));

    let mut config = match &args.config {
        Some(path) if path.exists() => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?
        }
        _ => AppConfig::new(data_dir.clone(), ProviderType::default()),
    };

    if args.data_dir.is_some() {
        config.data_directory = data_dir;
    }
    if let Some(provider) = &args.provider {
        config.provider = match provider.to_lowercase().as_str() {
            "s3" => ProviderType::S3,
            "sia" => ProviderType::Sia,
            "encrypt" => ProviderType::Encrypt,
            other => anyhow::bail!("unknown provider '{other}', expected s3/sia/encrypt"),
        };
    }

    Ok(config)
}

fn build_provider(config: &AppConfig, meta: Arc<MetaStore>) -> Result<AnyProvider> {
    Ok(match config.provider {
        ProviderType::S3 => AnyProvider::S3(S3Provider::new(
            config.s3.clone(),
            meta,
            config.retry_read_count,
        )),
        ProviderType::Sia => AnyProvider::Sia(SiaProvider::new(
            config.sia.clone(),
            meta,
            config.retry_read_count,
        )),
        ProviderType::Encrypt => {
            AnyProvider::Encrypt(EncryptProvider::new(config.encrypt.clone(), meta)?)
        }
    })
}

/// Placeholder message handler until a driver-facing RPC method table
/// exists; every call reports not-implemented rather than silently no-op.
fn rpc_handler(provider: Arc<AnyProvider>) -> MessageHandler {
    Arc::new(move |_service_flags, _client_id, _thread_id, method, _args| {
        let _ = &provider;
        Box::pin(async move { (ApiError::NotImplemented(method).errno(), Vec::new()) })
            as std::pin::Pin<Box<dyn std::future::Future<Output = (i32, Vec<u8>)> + Send>>
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;
    config
        .ensure_directories()
        .context("creating data/cache/logs directories")?;

    info!(provider = ?config.provider, data_dir = %config.data_directory.display(), "starting repertory-mount");

    let meta = Arc::new(MetaStore::open(&config.meta_db_path()).context("opening metadata store")?);
    let provider = Arc::new(build_provider(&config, meta)?);

    let on_item_added: repertory_providers::ItemAddedCallback = Arc::new(|is_dir: bool, file: &ApiFile| {
        tracing::trace!(path = %file.api_path, is_dir, "provider observed new item");
    });
    provider.start(on_item_added).await.context("starting provider")?;
    info!(online = provider.is_online(), "provider started");

    let rpc_server = if args.enable_rpc {
        let handler = rpc_handler(provider.clone());
        let closed: ClosedCallback = Arc::new(|client_id: &str| {
            info!(client_id, "rpc client disconnected");
        });
        let server = PacketServer::bind(config.api_port, args.rpc_token.clone(), handler, closed)
            .await
            .context("binding rpc server")?;
        info!(addr = %server.local_addr(), "rpc server listening");
        Some(server)
    } else {
        None
    };

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");

    provider.stop().await;
    if let Some(server) = rpc_server {
        server.shutdown().await;
    }

    Ok(())
}
