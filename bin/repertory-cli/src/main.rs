//! Repertory CLI - exercises `AppConfig` loading/printing.
//!
//! Not an admin tool: the real surface for driving a mount is the RPC
//! protocol in `repertory-rpc` (spec §4.9/§4.10). This binary only proves
//! out config load/save/default round trips from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repertory_common::config::{AppConfig, ProviderType};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "repertory-cli")]
#[command(about = "Inspect and generate Repertory configuration")]
#[command(version)]
struct Args {
    /// Log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long, env = "REPERTORY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the default configuration as JSON.
    Show {
        /// Data directory to embed in the generated config.
        #[arg(short, long, default_value = "./repertory-data")]
        data_dir: PathBuf,

        /// Provider type (`s3`, `sia`, `encrypt`).
        #[arg(short, long, default_value = "s3")]
        provider: String,
    },
    /// Validate a config file by loading it and re-printing it.
    Check {
        /// Path to a JSON config file.
        path: PathBuf,
    },
    /// Write the default configuration to a file.
    Init {
        /// Path to write the JSON config file to.
        path: PathBuf,

        /// Data directory to embed in the generated config.
        #[arg(short, long, default_value = "./repertory-data")]
        data_dir: PathBuf,
    },
}

fn parse_provider(raw: &str) -> Result<ProviderType> {
    match raw.to_lowercase().as_str() {
        "s3" => Ok(ProviderType::S3),
        "sia" => Ok(ProviderType::Sia),
        "encrypt" => Ok(ProviderType::Encrypt),
        other => anyhow::bail!("unknown provider '{other}', expected s3/sia/encrypt"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Show { data_dir, provider } => {
            let config = AppConfig::new(data_dir, parse_provider(&provider)?);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Check { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: AppConfig = serde_json::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Init { path, data_dir } => {
            let config = AppConfig::new(data_dir, ProviderType::default());
            let text = serde_json::to_string_pretty(&config)?;
            std::fs::write(&path, text)
                .with_context(|| format!("writing config file {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_provider_accepts_known_names() {
        assert!(matches!(parse_provider("s3").unwrap(), ProviderType::S3));
        assert!(matches!(parse_provider("SIA").unwrap(), ProviderType::Sia));
        assert!(matches!(
            parse_provider("encrypt").unwrap(),
            ProviderType::Encrypt
        ));
    }

    #[test]
    fn parse_provider_rejects_unknown_names() {
        assert!(parse_provider("ftp").is_err());
    }
}
