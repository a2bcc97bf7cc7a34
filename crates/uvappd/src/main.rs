//! uvappd — the app service daemon.
//!
//! Assembles the service from its parts:
//! - Document store (redb)
//! - Id issuer
//! - Entity engine
//! - Artifact URL signer
//! - JSON-RPC API
//!
//! # Usage
//!
//! ```text
//! uvappd serve --config /etc/uvapp/uvappd.toml --listen 0.0.0.0:8080
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use uvapp_api::{ApiState, Service, build_router};
use uvapp_core::{IdIssuer, ServiceConfig};
use uvapp_engine::{Artifacts, Engine};
use uvapp_sign::{S3Signer, S3SignerConfig};
use uvapp_store::DocumentStore;

#[derive(Parser)]
#[command(name = "uvappd", about = "App service daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the RPC API.
    Serve {
        /// TOML configuration file. Defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overriding `[server].listen`.
        #[arg(long)]
        listen: Option<String>,

        /// Data directory, overriding `[server].data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,uvappd=debug,uvapp=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            listen,
            data_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            config.validate()?;
            serve(config).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::from_file(path),
        None => Ok(ServiceConfig::default()),
    }
}

/// Wire the service together from its configuration.
fn assemble(config: &ServiceConfig) -> anyhow::Result<ApiState> {
    std::fs::create_dir_all(&config.server.data_dir)
        .with_context(|| format!("creating data dir {}", config.server.data_dir.display()))?;

    let db_path = config.db_path();
    let store = DocumentStore::open(&db_path)?;
    info!(path = ?db_path, "document store opened");

    let svc = &config.service;
    let issuer = Arc::new(IdIssuer::new(svc.aid, svc.nid)?);
    let engine = Engine::new(store, issuer);

    info!(db = %svc.db, "db init ...");
    engine.ensure_indexes()?;
    info!(db = %svc.db, "db init done");

    let oss = &config.oss;
    let signer = S3Signer::new(S3SignerConfig {
        endpoint: oss.endpoint.clone(),
        bucket: oss.bucket.clone(),
        region: oss.region.clone(),
        access_key_id: oss.access_key_id.clone(),
        secret_access_key: oss.secret_access_key.clone(),
        virtual_host: oss.virtual_host,
    })?;
    let artifacts = Artifacts::new(
        Arc::new(signer),
        svc.base_path.clone(),
        svc.app_max_size,
        svc.expires,
    );
    info!(bucket = %oss.bucket, endpoint = %oss.endpoint, "artifact signer initialized");

    Ok(ApiState::new(
        Service { engine, artifacts },
        Duration::from_secs(config.server.request_timeout_secs),
    ))
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    info!("app service starting");

    let state = assemble(&config)?;
    let router = build_router(state);

    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.listen))?;
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        })
        .await?;

    info!("app service stopped");
    Ok(())
}
