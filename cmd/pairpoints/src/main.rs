//! # pairpoints
//!
//! Assembles the server from configuration and compile-time features.
//!
//! `pairpoints issue-token <user-id>` prints a session token for local
//! development instead of starting the server.

use std::sync::Arc;

use anyhow::{bail, Context};
use api_adapters::{router, AppState};
use auth_adapters::JwtSessions;
use configs::{AppConfig, LogFormat};
use domains::{PushGateway, Store};
use services::Services;
use storage_adapters::{LocalBlobStore, LogPushGateway, MemoryDocumentStore};
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use storage_adapters::SqliteDocumentStore;

#[cfg(feature = "push-webhook")]
use storage_adapters::WebhookPushGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = configs::load().context("loading configuration")?;
    init_tracing(&config);

    let sessions = Arc::new(JwtSessions::new(&config.auth.jwt_secret, config.auth.token_ttl_secs));

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        match (command.as_str(), args.next()) {
            ("issue-token", Some(user_id)) => {
                println!("{}", sessions.issue(&user_id)?);
                return Ok(());
            }
            _ => bail!("usage: pairpoints [issue-token <user-id>]"),
        }
    }

    let store = open_store(&config).await?;
    let push = push_gateway(&config)?;
    let services = Services::new(store, push);

    tokio::fs::create_dir_all(&config.blobs.root)
        .await
        .with_context(|| format!("creating blob directory {}", config.blobs.root.display()))?;
    let blobs = Arc::new(LocalBlobStore::new(config.blobs.root.clone(), config.blobs.url_prefix.clone()));

    let app = router(AppState::new(services, sessions, blobs))
        .nest_service(&config.blobs.url_prefix, ServeDir::new(&config.blobs.root));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!(addr = %listener.local_addr()?, env = %config.env, "pairpoints listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("pairpoints stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Store> {
    if config.database.is_memory() {
        warn!("using the in-memory store; all data is lost on exit");
        return Ok(Store::new(Arc::new(MemoryDocumentStore::new())));
    }
    open_sqlite(config).await
}

#[cfg(feature = "db-sqlite")]
async fn open_sqlite(config: &AppConfig) -> anyhow::Result<Store> {
    let sqlite = SqliteDocumentStore::connect(&config.database.url, &config.env)
        .await
        .with_context(|| format!("opening {}", config.database.url))?;
    Ok(Store::new(Arc::new(sqlite)))
}

#[cfg(not(feature = "db-sqlite"))]
async fn open_sqlite(config: &AppConfig) -> anyhow::Result<Store> {
    bail!("database.url {} needs the db-sqlite feature", config.database.url)
}

fn push_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn PushGateway>> {
    match config.push.webhook_url.as_deref() {
        None => Ok(Arc::new(LogPushGateway::default())),
        #[cfg(feature = "push-webhook")]
        Some(url) => {
            info!(url, "push notifications go to webhook");
            Ok(Arc::new(WebhookPushGateway::new(url)?))
        }
        #[cfg(not(feature = "push-webhook"))]
        Some(_) => bail!("push.webhook_url is set but the push-webhook feature is off"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
