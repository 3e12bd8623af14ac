//! Keyway authentication server binary.
//!
//! Loads `.env`, reads configuration from the environment and CLI, runs
//! migrations and serves the API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use keyway_api::config::ApiConfig;
use keyway_core::captcha::HCaptchaVerifier;
use keyway_core::oauth::{
    GitHubConfig, GitHubProvider, HandshakeStore, MemoryHandshakeStore, PgHandshakeStore,
};
use keyway_core::users::PgUserRepository;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};

/// Interval between sweeps of expired handshake rows.
const PG_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Where pending OAuth handshakes are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum HandshakeBackend {
    /// Process memory; single-node deployments only.
    Memory,
    /// The `oauth_handshakes` table; safe behind a load balancer.
    Postgres,
}

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "keyway_server", about = "Keyway authentication server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long)]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/keyway"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Handshake store backend.
    #[arg(long, env = "HANDSHAKE_BACKEND", value_enum, default_value_t = HandshakeBackend::Memory)]
    handshake_backend: HandshakeBackend,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,keyway_api=debug,keyway_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    config.database_url = args.database_url;

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        handshake_backend = ?args.handshake_backend,
        captcha = config.captcha.enabled,
        "starting keyway_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    keyway_api::migrate(&pool).await?;

    if config.github.client_id.is_empty() || config.github.client_secret.is_empty() {
        warn!("GitHub OAuth credentials are not configured; delegated login will fail");
    }
    let provider = Arc::new(GitHubProvider::new(GitHubConfig::new(
        &config.github.client_id,
        &config.github.client_secret,
        &config.github.redirect_url,
    ))?);

    let handshake_store: Arc<dyn HandshakeStore> = match args.handshake_backend {
        HandshakeBackend::Memory => {
            let store = Arc::new(MemoryHandshakeStore::new());
            store.spawn_cleanup_task();
            store
        }
        HandshakeBackend::Postgres => {
            let store = Arc::new(PgHandshakeStore::new(pool.clone()));
            let sweeper = Arc::clone(&store);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PG_SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    match sweeper.purge_expired().await {
                        Ok(0) => {}
                        Ok(n) => debug!(removed = n, "purged expired handshakes"),
                        Err(e) => warn!(error = %e, "handshake sweep failed"),
                    }
                }
            });
            store
        }
    };

    let captcha = HCaptchaVerifier::new(config.captcha.clone())?;

    let state = keyway_api::AppState::new(
        config.clone(),
        Arc::new(PgUserRepository::new(pool)),
        handshake_store,
        provider,
        captcha,
    )?;

    let app = keyway_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
