mod config;

use std::net::SocketAddr;

use tracing::info;

use pollchat_api::{AppStateInner, build_router};
use pollchat_auth::TokenCodec;
use pollchat_db::{Database, Store};
use pollchat_gateway::ConnectionConfig;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollchat=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let store = Store::new(db, config.store_timeout);
    let tokens = TokenCodec::with_ttl(&config.jwt_secret, config.token_ttl);
    let connection = ConnectionConfig {
        heartbeat_interval: config.heartbeat_interval,
        ..ConnectionConfig::default()
    };

    let app = build_router(AppStateInner::new(store, tokens, connection));

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Pollchat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
