//! Score Pulse Back binary entrypoint wiring REST, WebSocket, and storage layers.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::score_store::ScoreStore;
use services::websocket_service;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    // A reachable store is a startup requirement; once serving, losing it
    // only degrades the service until the supervisor reconnects.
    let store = connect_store().await.context("connecting score store")?;
    app_state.install_score_store(store.clone()).await;
    tokio::spawn(run_store_supervisor(app_state.clone(), store));

    // Background eviction of connections that never sent a disconnect.
    tokio::spawn(websocket_service::run_idle_sweep(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

#[cfg(feature = "mongo-store")]
async fn connect_store() -> anyhow::Result<Arc<dyn ScoreStore>> {
    use crate::dao::score_store::mongodb::{MongoConfig, MongoScoreStore};

    let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let db_name = env::var("MONGO_DB").ok();

    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
    let store = MongoScoreStore::connect(config).await?;
    info!("connected to MongoDB score store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongo-store"))]
async fn connect_store() -> anyhow::Result<Arc<dyn ScoreStore>> {
    use crate::dao::score_store::memory::MemoryScoreStore;

    warn!("no persistent store backend compiled in; scores will not survive restarts");
    Ok(Arc::new(MemoryScoreStore::new()))
}

/// Supervises the score store connection by pinging in the background and
/// toggling degraded mode when connectivity changes.
async fn run_store_supervisor(state: SharedState, store: Arc<dyn ScoreStore>) {
    let initial_delay_ms = 1000;
    let mut delay = Duration::from_millis(initial_delay_ms);
    let max_delay = Duration::from_secs(10);

    loop {
        if state.is_degraded().await {
            match store.try_reconnect().await {
                Ok(()) => {
                    // Fresh connection: install it and leave degraded mode.
                    info!("reconnected to score store; leaving degraded mode");
                    state.install_score_store(store.clone()).await;
                    delay = Duration::from_millis(initial_delay_ms);
                }
                Err(err) => {
                    warn!(error = %err, "score store reconnect attempt failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
            continue;
        }

        match store.health_check().await {
            Ok(()) => {
                // Healthy connection: reset the retry backoff and avoid
                // hammering the database with pings.
                delay = Duration::from_millis(initial_delay_ms);
                sleep(Duration::from_secs(5)).await;
            }
            Err(err) => {
                // Existing connection failed: flip to degraded mode and
                // retry with exponential backoff.
                warn!(error = %err, "score store ping failed; entering degraded mode");
                state.clear_score_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
