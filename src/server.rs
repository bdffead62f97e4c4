//! Lifecycle controller.
//!
//! LIFECYCLE
//! =========
//! `Starting`: connect Postgres, then Redis. Either failing aborts startup
//! before the port is bound; there is no retry and no degraded mode.
//! Build the verifier, rate limiter and the frozen realtime registry, bind,
//! then `Ready`.
//!
//! `ShuttingDown`: SIGINT and SIGTERM are treated the same. The listener
//! stops accepting, open sockets get a close frame, in-flight requests
//! finish. A drain that outlives the grace period is cut off.
//!
//! `Stopped`: the serve loop has returned; the caller exits.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use crate::cache::{self, CacheError};
use crate::config::{Config, RateLimitBackend};
use crate::db::{self, DbError};
use crate::middleware::rate_limit::{self, MemoryStore, RateLimitStore, RateLimiter, RedisStore, SystemClock};
use crate::realtime::handlers::setup_socket_handlers;
use crate::realtime::{Hub, RegistryBuilder};
use crate::routes;
use crate::services::auth::{PgSessionVerifier, TokenVerifier};
use crate::state::AppState;

/// How often idle rate-limit keys are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Ready,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database: {0}")]
    Database(#[from] DbError),
    #[error("redis: {0}")]
    Cache(#[from] CacheError),
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Run the server until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if a dependency is unreachable, the port cannot be
/// bound, or the serve loop fails.
pub async fn run(config: Config) -> Result<(), StartupError> {
    let (lifecycle, _) = watch::channel(LifecycleState::Starting);
    run_with(config, lifecycle, shutdown_signal()).await
}

/// `run` with the lifecycle channel and the shutdown trigger supplied by
/// the caller.
pub async fn run_with<F>(
    config: Config,
    lifecycle: watch::Sender<LifecycleState>,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    lifecycle.send_replace(LifecycleState::Starting);
    info!(environment = %config.environment, "starting modelverse");

    let pool = db::init_pool(&config.database_url, config.db_max_connections, config.connect_timeout).await?;
    info!("database connected");

    let cache = cache::connect(&config.redis_url, config.connect_timeout).await?;
    info!("redis connected");

    let verifier: Arc<dyn TokenVerifier> = Arc::new(PgSessionVerifier::new(pool.clone(), Some(cache.clone())));
    let store: Arc<dyn RateLimitStore> = match config.rate_limit_backend {
        RateLimitBackend::Memory => Arc::new(MemoryStore::new()),
        RateLimitBackend::Redis => Arc::new(RedisStore::new(cache)),
    };
    let limiter = RateLimiter::new(store, Arc::new(SystemClock), config.rate_limit_max, config.rate_limit_window);
    let sweeper = rate_limit::spawn_sweeper(limiter.clone(), SWEEP_INTERVAL);

    let registry = Arc::new(setup_socket_handlers(RegistryBuilder::new()).build());
    info!(events = ?registry.events(), "realtime handlers registered");

    let port = config.port;
    let grace = config.shutdown_grace;
    let state = AppState::new(config, pool.clone(), verifier, limiter);
    let hub = state.realtime.clone();
    let app = routes::app(state, registry);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|source| StartupError::Bind { port, source })?;

    info!("server running on port {port}");
    info!("API documentation: http://localhost:{port}/api/docs");
    info!("health check: http://localhost:{port}/health");

    let result = serve(listener, app, shutdown, grace, hub, lifecycle).await;

    sweeper.abort();
    pool.close().await;
    info!("process terminated");
    result
}

/// Serve `app` on `listener` until `shutdown` resolves, then drain for at
/// most `grace`.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
    hub: Hub,
    lifecycle: watch::Sender<LifecycleState>,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let lifecycle = Arc::new(lifecycle);
    lifecycle.send_replace(LifecycleState::Ready);

    let (drain_started_tx, drain_started_rx) = oneshot::channel::<()>();
    let signal = {
        let lifecycle = lifecycle.clone();
        async move {
            shutdown.await;
            lifecycle.send_replace(LifecycleState::ShuttingDown);
            info!(?grace, "shutting down gracefully");
            hub.close_all().await;
            let _ = drain_started_tx.send(());
        }
    };

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(signal)
        .into_future();

    let deadline = async move {
        match drain_started_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            // Serve loop ended without a signal; let it report.
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let result = tokio::select! {
        res = server => res.map_err(StartupError::Serve),
        () = deadline => {
            warn!(?grace, "grace period expired, dropping remaining connections");
            Ok(())
        }
    };

    lifecycle.send_replace(LifecycleState::Stopped);
    result
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("SIGINT received"),
        () = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
