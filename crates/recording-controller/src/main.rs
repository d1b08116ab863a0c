//! Recording Controller
//!
//! Coordinates the lifecycle of meeting-room recordings against an external
//! media engine.
//!
//! # Servers
//!
//! The Recording Controller runs one server:
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize Redis clients (locks, sessions, event bus)
//! 4. Create the media engine HTTP client
//! 5. Assemble the `RecordingCoordinator`
//! 6. Start health HTTP server (liveness, readiness, metrics)
//! 7. Spawn the orphaned-lock and stale-recording reapers
//! 8. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use common::secret::ExposeSecret;
use recording_controller::clients::engine::{HttpMediaEngineClient, MediaEngineClient};
use recording_controller::clients::event_bus::{EventBus, RedisEventBus};
use recording_controller::clients::lock::{LockService, RedisLockService};
use recording_controller::clients::store::{RecordingStore, RedisRecordingStore};
use recording_controller::config::Config;
use recording_controller::coordinator::{CoordinatorConfig, RecordingCoordinator};
use recording_controller::observability::health::{health_router, HealthState};
use recording_controller::observability::metrics::init_metrics_recorder;
use recording_controller::tasks::{
    orphaned_lock_reaper::OrphanedLockReaper, stale_recording_reaper::StaleRecordingReaper,
    Scheduler,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recording_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Recording Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        rc_id = %config.rc_id,
        engine_api_url = %config.engine_api_url,
        health_bind_address = %config.health_bind_address,
        lock_ttl_secs = config.lock_ttl.as_secs(),
        start_timeout_secs = config.start_timeout.as_secs(),
        lock_grace_period_secs = config.lock_grace_period.as_secs(),
        staleness_threshold_secs = config.staleness_threshold.as_secs(),
        reaper_interval_secs = config.reaper_interval.as_secs(),
        reaper_batch_size = config.reaper_batch_size,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Root token for graceful shutdown; every background task gets a child
    let shutdown_token = CancellationToken::new();

    // Initialize Redis clients
    info!("Connecting to Redis...");
    let locks: Arc<dyn LockService> = Arc::new(
        RedisLockService::new(config.redis_url.expose_secret())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect lock service to Redis");
                e
            })?,
    );
    let store: Arc<dyn RecordingStore> = Arc::new(
        RedisRecordingStore::new(config.redis_url.expose_secret())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect recording store to Redis");
                e
            })?,
    );
    let bus: Arc<dyn EventBus> = Arc::new(
        RedisEventBus::new(
            config.redis_url.expose_secret(),
            shutdown_token.child_token(),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect event bus to Redis");
            e
        })?,
    );
    info!("Redis connections established");

    // Media engine HTTP client
    let engine: Arc<dyn MediaEngineClient> = Arc::new(HttpMediaEngineClient::new(
        config.engine_api_url.clone(),
        config.engine_api_key.clone(),
    ));

    // Assemble the coordinator. It is driven by the API layer deployed in
    // front of this service; the handle stays alive for the process
    // lifetime.
    let _coordinator = Arc::new(RecordingCoordinator::new(
        Arc::clone(&engine),
        Arc::clone(&locks),
        Arc::clone(&bus),
        Arc::clone(&store),
        CoordinatorConfig {
            lock_ttl: config.lock_ttl,
            start_timeout: config.start_timeout,
        },
    ));
    info!("Recording coordinator assembled");

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    // This provides liveness/readiness probes and Prometheus /metrics endpoint
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_router = health_router(Arc::clone(&health_state));

    // Add /metrics endpoint served by Prometheus exporter
    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = health_router
        .merge(metrics_router)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %health_addr, "Health server started");

    // Register both reapers with the scheduler
    let mut scheduler = Scheduler::new(shutdown_token.child_token());

    let lock_reaper = Arc::new(OrphanedLockReaper::new(
        Arc::clone(&locks),
        Arc::clone(&engine),
        config.lock_grace_period,
        config.reaper_batch_size,
    ));
    scheduler.schedule("orphaned_locks", config.reaper_interval, move || {
        let reaper = Arc::clone(&lock_reaper);
        async move { reaper.sweep().await }
    });

    let session_reaper = Arc::new(StaleRecordingReaper::new(
        Arc::clone(&store),
        Arc::clone(&engine),
        Arc::clone(&locks),
        config.staleness_threshold,
        config.reaper_batch_size,
    ));
    scheduler.schedule("stale_recordings", config.reaper_interval, move || {
        let reaper = Arc::clone(&session_reaper);
        async move { reaper.sweep().await }
    });
    info!("Reapers started");

    health_state.set_ready();

    // Wait for shutdown signal
    info!("Recording Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    shutdown_token.cancel();

    // Drain the reaper loops, then give the health server time to finish
    scheduler.join().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Recording Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
