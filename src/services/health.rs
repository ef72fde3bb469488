//! Health state and probe server
//!
//! Rule owners never see engine failures directly; degraded market data is
//! surfaced here as a "market data delayed" indicator for the web layer, and
//! the probe endpoints feed process supervision.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::services::Metrics;
use crate::window::{ActiveWindowController, WindowStatus};

/// Health status for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Overall system health response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    /// True when quote providers have been failing long enough that cached
    /// prices should be labeled as delayed
    pub market_data_delayed: bool,
    pub consecutive_sync_failures: u32,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub activation: WindowStatus,
    pub metrics: String,
}

/// Shared health state updated by the engine components
pub struct HealthState {
    started_at: DateTime<Utc>,
    degraded: AtomicBool,
    consecutive_sync_failures: AtomicU32,
    last_successful_sync: RwLock<Option<DateTime<Utc>>>,
    db_healthy: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            degraded: AtomicBool::new(false),
            consecutive_sync_failures: AtomicU32::new(0),
            last_successful_sync: RwLock::new(None),
            db_healthy: AtomicBool::new(true),
        }
    }

    pub async fn record_sync_success(&self) {
        self.consecutive_sync_failures.store(0, Ordering::SeqCst);
        self.degraded.store(false, Ordering::SeqCst);
        *self.last_successful_sync.write().await = Some(Utc::now());
    }

    /// Returns the new consecutive failure count
    pub fn record_sync_failure(&self) -> u32 {
        self.consecutive_sync_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn record_db_check(&self, healthy: bool) {
        self.db_healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_sync_failures.load(Ordering::SeqCst)
    }

    async fn status(&self) -> HealthStatus {
        if !self.db_healthy.load(Ordering::SeqCst) {
            return HealthStatus::Unhealthy;
        }
        if self.is_degraded() {
            return HealthStatus::Degraded;
        }
        HealthStatus::Healthy
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

struct ServerState {
    health: Arc<HealthState>,
    metrics: Arc<Metrics>,
    window: Arc<ActiveWindowController>,
}

/// Health check server
pub struct HealthServer {
    state: Arc<ServerState>,
    port: u16,
}

impl HealthServer {
    pub fn new(
        health: Arc<HealthState>,
        metrics: Arc<Metrics>,
        window: Arc<ActiveWindowController>,
        port: u16,
    ) -> Self {
        Self {
            state: Arc::new(ServerState {
                health,
                metrics,
                window,
            }),
            port,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .with_state(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting health server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| EngineError::Internal(format!("Health server error: {e}")))?;

        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.health.status().await;
    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: (Utc::now() - state.health.started_at).num_seconds().max(0) as u64,
        market_data_delayed: state.health.is_degraded(),
        consecutive_sync_failures: state.health.consecutive_failures(),
        last_successful_sync: *state.health.last_successful_sync.read().await,
        activation: state.window.status().await,
        metrics: state.metrics.summary(),
    };
    let code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readiness_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.health.status().await {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}
