//! Health check endpoint.

use crate::server::SyncServer;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use sync_core::{Collection, Scope};

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `ok`, or `degraded` when the store cannot be queried.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of stored notes, if the store answered.
    pub notes: Option<u64>,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(server): Extension<Arc<SyncServer>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let notes = match server.storage().count(&Scope::all()).await {
        Ok(count) => Some(count),
        Err(err) => {
            tracing::warn!(error = %err, "health check could not count notes");
            None
        }
    };

    Json(HealthStatus {
        status: if notes.is_some() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        notes,
        uptime_seconds: uptime,
    })
}
