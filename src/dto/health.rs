use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

/// Health probe payload returned by the `/healthcheck` route.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    /// Store connectivity ("connected" or "unavailable").
    pub store: String,
    /// Number of live WebSocket connections.
    pub connections: usize,
    /// Seconds since the process started serving.
    pub uptime_secs: u64,
    /// Resident set size in bytes, when procfs exposes it.
    pub memory_bytes: Option<u64>,
}
