use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Build the health probe payload, pinging the store and snapshotting the
/// live-connection count. Purely observational.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store = match state.score_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => "connected",
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                "unavailable"
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            "unavailable"
        }
    };

    HealthResponse {
        status: if store == "connected" { "ok" } else { "degraded" }.to_owned(),
        store: store.to_owned(),
        connections: state.registry().connection_count(),
        uptime_secs: state.uptime().as_secs(),
        memory_bytes: resident_memory_bytes(),
    }
}

/// Resident set size from procfs, absent on platforms without it.
fn resident_memory_bytes() -> Option<u64> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}
