//! `/health` endpoint.

use std::time::Instant;

use exthost_broker::BrokerStats;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs, `"disabled"` once the broker
    /// has shut extensions out.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket channels.
    pub channels: usize,
    /// Registered extension origins.
    pub extensions: usize,
    /// Whether commands are being dispatched.
    pub enabled: bool,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, channels: usize, stats: &BrokerStats) -> HealthResponse {
    HealthResponse {
        status: if stats.enabled { "ok" } else { "disabled" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        channels,
        extensions: stats.extensions,
        enabled: stats.enabled,
    }
}
