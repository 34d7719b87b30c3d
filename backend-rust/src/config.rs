use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use transit_types::DEFAULT_CONTROL_PORT;

use crate::route_store::DEFAULT_CACHE_TTL;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both listeners bind to (default 0.0.0.0)
    pub bind_addr: IpAddr,
    /// HTTP / WebSocket port (default 8000)
    pub http_port: u16,
    /// UDP port frames arrive on (default 29789)
    pub udp_port: u16,
    /// Port route-update acknowledgments are sent to (default 29789)
    pub ack_port: u16,
    /// Lifetime of cached stops and station indices (default 24h)
    pub cache_ttl: Duration,
    /// How long a switch probe waits for the display's reply (default 5s)
    pub reply_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: env_or("SCREEN_BIND_ADDR", IpAddr::from([0, 0, 0, 0])),
            http_port: env_or("PORT", 8000),
            udp_port: env_or("SCREEN_UDP_PORT", DEFAULT_CONTROL_PORT),
            ack_port: env_or("SCREEN_ACK_PORT", DEFAULT_CONTROL_PORT),
            cache_ttl: Duration::from_secs(env_or(
                "SCREEN_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )),
            reply_timeout: Duration::from_secs(env_or("SCREEN_REPLY_TIMEOUT_SECS", 5)),
        }
    }
}

/// Unset or unparsable variables fall back to `default`.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
