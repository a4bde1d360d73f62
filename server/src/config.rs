use shared::{Region, SurfaceId, DEFAULT_FLUSH_MINUTES, DEFAULT_IDLE_MINUTES};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings of the canvas server.
///
/// The cooldown is deliberately absent: it lives in the stats document and
/// changes on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub data_file: PathBuf,
    pub flush_interval: Duration,
    pub idle_timeout: Duration,
    pub region: Region,
    /// Surfaces governed from startup
    pub surfaces: Vec<SurfaceId>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            data_file: PathBuf::from("place.json"),
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_MINUTES * 60),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_MINUTES * 60),
            region: Region::default(),
            surfaces: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        let config = ServerConfig::default();
        assert_eq!(config.flush_interval, Duration::from_secs(300));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.region, Region::default());
        assert!(config.surfaces.is_empty());
    }

    #[test]
    fn test_default_bind_addr_parses() {
        let config = ServerConfig::default();
        assert!(config.bind_addr.parse::<std::net::SocketAddr>().is_ok());
    }
}
