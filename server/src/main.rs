use clap::Parser;
use log::info;
use server::canvas::MemoryCanvas;
use server::clock::SystemClock;
use server::config::ServerConfig;
use server::coordinator::InteractionCoordinator;
use server::engine::PlacementEngine;
use server::network::Server;
use server::stats::StatsCache;
use server::store::JsonFileStore;
use shared::{CellContent, DEFAULT_FLUSH_MINUTES, DEFAULT_IDLE_MINUTES};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// JSON file holding the statistics document
    #[clap(short, long, default_value = "place.json")]
    data_file: PathBuf,
    /// Minutes between statistics flushes
    #[clap(long, default_value_t = DEFAULT_FLUSH_MINUTES)]
    flush_minutes: u64,
    /// Minutes of inactivity before a user's statistics leave memory
    #[clap(long, default_value_t = DEFAULT_IDLE_MINUTES)]
    idle_minutes: u64,
    /// Surface to govern from startup; may be repeated
    #[clap(short, long = "surface")]
    surfaces: Vec<String>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            data_file: self.data_file,
            flush_interval: Duration::from_secs(self.flush_minutes.max(1) * 60),
            idle_timeout: Duration::from_secs(self.idle_minutes.max(1) * 60),
            surfaces: self.surfaces,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    info!(
        "Starting canvas server: data file {}, flush every {:?}, idle after {:?}",
        config.data_file.display(),
        config.flush_interval,
        config.idle_timeout
    );

    let store = Arc::new(JsonFileStore::new(config.data_file.clone()));
    let stats = Arc::new(StatsCache::open(store, config.idle_timeout));
    let canvas = Arc::new(MemoryCanvas::with_floor(
        config.region,
        CellContent::new("snow"),
    ));
    let engine = Arc::new(PlacementEngine::new(
        config.region,
        stats,
        canvas,
        Arc::new(SystemClock),
    ));
    info!("Cooldown is {}s", engine.reload());

    let coordinator = Arc::new(InteractionCoordinator::new(engine, config.surfaces.clone()));
    let server = Server::new(&config.bind_addr, coordinator, config.flush_interval).await?;
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shared_constants() {
        let config = Args::try_parse_from(["server"]).unwrap().into_config();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.flush_interval, Duration::from_secs(DEFAULT_FLUSH_MINUTES * 60));
        assert_eq!(config.idle_timeout, Duration::from_secs(DEFAULT_IDLE_MINUTES * 60));
        assert!(config.surfaces.is_empty());
    }

    #[test]
    fn test_zero_minutes_are_clamped() {
        let args = Args::try_parse_from(["server", "--idle-minutes", "0", "--flush-minutes", "0"]);
        let config = args.unwrap().into_config();
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.flush_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_repeated_surfaces() {
        let args = Args::try_parse_from(["server", "--surface", "place", "-s", "second"]);
        assert_eq!(args.unwrap().into_config().surfaces, vec!["place", "second"]);
    }
}
