//! UDP front end exposing the coordinator to remote hosts

use crate::coordinator::{Interaction, InteractionCoordinator};
use crate::engine::PlacementEngine;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

/// Canvas server: receives interactions and runs the scheduled maintenance.
pub struct Server {
    socket: Arc<UdpSocket>,
    coordinator: Arc<InteractionCoordinator>,
    flush_interval: Duration,
}

impl Server {
    pub async fn new(
        addr: &str,
        coordinator: Arc<InteractionCoordinator>,
        flush_interval: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        Ok(Server {
            socket,
            coordinator,
            flush_interval,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn engine(&self) -> Arc<PlacementEngine> {
        Arc::clone(self.coordinator.engine())
    }

    /// Spawns task that flushes statistics and evicts idle views
    fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.engine();
        let period = self.flush_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let engine = Arc::clone(&engine);
                if let Err(e) = tokio::task::spawn_blocking(move || run_maintenance(&engine)).await {
                    error!("Maintenance task panicked: {}", e);
                }
            }
        })
    }

    /// Spawns task that reloads the statistics document on SIGHUP
    #[cfg(unix)]
    fn spawn_reload_listener(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let engine = self.engine();
        tokio::spawn(async move {
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(hangup) => hangup,
                Err(e) => {
                    warn!("Reload on SIGHUP unavailable: {}", e);
                    return;
                }
            };

            while hangup.recv().await.is_some() {
                let engine = Arc::clone(&engine);
                if let Err(e) = tokio::task::spawn_blocking(move || run_reload(&engine)).await {
                    error!("Reload task panicked: {}", e);
                }
            }
        });
    }

    #[cfg(not(unix))]
    fn spawn_reload_listener(&self) {}

    /// Turns one inbound packet into the reply for its sender, if any
    pub fn handle_packet(coordinator: &InteractionCoordinator, packet: Packet) -> Option<Packet> {
        let interaction = match packet {
            Packet::Probe { surface, pos } => Interaction::Probe { surface, pos },
            Packet::Commit {
                surface,
                user,
                pos,
                facing,
                held,
            } => Interaction::Commit {
                surface,
                user,
                pos,
                facing,
                held,
            },
            Packet::NativePlace { surface, user } => Interaction::NativePlace { surface, user },
            Packet::ActivateSurface { surface } => {
                coordinator.surface_activated(surface);
                return None;
            }
            Packet::StatsQuery { surface, user } => {
                let stats = coordinator.engine().stats(&user, &surface);
                return Some(Packet::Stats {
                    surface,
                    user,
                    stats,
                });
            }
            Packet::Verdict { .. } | Packet::Stats { .. } => {
                warn!("Unexpected reply packet received by server");
                return None;
            }
        };

        let response = coordinator.handle(interaction);
        Some(Packet::Verdict {
            suppress: response.suppress,
            feedback: response.feedback,
        })
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Receives datagrams until Ctrl+C, handling each on its own task.
    ///
    /// Statistics are flushed once more before returning.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_maintenance();
        self.spawn_reload_listener();

        info!("Server started successfully");

        let mut buffer = [0u8; 2048];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    let (len, addr) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            error!("Error receiving packet: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            continue;
                        }
                    };

                    let packet = match deserialize::<Packet>(&buffer[0..len]) {
                        Ok(packet) => packet,
                        Err(_) => {
                            warn!("Failed to deserialize packet from {}", addr);
                            continue;
                        }
                    };

                    let socket = Arc::clone(&self.socket);
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        if let Some(reply) = Self::handle_packet(&coordinator, packet) {
                            if let Err(e) = Self::send_packet_impl(&socket, &reply, addr).await {
                                error!("Failed to send packet to {}: {}", addr, e);
                            }
                        }
                    });
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Best-effort final flush.
    pub fn shutdown(&self) {
        match self.coordinator.engine().flush() {
            Ok(()) => info!("Statistics flushed on shutdown"),
            Err(e) => error!("Shutdown flush failed: {}", e),
        }
    }
}

/// One maintenance cycle: flush every resident view, then evict idle ones.
///
/// Returns the number of evicted views. A failed flush does not stop eviction,
/// since evicted views are kept in the root document until the next flush.
pub fn run_maintenance(engine: &PlacementEngine) -> usize {
    let flushed = engine.flush();
    let evicted = engine.stats_cache().cleanup();
    match flushed {
        Ok(()) => debug!("Maintenance done, {} views evicted", evicted),
        Err(_) => warn!("Maintenance flush failed, {} views evicted", evicted),
    }
    evicted
}

/// Flushes, drops every view and re-reads the statistics document.
pub fn run_reload(engine: &PlacementEngine) -> u64 {
    let wait = engine.reload();
    info!("Reload complete, cooldown is {}s", wait);
    wait
}
