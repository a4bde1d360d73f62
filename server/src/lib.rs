//! # Canvas Server Library
//!
//! Server side of a shared, bounded canvas. Many users place one cell at a
//! time on a fixed region, each subject to a per-user cooldown, while the
//! server keeps cumulative per-user statistics in a durable document.
//!
//! ## Core Responsibilities
//!
//! ### Placement Decisions
//! The [`engine`] decides, for every commit attempt, whether it is off the
//! canvas, still cooling down, or allowed. Allowed attempts write the cell and
//! update the actor's counters while holding the actor's statistics lock, so
//! concurrent attempts by one user cannot both slip through the cooldown.
//!
//! ### Statistics
//! The [`stats`] cache materialises per-user views from the root document on
//! first use, drops them after an idle window and writes them back on flush.
//! The root document lives in a [`store::DocumentStore`]; failures there are
//! logged and never reach the interacting user.
//!
//! ### Interaction Handling
//! The [`coordinator`] owns the set of governed surfaces and turns host
//! events into engine calls plus a verdict: suppress the host's native
//! behaviour, and what feedback to show.
//!
//! ## Module Organization
//!
//! ### Cache Module (`cache`)
//! Generic loading cache with access-based expiry, independent of what it holds.
//!
//! ### Canvas Module (`canvas`)
//! The physical surface trait and an in-memory implementation.
//!
//! ### Clock Module (`clock`)
//! Wall-clock source for cooldowns; a manual clock for tests and simulations.
//!
//! ### Network Module (`network`)
//! UDP front end, scheduled flush and cleanup, reload on SIGHUP and the
//! final flush on shutdown.
//!
//! ## Scheduling
//!
//! Every datagram is handled on its own task. Durable I/O happens only on the
//! periodic maintenance task, on reload and at shutdown; the interaction path
//! touches memory only.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::canvas::MemoryCanvas;
//! use server::clock::SystemClock;
//! use server::coordinator::InteractionCoordinator;
//! use server::engine::PlacementEngine;
//! use server::network::Server;
//! use server::stats::StatsCache;
//! use server::store::JsonFileStore;
//! use shared::Region;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stats = Arc::new(StatsCache::open(
//!         Arc::new(JsonFileStore::new("place.json")),
//!         Duration::from_secs(5 * 60),
//!     ));
//!     let engine = Arc::new(PlacementEngine::new(
//!         Region::default(),
//!         stats,
//!         Arc::new(MemoryCanvas::new()),
//!         Arc::new(SystemClock),
//!     ));
//!     let coordinator = Arc::new(InteractionCoordinator::new(engine, vec!["place".to_string()]));
//!
//!     let server = Server::new("127.0.0.1:8080", coordinator, Duration::from_secs(5 * 60)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod canvas;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod network;
pub mod stats;
pub mod store;
