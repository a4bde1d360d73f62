//! Per-user placement statistics backed by the durable document
//!
//! The [`StatsCache`] owns two things:
//! - The root [`StatsDocument`] as last loaded from the store. It is the ground
//!   truth for users that are not resident.
//! - An [`ExpiringCache`] of per-user views materialised from that document.
//!
//! Views are written back into the root when they are flushed or evicted, and
//! the root is serialised to the store only by [`StatsCache::flush_all`].
//! Persistence failures never reach the interaction path: a failed load
//! degrades to an empty document and a failed flush is logged and retried on
//! the next cycle.

use crate::cache::{lock, ExpiringCache, Shared};
use crate::error::StoreError;
use crate::store::{DocumentStore, StatsDocument, UserStats};
use log::{debug, error, info, warn};
use shared::UserId;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Mutable handle on one user's counters across all surfaces.
pub type StatsView = Shared<UserStats>;

pub struct StatsCache {
    store: Arc<dyn DocumentStore>,
    root: Arc<RwLock<StatsDocument>>,
    views: ExpiringCache<UserId, UserStats>,
}

impl StatsCache {
    /// Loads the root document, falling back to an empty one on failure.
    pub fn open(store: Arc<dyn DocumentStore>, idle: Duration) -> Self {
        let document = load_or_empty(store.as_ref());
        let root = Arc::new(RwLock::new(document));

        let loader_root = Arc::clone(&root);
        let views = ExpiringCache::new(idle, move |user: &UserId| {
            loader_root
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .user(user)
        });

        Self { store, root, views }
    }

    /// The resident view for `user`, materialised from the root on a miss.
    pub fn get(&self, user: &str) -> StatsView {
        self.views.get(&user.to_string())
    }

    /// Cooldown threshold recorded in the root document.
    pub fn wait_seconds(&self) -> u64 {
        self.read_root().settings.wait_seconds()
    }

    pub fn resident_count(&self) -> usize {
        self.views.len()
    }

    pub fn is_resident(&self, user: &str) -> bool {
        self.views.contains(&user.to_string())
    }

    /// Writes every resident view into the root and saves the root.
    ///
    /// Runs alongside interactions; a view mutated after it was copied is
    /// picked up by the next flush.
    pub fn flush_all(&self) -> Result<(), StoreError> {
        let mut resident = 0usize;
        self.views.for_each(|user, stats| {
            self.write_root().put_user(user, stats);
            resident += 1;
        });

        let snapshot = self.read_root().clone();
        match self.store.save(&snapshot) {
            Ok(()) => {
                debug!(
                    "Flushed stats for {} users ({} resident)",
                    snapshot.users.len(),
                    resident
                );
                Ok(())
            }
            Err(err) => {
                error!("Stats flush failed, will retry next cycle: {}", err);
                Err(err)
            }
        }
    }

    /// Evicts idle views, copying them back into the root first.
    pub fn cleanup(&self) -> usize {
        let evicted = self.views.cleanup(|user, stats| {
            self.write_root().put_user(user, stats);
        });
        if !evicted.is_empty() {
            debug!("Evicted {} idle stats views", evicted.len());
        }
        evicted.len()
    }

    /// Drops every resident view without writing it anywhere.
    pub fn invalidate_all(&self) -> usize {
        self.views.invalidate_all()
    }

    /// Flushes the current root, drops all views and re-reads the store.
    ///
    /// Returns the cooldown threshold of the fresh document. The document is
    /// saved back so a defaulted setting becomes visible in the store.
    pub fn reload(&self) -> u64 {
        if let Err(err) = self.flush_all() {
            warn!("Reloading without a successful flush of the previous document: {}", err);
        }

        let mut document = load_or_empty(self.store.as_ref());
        let wait = document.settings.wait_seconds();
        document.settings.wait = Some(wait);

        let dropped = self.views.invalidate_all_with(|| {
            *self.write_root() = document;
        });
        info!(
            "Reloaded stats document: {} users, wait {}s, {} views dropped",
            self.read_root().users.len(),
            wait,
            dropped
        );

        let snapshot = self.read_root().clone();
        if let Err(err) = self.store.save(&snapshot) {
            error!("Saving reloaded stats document failed: {}", err);
        }
        wait
    }

    /// Counters for a user on one surface as currently seen by the engine.
    pub fn snapshot(&self, user: &str, surface: &str) -> shared::SurfaceStats {
        lock(&self.get(user)).surface(surface)
    }

    fn read_root(&self) -> std::sync::RwLockReadGuard<'_, StatsDocument> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_root(&self) -> std::sync::RwLockWriteGuard<'_, StatsDocument> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_or_empty(store: &dyn DocumentStore) -> StatsDocument {
    match store.load() {
        Ok(document) => document,
        Err(err) => {
            warn!("Stats document unavailable, continuing with empty statistics: {}", err);
            store.create_empty()
        }
    }
}
