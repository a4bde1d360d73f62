//! Rate-limited placement decisions
//!
//! A placement attempt goes through these stages, stopping at the first
//! rejection:
//! 1. Resolve the target cell. A probed cell inside the region is replaced in
//!    place; otherwise the neighbour on the facing side is filled if it lies
//!    inside the region. Anything else is not on the canvas.
//! 2. Look up the actor's statistics view.
//! 3. Reject while fewer than `wait` whole seconds have passed since the
//!    actor's last commit on this surface.
//! 4. Write the cell and update timestamp and counter.
//!
//! Stages 3 and 4 run under the actor's view lock, so two concurrent attempts
//! by the same user can never both pass the cooldown.

use crate::cache::lock;
use crate::canvas::Canvas;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::stats::StatsCache;
use log::{debug, warn};
use shared::{CellContent, CellPos, Facing, Region, SurfaceStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which counter a commit increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    /// Content put into a fresh cell next to the probed one
    Placement,
    /// Content written over the probed cell itself
    Replacement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Neither the probed cell nor its neighbour is on the canvas.
    OutOfBounds,
    /// Cooldown still running; nothing was changed.
    RateLimited { remaining_seconds: u64 },
    Committed {
        kind: PlacementKind,
        pos: CellPos,
        /// The target held content before this write.
        overwrote: bool,
    },
}

pub struct PlacementEngine {
    region: Region,
    stats: Arc<StatsCache>,
    canvas: Arc<dyn Canvas>,
    clock: Arc<dyn Clock>,
    wait_seconds: AtomicU64,
}

impl PlacementEngine {
    pub fn new(
        region: Region,
        stats: Arc<StatsCache>,
        canvas: Arc<dyn Canvas>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let wait_seconds = AtomicU64::new(stats.wait_seconds());
        Self {
            region,
            stats,
            canvas,
            clock,
            wait_seconds,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn stats_cache(&self) -> &Arc<StatsCache> {
        &self.stats
    }

    pub fn wait_seconds(&self) -> u64 {
        self.wait_seconds.load(Ordering::Relaxed)
    }

    /// Picks the cell an interaction at `probed` would write, and how.
    pub fn resolve_target(&self, probed: CellPos, facing: Facing) -> Option<(CellPos, PlacementKind)> {
        if self.region.contains(probed) {
            return Some((probed, PlacementKind::Replacement));
        }

        let adjacent = probed.offset(facing);
        if self.region.contains(adjacent) {
            return Some((adjacent, PlacementKind::Placement));
        }

        None
    }

    /// Runs one placement attempt by `user` on `surface`.
    pub fn attempt(
        &self,
        surface: &str,
        user: &str,
        probed: CellPos,
        facing: Facing,
        content: CellContent,
    ) -> PlacementOutcome {
        let Some((pos, kind)) = self.resolve_target(probed, facing) else {
            return PlacementOutcome::OutOfBounds;
        };

        let view = self.stats.get(user);
        let mut stats = lock(&view);

        let now = self.clock.now_millis();
        let last = stats.timestamp(surface);
        let wait = self.wait_seconds();

        if now < last {
            warn!(
                "Clock is behind last action of {} on {} ({} < {})",
                user, surface, now, last
            );
        }

        if let Some(remaining_seconds) = remaining_cooldown(last, now, wait) {
            debug!(
                "Rate limited {} on {}: {}s remaining",
                user, surface, remaining_seconds
            );
            return PlacementOutcome::RateLimited { remaining_seconds };
        }

        let overwrote = self.canvas.cell(surface, pos).is_some();
        self.canvas.set_cell(surface, pos, content);

        stats.set_timestamp(surface, now);
        match kind {
            PlacementKind::Placement => stats.inc_placements(surface),
            PlacementKind::Replacement => stats.inc_replacements(surface),
        }

        debug!("{} committed {:?} at {:?} on {}", user, kind, pos, surface);
        PlacementOutcome::Committed {
            kind,
            pos,
            overwrote,
        }
    }

    /// Current counters of `user` on `surface`.
    pub fn stats(&self, user: &str, surface: &str) -> SurfaceStats {
        self.stats.snapshot(user, surface)
    }

    /// Saves all resident statistics.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.stats.flush_all()
    }

    /// Reloads the statistics document and adopts its cooldown.
    pub fn reload(&self) -> u64 {
        let wait = self.stats.reload();
        self.wait_seconds.store(wait, Ordering::Relaxed);
        wait
    }
}

/// Seconds left before another commit is allowed, if any.
///
/// Elapsed time is truncated to whole seconds; a clock that moved backwards
/// counts as no time elapsed.
pub fn remaining_cooldown(last_millis: i64, now_millis: i64, wait_seconds: u64) -> Option<u64> {
    let elapsed_millis = now_millis.saturating_sub(last_millis).max(0);
    let elapsed_seconds = (elapsed_millis / 1000) as u64;

    if elapsed_seconds < wait_seconds {
        Some(wait_seconds - elapsed_seconds)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::time::Duration;

    const SURFACE: &str = "canvas";

    struct Fixture {
        engine: PlacementEngine,
        canvas: Arc<MemoryCanvas>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let stats = Arc::new(StatsCache::open(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(300),
        ));
        let canvas = Arc::new(MemoryCanvas::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let engine = PlacementEngine::new(
            Region::default(),
            stats,
            canvas.clone(),
            clock.clone(),
        );
        Fixture {
            engine,
            canvas,
            clock,
        }
    }

    fn wool() -> CellContent {
        CellContent::new("white_wool")
    }

    #[test]
    fn test_remaining_cooldown() {
        assert_eq!(remaining_cooldown(0, 0, 30), Some(30));
        assert_eq!(remaining_cooldown(0, 10_000, 30), Some(20));
        assert_eq!(remaining_cooldown(0, 29_999, 30), Some(1));
        assert_eq!(remaining_cooldown(0, 30_000, 30), None);
        assert_eq!(remaining_cooldown(0, 31_000, 30), None);
        assert_eq!(remaining_cooldown(0, 0, 0), None);
    }

    #[test]
    fn test_remaining_cooldown_truncates_difference() {
        // 29.3s elapsed
        assert_eq!(remaining_cooldown(900, 30_200, 30), Some(1));
    }

    #[test]
    fn test_remaining_cooldown_clock_regression() {
        assert_eq!(remaining_cooldown(50_000, 10_000, 30), Some(30));
        assert_eq!(remaining_cooldown(i64::MAX, i64::MIN, 30), Some(30));
        assert_eq!(remaining_cooldown(i64::MIN, i64::MAX, 30), None);
    }

    #[test]
    fn test_resolve_target_replacement_inside_region() {
        let f = fixture();
        let target = f.engine.resolve_target(CellPos::new(0, 2, 0), Facing::Up);
        assert_eq!(target, Some((CellPos::new(0, 2, 0), PlacementKind::Replacement)));
    }

    #[test]
    fn test_resolve_target_placement_on_neighbour() {
        let f = fixture();
        let target = f.engine.resolve_target(CellPos::new(0, 1, 0), Facing::Up);
        assert_eq!(target, Some((CellPos::new(0, 2, 0), PlacementKind::Placement)));

        let target = f.engine.resolve_target(CellPos::new(513, 2, 0), Facing::West);
        assert_eq!(target, Some((CellPos::new(512, 2, 0), PlacementKind::Placement)));
    }

    #[test]
    fn test_resolve_target_off_canvas() {
        let f = fixture();
        assert_eq!(f.engine.resolve_target(CellPos::new(0, 1, 0), Facing::Down), None);
        assert_eq!(f.engine.resolve_target(CellPos::new(600, 2, 0), Facing::West), None);
    }

    #[test]
    fn test_out_of_bounds_leaves_stats_untouched() {
        let f = fixture();
        let outcome = f
            .engine
            .attempt(SURFACE, "alice", CellPos::new(0, 10, 0), Facing::Up, wool());

        assert_eq!(outcome, PlacementOutcome::OutOfBounds);
        assert_eq!(f.engine.stats("alice", SURFACE), SurfaceStats::default());
        assert_eq!(f.canvas.written(), 0);
    }

    #[test]
    fn test_first_attempt_commits_placement() {
        let f = fixture();
        let outcome = f
            .engine
            .attempt(SURFACE, "alice", CellPos::new(0, 1, 0), Facing::Up, wool());

        assert_eq!(
            outcome,
            PlacementOutcome::Committed {
                kind: PlacementKind::Placement,
                pos: CellPos::new(0, 2, 0),
                overwrote: false,
            }
        );
        assert_eq!(f.canvas.cell(SURFACE, CellPos::new(0, 2, 0)), Some(wool()));

        let stats = f.engine.stats("alice", SURFACE);
        assert_eq!(stats.placements, 1);
        assert_eq!(stats.replacements, 0);
        assert_eq!(stats.timestamp, 1_000_000);
    }

    #[test]
    fn test_immediate_second_attempt_waits_full_threshold() {
        let f = fixture();
        f.engine
            .attempt(SURFACE, "alice", CellPos::new(0, 1, 0), Facing::Up, wool());
        let outcome = f
            .engine
            .attempt(SURFACE, "alice", CellPos::new(1, 1, 0), Facing::Up, wool());

        assert_eq!(
            outcome,
            PlacementOutcome::RateLimited {
                remaining_seconds: f.engine.wait_seconds()
            }
        );
        assert_eq!(f.canvas.cell(SURFACE, CellPos::new(1, 2, 0)), None);
        assert_eq!(f.engine.stats("alice", SURFACE).placements, 1);
    }

    #[test]
    fn test_boundary_attempt_succeeds() {
        let f = fixture();
        f.engine
            .attempt(SURFACE, "alice", CellPos::new(0, 1, 0), Facing::Up, wool());

        f.clock.advance(Duration::from_secs(30));
        let outcome = f
            .engine
            .attempt(SURFACE, "alice", CellPos::new(0, 2, 0), Facing::Up, wool());

        assert_eq!(
            outcome,
            PlacementOutcome::Committed {
                kind: PlacementKind::Replacement,
                pos: CellPos::new(0, 2, 0),
                overwrote: true,
            }
        );
        let stats = f.engine.stats("alice", SURFACE);
        assert_eq!(stats.placements, 1);
        assert_eq!(stats.replacements, 1);
    }

    #[test]
    fn test_cooldown_is_per_user_and_surface() {
        let f = fixture();
        f.engine
            .attempt(SURFACE, "alice", CellPos::new(0, 1, 0), Facing::Up, wool());

        let bob = f
            .engine
            .attempt(SURFACE, "bob", CellPos::new(1, 1, 0), Facing::Up, wool());
        let elsewhere = f
            .engine
            .attempt("other", "alice", CellPos::new(0, 1, 0), Facing::Up, wool());

        assert!(matches!(bob, PlacementOutcome::Committed { .. }));
        assert!(matches!(elsewhere, PlacementOutcome::Committed { .. }));
        assert_eq!(f.engine.stats("alice", "other").placements, 1);
    }

    #[test]
    fn test_regressed_clock_is_rate_limited() {
        let f = fixture();
        f.engine
            .attempt(SURFACE, "alice", CellPos::new(0, 1, 0), Facing::Up, wool());

        f.clock.set_millis(0);
        let outcome = f
            .engine
            .attempt(SURFACE, "alice", CellPos::new(0, 2, 0), Facing::Up, wool());

        assert_eq!(
            outcome,
            PlacementOutcome::RateLimited {
                remaining_seconds: 30
            }
        );
        assert_eq!(f.engine.stats("alice", SURFACE).timestamp, 1_000_000);
    }

    #[test]
    fn test_concurrent_attempts_commit_once() {
        let f = Arc::new(fixture());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || {
                    f.engine.attempt(
                        SURFACE,
                        "alice",
                        CellPos::new(i, 1, 0),
                        Facing::Up,
                        wool(),
                    )
                })
            })
            .collect();

        let committed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| matches!(outcome, PlacementOutcome::Committed { .. }))
            .count();

        assert_eq!(committed, 1);
        assert_eq!(f.engine.stats("alice", SURFACE).placements, 1);
        assert_eq!(f.canvas.written(), 1);
    }

    #[test]
    fn test_reload_adopts_document_wait() {
        let f = fixture();
        assert_eq!(f.engine.wait_seconds(), 30);
        assert_eq!(f.engine.reload(), 30);
        assert!(f.engine.flush().is_ok());
    }
}
