use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for cooldown accounting.
pub trait Clock: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        (millis.min(i64::MAX as u128)) as i64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: i64) {
        self.set_millis(secs.saturating_mul(1000));
    }

    pub fn advance(&self, by: Duration) {
        let by = (by.as_millis().min(i64::MAX as u128)) as i64;
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now_millis();
        std::thread::sleep(Duration::from_millis(2));
        let second = clock.now_millis();

        assert!(first > 0);
        assert!(second > first);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.now_millis(), 0);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now_millis(), 1500);

        clock.set_secs(31);
        assert_eq!(clock.now_millis(), 31_000);

        clock.set_millis(-5);
        assert_eq!(clock.now_millis(), -5);
    }
}
