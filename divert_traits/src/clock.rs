use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Time source for the acquisition and service loops.
///
/// Everything time-dependent in the control path goes through this trait so
/// the long wall-clock behaviours (tank-full retest, digest cadence) can be
/// driven against simulated time as well as the real clock.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Whole milliseconds elapsed since `epoch`; 0 if `epoch` is ahead.
    fn ms_since(&self, epoch: Instant) -> u64 {
        self.now().saturating_duration_since(epoch).as_millis() as u64
    }
}

/// The real thing: `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Simulated clock: `sleep` advances the timeline instead of blocking, so a
/// loop paced at the acquisition tick rate chews through minutes of
/// simulated wall time as fast as the host allows. Clones share one
/// timeline, letting a test thread advance time under a loop that owns its
/// own handle.
#[derive(Debug, Clone)]
pub struct TestClock {
    origin: Instant,
    elapsed_us: Arc<AtomicU64>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Jump the timeline forward.
    pub fn advance(&self, d: Duration) {
        self.elapsed_us
            .fetch_add(d.as_micros() as u64, Ordering::Relaxed);
    }

    /// Simulated time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us.load(Ordering::Relaxed))
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_advances_without_blocking() {
        let clock = TestClock::new();
        let epoch = clock.now();
        let wall = Instant::now();
        clock.sleep(Duration::from_secs(600));
        assert_eq!(clock.ms_since(epoch), 600_000);
        assert!(wall.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn clones_share_one_timeline() {
        let a = TestClock::new();
        let b = a.clone();
        b.advance(Duration::from_millis(250));
        assert_eq!(a.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn ms_since_saturates_for_future_epochs() {
        let clock = MonotonicClock::new();
        let ahead = clock.now() + Duration::from_secs(5);
        assert_eq!(clock.ms_since(ahead), 0);
    }
}
