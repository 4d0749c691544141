use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic millisecond clock abstraction for control and timing.
///
/// - now_ms(): monotonic millisecond counter, wraps at u32::MAX
/// - sleep_ms(): sleeps for the given duration (implementations may simulate)
/// - elapsed_since(): wraparound-safe elapsed milliseconds from an epoch
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn sleep_ms(&self, ms: u32);

    /// Milliseconds elapsed since `epoch_ms`. Wrapping subtraction keeps the
    /// result correct across a counter wrap, as long as the true elapsed time
    /// is below u32::MAX milliseconds (~49 days).
    fn elapsed_since(&self, epoch_ms: u32) -> u32 {
        self.now_ms().wrapping_sub(epoch_ms)
    }
}

/// Default, real-time clock backed by std::time::Instant.
///
/// The millisecond value is the elapsed time since construction truncated to
/// u32, matching the wrap behavior of a hardware tick counter.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    #[inline]
    fn sleep_ms(&self, ms: u32) {
        if ms == 0 {
            return;
        }
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Deterministic clock advanced manually, shared by tests and the simulator.
///
/// now_ms() = stored counter; sleep_ms(ms) advances the counter by ms without
/// actually sleeping. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at a given counter value (useful for wraparound tests).
    pub fn starting_at(ms: u32) -> Self {
        Self {
            ticks: Arc::new(AtomicU32::new(ms)),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u32) {
        // fetch_add wraps on overflow in release; use explicit wrapping math
        let _ = self
            .ticks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| {
                Some(t.wrapping_add(ms))
            });
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(ms);
    }
}
