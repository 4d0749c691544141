//! Quadrature encoder counting and windowed velocity estimation.
//!
//! Counts live in atomics so edge callbacks (GPIO interrupt threads, or the
//! simulator's edge pump) can bump them without taking a lock, while the
//! control loop samples velocity from its own thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::trace;

use crate::config::EncoderCfg;
use linebot_traits::Wheel;

/// Which encoder channel produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    A,
    B,
}

#[derive(Debug, Default)]
struct WheelCounter {
    count: AtomicI64,
    velocity_pps: AtomicI64,
}

/// Shared per-wheel pulse counts. Clone the `Arc` into whatever thread
/// delivers edges; the owner calls [`Encoders::sample_velocity`] once per
/// window.
#[derive(Debug, Clone)]
pub struct Encoders {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    wheels: [WheelCounter; 2],
    window_ms: u32,
    last_sample: [AtomicI64; 2],
}

impl Encoders {
    pub fn new(cfg: EncoderCfg) -> Self {
        Self {
            inner: Arc::new(Inner {
                wheels: [WheelCounter::default(), WheelCounter::default()],
                window_ms: cfg.window_ms.max(1),
                last_sample: [AtomicI64::new(0), AtomicI64::new(0)],
            }),
        }
    }

    /// Decodes one quadrature edge and bumps the signed count.
    ///
    /// On a phase-A edge the two channel levels being equal means forward;
    /// on a phase-B edge the levels differing means forward. Both levels are
    /// read by the caller at edge time and passed in together.
    pub fn on_edge(&self, wheel: Wheel, phase: Phase, level_a: bool, level_b: bool) {
        let forward = match phase {
            Phase::A => level_a == level_b,
            Phase::B => level_a != level_b,
        };
        let delta = if forward { 1 } else { -1 };
        self.counter(wheel).count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current signed pulse count for a wheel.
    pub fn count(&self, wheel: Wheel) -> i64 {
        self.counter(wheel).count.load(Ordering::Relaxed)
    }

    /// Closes the current velocity window for both wheels.
    ///
    /// Velocity is the count delta since the previous call scaled to pulses
    /// per second. Call this exactly once per `window_ms`; the scale factor
    /// assumes the caller keeps that cadence.
    pub fn sample_velocity(&self) {
        let scale = 1000 / self.inner.window_ms as i64;
        for wheel in Wheel::ALL {
            let idx = wheel as usize;
            let now = self.count(wheel);
            let prev = self.inner.last_sample[idx].swap(now, Ordering::Relaxed);
            let pps = (now - prev) * scale;
            self.counter(wheel)
                .velocity_pps
                .store(pps, Ordering::Relaxed);
            trace!(?wheel, count = now, velocity_pps = pps, "velocity sample");
        }
    }

    /// Most recent windowed velocity in pulses per second.
    pub fn velocity(&self, wheel: Wheel) -> f32 {
        self.counter(wheel).velocity_pps.load(Ordering::Relaxed) as f32
    }

    /// Zeroes counts, velocities, and window baselines for both wheels.
    pub fn reset(&self) {
        for wheel in Wheel::ALL {
            let idx = wheel as usize;
            self.counter(wheel).count.store(0, Ordering::Relaxed);
            self.counter(wheel).velocity_pps.store(0, Ordering::Relaxed);
            self.inner.last_sample[idx].store(0, Ordering::Relaxed);
        }
    }

    pub fn window_ms(&self) -> u32 {
        self.inner.window_ms
    }

    fn counter(&self, wheel: Wheel) -> &WheelCounter {
        &self.inner.wheels[wheel as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoders() -> Encoders {
        Encoders::new(EncoderCfg { window_ms: 10 })
    }

    #[test]
    fn phase_a_equal_levels_counts_forward() {
        let enc = encoders();
        enc.on_edge(Wheel::Left, Phase::A, true, true);
        enc.on_edge(Wheel::Left, Phase::A, false, false);
        assert_eq!(enc.count(Wheel::Left), 2);
    }

    #[test]
    fn phase_a_unequal_levels_counts_reverse() {
        let enc = encoders();
        enc.on_edge(Wheel::Left, Phase::A, true, false);
        assert_eq!(enc.count(Wheel::Left), -1);
    }

    #[test]
    fn phase_b_unequal_levels_counts_forward() {
        let enc = encoders();
        enc.on_edge(Wheel::Right, Phase::B, false, true);
        assert_eq!(enc.count(Wheel::Right), 1);
        enc.on_edge(Wheel::Right, Phase::B, true, true);
        assert_eq!(enc.count(Wheel::Right), 0);
    }

    #[test]
    fn wheels_count_independently() {
        let enc = encoders();
        enc.on_edge(Wheel::Left, Phase::A, true, true);
        assert_eq!(enc.count(Wheel::Right), 0);
    }

    #[test]
    fn velocity_scales_delta_to_pulses_per_second() {
        let enc = encoders();
        for _ in 0..5 {
            enc.on_edge(Wheel::Left, Phase::A, true, true);
        }
        enc.sample_velocity();
        // 5 pulses in a 10 ms window is 500 pps.
        assert_eq!(enc.velocity(Wheel::Left), 500.0);
        // No new pulses: next window reads zero.
        enc.sample_velocity();
        assert_eq!(enc.velocity(Wheel::Left), 0.0);
    }

    #[test]
    fn reverse_motion_yields_negative_velocity() {
        let enc = encoders();
        for _ in 0..3 {
            enc.on_edge(Wheel::Right, Phase::A, true, false);
        }
        enc.sample_velocity();
        assert_eq!(enc.velocity(Wheel::Right), -300.0);
    }

    #[test]
    fn reset_clears_counts_and_velocity() {
        let enc = encoders();
        enc.on_edge(Wheel::Left, Phase::A, true, true);
        enc.sample_velocity();
        enc.reset();
        assert_eq!(enc.count(Wheel::Left), 0);
        assert_eq!(enc.velocity(Wheel::Left), 0.0);
        // Window baseline is also zeroed, so the next sample sees no phantom
        // delta.
        enc.sample_velocity();
        assert_eq!(enc.velocity(Wheel::Left), 0.0);
    }

    proptest! {
        // Any interleaving of N forward and M reverse edges nets N - M.
        #[test]
        fn net_count_matches_edge_balance(edges in proptest::collection::vec(any::<bool>(), 0..200)) {
            let enc = encoders();
            let mut expected = 0i64;
            for forward in edges {
                if forward {
                    enc.on_edge(Wheel::Left, Phase::A, true, true);
                    expected += 1;
                } else {
                    enc.on_edge(Wheel::Left, Phase::B, true, true);
                    expected -= 1;
                }
            }
            prop_assert_eq!(enc.count(Wheel::Left), expected);
        }
    }
}
