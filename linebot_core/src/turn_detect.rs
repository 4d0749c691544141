//! Left-turn detection over the leftmost three sensors.
//!
//! A small state machine debounces the "several left sensors on the line"
//! signal into a single latched turn-ready flag, with a long inhibit window
//! after each handled turn so one corner is never detected twice.
//!
//! All timestamps are millisecond ticks compared with wrapping arithmetic, so
//! the machine survives the 32-bit tick counter rolling over.

use tracing::{debug, trace};

use crate::config::TurnCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// Signal seen, waiting for confirmation.
    Detected,
    /// Turn latched, waiting for the maneuver layer to take it.
    Confirmed,
    /// Re-detection suppressed after a handled turn.
    Inhibited,
}

#[derive(Debug)]
pub struct TurnDetection {
    cfg: TurnCfg,
    state: TurnState,
    left_sensor_count: u8,
    detect_start_time: u32,
    inhibit_start_time: u32,
    last_turn_time: u32,
    turn_ready: bool,
}

impl TurnDetection {
    /// A freshly built detector with a tick counter near zero starts out
    /// inside the inhibit window, so the first detection can only happen
    /// `inhibit_ms` after power-up. That grace period is deliberate cover
    /// for the chassis settling on the start line.
    pub fn new(cfg: TurnCfg) -> Self {
        Self {
            cfg,
            state: TurnState::Idle,
            left_sensor_count: 0,
            detect_start_time: 0,
            inhibit_start_time: 0,
            last_turn_time: 0,
            turn_ready: false,
        }
    }

    /// Feeds one sensor reading (active-high bits, bit 0 leftmost) at tick
    /// `now_ms`.
    pub fn update(&mut self, bits: u8, now_ms: u32) {
        let inhibited = now_ms.wrapping_sub(self.last_turn_time) < self.cfg.inhibit_ms;
        if inhibited && self.state != TurnState::Inhibited {
            self.state = TurnState::Inhibited;
            self.inhibit_start_time = now_ms;
        } else if !inhibited && self.state == TurnState::Inhibited {
            self.state = TurnState::Idle;
        }

        let left_count = (bits & 0b111).count_ones() as u8;
        self.left_sensor_count = left_count;
        let turn_condition = left_count >= self.cfg.min_count && !inhibited;

        match self.state {
            TurnState::Idle => {
                if turn_condition {
                    self.state = TurnState::Detected;
                    self.detect_start_time = now_ms;
                    trace!(left_count, now_ms, "turn signal detected");
                }
            }
            TurnState::Detected => {
                // The signal may flicker off while the chassis vibrates;
                // confirmation only needs it to persist or recur quickly.
                let elapsed = now_ms.wrapping_sub(self.detect_start_time);
                let quick_confirm = left_count >= self.cfg.quick_confirm_count;
                let stable_confirm = elapsed >= self.cfg.stable_ms;
                if quick_confirm || stable_confirm {
                    self.state = TurnState::Confirmed;
                    self.turn_ready = true;
                    debug!(left_count, elapsed, "turn confirmed");
                } else if elapsed >= self.cfg.detect_timeout_ms {
                    self.state = TurnState::Idle;
                    self.turn_ready = false;
                }
            }
            TurnState::Confirmed => {
                // Watchdog: an unconsumed turn is dropped rather than left
                // latched forever.
                if now_ms.wrapping_sub(self.detect_start_time)
                    >= self.cfg.detect_timeout_ms.saturating_mul(2)
                {
                    self.state = TurnState::Idle;
                    self.turn_ready = false;
                    self.detect_start_time = 0;
                    debug!(now_ms, "unconsumed turn dropped");
                }
            }
            TurnState::Inhibited => {
                if now_ms.wrapping_sub(self.inhibit_start_time) >= self.cfg.inhibit_ms {
                    self.state = TurnState::Idle;
                }
            }
        }
    }

    /// True once a turn has been confirmed and not yet reset.
    pub fn is_turn_ready(&self) -> bool {
        self.turn_ready
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn left_sensor_count(&self) -> u8 {
        self.left_sensor_count
    }

    /// Acknowledges a handled turn: clears the latch and opens the inhibit
    /// window at `now_ms`.
    pub fn reset(&mut self, now_ms: u32) {
        self.state = TurnState::Inhibited;
        self.turn_ready = false;
        self.last_turn_time = now_ms;
        self.inhibit_start_time = now_ms;
        debug!(now_ms, "turn detection reset");
    }
}
