//! Seven-sensor reflectance array: weighted position estimate and geometric
//! line-state classification.

use tracing::trace;

use crate::config::SensorCfg;
use crate::error::{Result, map_hw_error_dyn};
use linebot_traits::SensorBank;

/// Number of sensors in the array. Index 0 is the leftmost sensor.
pub const SENSOR_COUNT: usize = 7;

/// Signed weight per sensor, leftmost to rightmost.
pub const WEIGHTS: [i16; SENSOR_COUNT] = [-30, -20, -10, 0, 10, 20, 30];

/// Geometric interpretation of one array reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// No sensor sees the line.
    NoLine,
    /// Every sensor sees the line (crossing or junction).
    AllLine,
    /// Line is under the center of the array.
    OnLine,
    LeftTurn,
    RightTurn,
    SharpLeft,
    SharpRight,
}

/// One processed array reading.
#[derive(Debug, Clone, Copy)]
pub struct LineReading {
    /// Bit i set means sensor i (counted from the left) sees the line.
    pub bits: u8,
    pub active_count: u8,
    /// Weighted position in [-30, 30]; negative means the line is left of
    /// center. Holds the previous value while no sensor is active.
    pub position: i16,
    pub state: LineState,
}

/// Masks whose corresponding state is `OnLine`.
const ON_LINE_MASKS: [u8; 4] = [0b0001000, 0b0011000, 0b0001100, 0b0011100];
const LEFT_TURN_MASKS: [u8; 5] = [0b0000001, 0b0000011, 0b0000111, 0b0110000, 0b0111000];
const RIGHT_TURN_MASKS: [u8; 5] = [0b1000000, 0b1100000, 0b1110000, 0b0000110, 0b0001110];
const SHARP_LEFT_MASKS: [u8; 2] = [0b0000010, 0b0000100];
const SHARP_RIGHT_MASKS: [u8; 2] = [0b0100000, 0b0010000];

/// Reads and interprets the sensor array.
///
/// Generic over the bank so tests can script readings and the simulator can
/// synthesize them from chassis pose.
#[derive(Debug)]
pub struct LineSensorArray<B> {
    bank: B,
    cfg: SensorCfg,
    last_position: i16,
}

impl<B: SensorBank> LineSensorArray<B> {
    pub fn new(bank: B, cfg: SensorCfg) -> Self {
        Self {
            bank,
            cfg,
            last_position: 0,
        }
    }

    /// Samples the bank once and returns the interpreted reading.
    pub fn read(&mut self) -> Result<LineReading> {
        let raw = self
            .bank
            .read_levels()
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))?;
        // Active-low banks report 0 on the line; normalize to active-high
        // bits before interpretation.
        let bits = if self.cfg.active_low { !raw & 0x7F } else { raw & 0x7F };
        Ok(self.interpret(bits))
    }

    fn interpret(&mut self, bits: u8) -> LineReading {
        let active_count = bits.count_ones() as u8;

        let position = if active_count == 0 {
            self.last_position
        } else {
            let mut sum = 0i32;
            for (i, w) in WEIGHTS.iter().enumerate() {
                if bits & (1 << i) != 0 {
                    sum += i32::from(*w);
                }
            }
            (sum / i32::from(active_count)) as i16
        };
        self.last_position = position;

        let state = classify(bits, active_count, position, self.cfg.position_threshold);
        trace!(bits = format_args!("{bits:07b}"), active_count, position, ?state, "line reading");

        LineReading {
            bits,
            active_count,
            position,
            state,
        }
    }
}

fn classify(bits: u8, active_count: u8, position: i16, threshold: i16) -> LineState {
    if bits == 0 {
        return LineState::NoLine;
    }
    if active_count as usize == SENSOR_COUNT {
        return LineState::AllLine;
    }
    if ON_LINE_MASKS.contains(&bits) {
        return LineState::OnLine;
    }
    if LEFT_TURN_MASKS.contains(&bits) {
        return LineState::LeftTurn;
    }
    if RIGHT_TURN_MASKS.contains(&bits) {
        return LineState::RightTurn;
    }
    if SHARP_LEFT_MASKS.contains(&bits) {
        return LineState::SharpLeft;
    }
    if SHARP_RIGHT_MASKS.contains(&bits) {
        return LineState::SharpRight;
    }
    // Unlisted masks fall back to the weighted position.
    if position < -threshold {
        LineState::LeftTurn
    } else if position > threshold {
        LineState::RightTurn
    } else {
        LineState::OnLine
    }
}
