#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the line follower.
//!
//! `Config` and its sub-structs are deserialized from TOML and validated.
//! Every section is optional; the defaults reproduce the tuned values of the
//! reference chassis, so an empty file is a valid configuration.

use serde::Deserialize;

/// BCM pin assignments.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    /// Reflectance sensors, leftmost first.
    pub sensors: [u8; 7],
    pub left_in1: u8,
    pub left_in2: u8,
    pub right_in1: u8,
    pub right_in2: u8,
    pub left_enc_a: u8,
    pub left_enc_b: u8,
    pub right_enc_a: u8,
    pub right_enc_b: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            sensors: [4, 5, 6, 12, 13, 16, 17],
            left_in1: 20,
            left_in2: 21,
            right_in1: 22,
            right_in2: 23,
            left_enc_a: 24,
            left_enc_b: 25,
            right_enc_a: 26,
            right_enc_b: 27,
        }
    }
}

/// One PID loop's gains and clamps.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral_limit: f32,
    pub output_limit: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        // Line loop defaults; the heading and speed sections override these.
        Self {
            kp: 0.2,
            ki: 0.0,
            kd: 0.08,
            integral_limit: 100.0,
            output_limit: 50.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pids {
    pub line: PidCfg,
    pub heading: PidCfg,
    pub speed: PidCfg,
}

impl Default for Pids {
    fn default() -> Self {
        Self {
            line: PidCfg::default(),
            heading: PidCfg {
                kp: 1.0,
                ki: 0.0,
                kd: 0.2,
                integral_limit: 200.0,
                output_limit: 100.0,
            },
            speed: PidCfg {
                kp: 0.8,
                ki: 0.1,
                kd: 0.05,
                integral_limit: 500.0,
                output_limit: 100.0,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Nominal forward speed in pulses per second.
    pub base_speed: f32,
    /// Clamp for all speed targets and loop outputs.
    pub max_speed: f32,
    /// Right-wheel multiplier correcting motor mismatch.
    pub balance_factor: f32,
    /// Duty floor for any nonzero motor command.
    pub min_effective_duty: f32,
    /// Control loop period in milliseconds.
    pub loop_ms: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            base_speed: 50.0,
            max_speed: 100.0,
            balance_factor: 1.0,
            min_effective_duty: 0.1,
            loop_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EncoderCfg {
    /// Velocity window in milliseconds. Must divide 1000.
    pub window_ms: u32,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self { window_ms: 10 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorsCfg {
    /// Sensors pull the line low when true.
    pub active_low: bool,
    /// Weighted-position threshold for classifying unlisted masks.
    pub position_threshold: i16,
}

impl Default for SensorsCfg {
    fn default() -> Self {
        Self {
            active_low: true,
            position_threshold: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TurnCfg {
    pub min_count: u8,
    pub quick_confirm_count: u8,
    pub stable_ms: u32,
    pub detect_timeout_ms: u32,
    pub inhibit_ms: u32,
}

impl Default for TurnCfg {
    fn default() -> Self {
        Self {
            min_count: 3,
            quick_confirm_count: 2,
            stable_ms: 2,
            detect_timeout_ms: 100,
            inhibit_ms: 800,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SquareCfg {
    pub sides: u32,
    pub line_speed: f32,
    pub turn_speed: f32,
    pub pause_ms: u32,
    pub settle_ms: u32,
    pub turn_timeout_ms: u32,
}

impl Default for SquareCfg {
    fn default() -> Self {
        Self {
            sides: 16,
            line_speed: 30.0,
            turn_speed: 5.0,
            pause_ms: 100,
            settle_ms: 200,
            turn_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub control: ControlCfg,
    pub pid: Pids,
    pub encoder: EncoderCfg,
    pub sensors: SensorsCfg,
    pub turn: TurnCfg,
    pub square: SquareCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.max_speed <= 0.0 {
            eyre::bail!("control.max_speed must be > 0");
        }
        if self.control.base_speed < 0.0 || self.control.base_speed > self.control.max_speed {
            eyre::bail!("control.base_speed must be in [0, max_speed]");
        }
        if self.control.balance_factor <= 0.0 || self.control.balance_factor > 2.0 {
            eyre::bail!("control.balance_factor must be in (0.0, 2.0]");
        }
        if self.control.min_effective_duty < 0.0 || self.control.min_effective_duty > 1.0 {
            eyre::bail!("control.min_effective_duty must be in [0.0, 1.0]");
        }
        if self.control.loop_ms == 0 {
            eyre::bail!("control.loop_ms must be >= 1");
        }

        // PID loops
        for (name, pid) in [
            ("line", &self.pid.line),
            ("heading", &self.pid.heading),
            ("speed", &self.pid.speed),
        ] {
            if pid.kp < 0.0 || pid.ki < 0.0 || pid.kd < 0.0 {
                eyre::bail!("pid.{name}: gains must be >= 0");
            }
            if pid.integral_limit <= 0.0 {
                eyre::bail!("pid.{name}.integral_limit must be > 0");
            }
            if pid.output_limit <= 0.0 {
                eyre::bail!("pid.{name}.output_limit must be > 0");
            }
        }

        // Encoder
        if self.encoder.window_ms == 0 || 1000 % self.encoder.window_ms != 0 {
            eyre::bail!("encoder.window_ms must divide 1000");
        }

        // Turn detection
        if self.turn.min_count == 0 || self.turn.min_count > 3 {
            eyre::bail!("turn.min_count must be in [1, 3]");
        }
        if self.turn.quick_confirm_count > self.turn.min_count {
            eyre::bail!("turn.quick_confirm_count must be <= turn.min_count");
        }
        if self.turn.stable_ms > self.turn.detect_timeout_ms {
            eyre::bail!("turn.stable_ms must be <= turn.detect_timeout_ms");
        }
        if self.turn.inhibit_ms > 60_000 {
            eyre::bail!("turn.inhibit_ms is unreasonably large (>60s)");
        }

        // Square maneuver
        if self.square.sides == 0 {
            eyre::bail!("square.sides must be >= 1");
        }
        if self.square.line_speed <= 0.0 || self.square.line_speed > self.control.max_speed {
            eyre::bail!("square.line_speed must be in (0, max_speed]");
        }
        if self.square.turn_speed <= 0.0 || self.square.turn_speed > self.control.max_speed {
            eyre::bail!("square.turn_speed must be in (0, max_speed]");
        }
        if self.square.turn_timeout_ms == 0 {
            eyre::bail!("square.turn_timeout_ms must be >= 1");
        }

        // Logging
        if let Some(rotation) = &self.logging.rotation
            && !matches!(rotation.as_str(), "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of: never, daily, hourly");
        }

        Ok(())
    }
}
