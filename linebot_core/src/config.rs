//! Runtime configuration for the motion-control core.
//!
//! These are the in-memory configuration structs used by the controller and
//! state machines. They are separate from the TOML-deserialized schema in
//! `linebot_config`. Defaults match the tuned constants of the reference
//! chassis.

/// Fixed PID gains plus the two clamps the controller applies.
#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Integral accumulator is clamped to +/- this value.
    pub integral_limit: f32,
    /// Output is clamped to +/- this value.
    pub output_limit: f32,
}

impl PidGains {
    /// Line-offset loop: correction stays well under base speed so the ratio
    /// scaling cannot stall a wheel on mild offsets.
    pub fn line() -> Self {
        Self {
            kp: 0.2,
            ki: 0.0,
            kd: 0.08,
            integral_limit: 100.0,
            output_limit: 50.0,
        }
    }

    /// Heading-hold loop.
    pub fn heading() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.2,
            integral_limit: 200.0,
            output_limit: 100.0,
        }
    }

    /// Per-wheel speed loop (pulses-per-second domain).
    pub fn speed() -> Self {
        Self {
            kp: 0.8,
            ki: 0.1,
            kd: 0.05,
            integral_limit: 500.0,
            output_limit: 100.0,
        }
    }
}

/// Drive controller configuration.
#[derive(Debug, Clone)]
pub struct DriveCfg {
    pub line_pid: PidGains,
    pub heading_pid: PidGains,
    pub speed_pid: PidGains,
    /// Nominal forward speed (pulses per second) before differential correction.
    pub base_speed: f32,
    /// Multiplicative compensation applied to every derived right-wheel
    /// target, correcting systematic left/right motor mismatch.
    pub balance_factor: f32,
    /// Speed targets and PID outputs are clamped to +/- this value.
    pub max_speed: f32,
    /// Any nonzero motor command is boosted to at least this duty so static
    /// friction cannot swallow it.
    pub min_effective_duty: f32,
}

impl Default for DriveCfg {
    fn default() -> Self {
        Self {
            line_pid: PidGains::line(),
            heading_pid: PidGains::heading(),
            speed_pid: PidGains::speed(),
            base_speed: 50.0,
            balance_factor: 1.0,
            max_speed: 100.0,
            min_effective_duty: 0.1,
        }
    }
}

/// Encoder velocity sampling configuration.
#[derive(Debug, Clone, Copy)]
pub struct EncoderCfg {
    /// Fixed velocity sampling window in milliseconds. Must divide 1000.
    pub window_ms: u32,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self { window_ms: 10 }
    }
}

/// Line sensor interpretation.
#[derive(Debug, Clone, Copy)]
pub struct SensorCfg {
    /// Active-low sensors: a low electrical level means "line seen".
    pub active_low: bool,
    /// Position fallback threshold for classification of masks not in the
    /// pattern table.
    pub position_threshold: i16,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            active_low: true,
            position_threshold: 15,
        }
    }
}

/// Turn-detection thresholds and windows.
#[derive(Debug, Clone, Copy)]
pub struct TurnCfg {
    /// Left-side sensors active to arm detection.
    pub min_count: u8,
    /// Left-side sensors active to confirm without waiting the stable window.
    pub quick_confirm_count: u8,
    /// Signal must persist this long for the slow confirmation path.
    pub stable_ms: u32,
    /// Detection gives up if not confirmed within this window.
    pub detect_timeout_ms: u32,
    /// Re-detection is suppressed for this long after a confirmed turn.
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

/// Square traversal maneuver configuration.
#[derive(Debug, Clone, Copy)]
pub struct SquareCfg {
    /// Sides to complete before stopping for good (16 = 4 laps).
    pub sides: u32,
    /// Base speed while following the line between corners.
    pub line_speed: f32,
    /// Outer-wheel speed during the pivot; inner wheel runs at -half.
    pub turn_speed: f32,
    /// Full stop before pivoting so the chassis is stationary.
    pub pause_ms: u32,
    /// Settling time after a pivot before resuming line following.
    pub settle_ms: u32,
    /// A pivot that has not reacquired the line by then is flagged and
    /// abandoned rather than spun forever.
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
