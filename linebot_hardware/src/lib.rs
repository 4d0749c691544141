//! Hardware backends for the line follower.
//!
//! The default build provides a simulated chassis that implements every
//! hardware trait against a shared kinematic model, so the full control
//! stack can run on a desktop. The `hardware` feature adds a Raspberry Pi
//! GPIO backend via `rppal`.

pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio;

use std::sync::{Arc, Mutex};

use tracing::trace;

use linebot_traits::{HBridge, Heading, Pwm, SensorBank, Wheel};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Tuning knobs for the simulated chassis.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// PWM period in ticks.
    pub period: u32,
    /// Wheel speed at full duty, pulses per second.
    pub max_pps: f32,
    /// First-order wheel response time constant.
    pub tau_ms: f32,
    /// Side length of the simulated course in encoder pulses.
    pub side_pulses: f32,
    /// Heading change per pulse of wheel speed difference, degrees.
    pub turn_gain: f32,
    /// Lateral drift per degree of heading error per second, weight units.
    pub lat_gain: f32,
    /// Half-width of one sensor's view in weight units.
    pub sensor_halfwidth: f32,
    /// Emit active-low levels, matching the real array.
    pub active_low: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            period: 1000,
            max_pps: 100.0,
            tau_ms: 50.0,
            side_pulses: 400.0,
            turn_gain: 15.0,
            lat_gain: 0.05,
            sensor_halfwidth: 7.5,
            active_low: true,
        }
    }
}

const WEIGHTS: [f32; 7] = [-30.0, -20.0, -10.0, 0.0, 10.0, 20.0, 30.0];
const CORNER_MARKER: u8 = 0b0000111;
/// The marker stays under the left sensors until the chassis has rotated
/// this far into the pivot.
const MARKER_VIEW_DEG: f32 = 15.0;
/// Where the new side's line sits after the snap, in weight units left of
/// center, so the mid-left sensor picks it up first.
const REACQUIRE_LATERAL: f32 = -5.0;

#[derive(Debug)]
struct SimState {
    cfg: SimConfig,
    pins: [(bool, bool); 2],
    compare: [u32; 2],
    wheel_speed: [f32; 2],
    residual: [f32; 2],
    heading_deg: f32,
    side_heading: f32,
    lateral: f32,
    distance: f32,
    corner: bool,
}

/// Point-in-time view of the simulated chassis, for logging.
#[derive(Debug, Clone, Copy)]
pub struct SimSnapshot {
    pub heading_deg: f32,
    pub lateral: f32,
    pub distance: f32,
    pub wheel_speed: [f32; 2],
    pub corner: bool,
}

/// A simulated differential-drive chassis following a square course.
///
/// The robot drives along sides of `side_pulses` length. At the end of each
/// side a corner marker appears under the three left sensors; a left pivot
/// sweeps it out of view, and once the chassis has rotated 90 degrees
/// counterclockwise the next side's line appears slightly left of center.
/// Clone handles implement the hardware traits against the shared state;
/// [`SimulatedRobot::step`] advances the model and returns the encoder
/// pulses produced per wheel.
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRobot {
    pub fn new(cfg: SimConfig) -> Self {
        let period = cfg.period;
        Self {
            state: Arc::new(Mutex::new(SimState {
                cfg,
                pins: [(false, false); 2],
                compare: [period; 2],
                wheel_speed: [0.0; 2],
                residual: [0.0; 2],
                heading_deg: 0.0,
                side_heading: 0.0,
                lateral: 0.0,
                distance: 0.0,
                corner: false,
            })),
        }
    }

    pub fn sensor_bank(&self) -> SimSensorBank {
        SimSensorBank {
            state: self.state.clone(),
        }
    }

    pub fn h_bridge(&self) -> SimHBridge {
        SimHBridge {
            state: self.state.clone(),
        }
    }

    pub fn pwm(&self) -> SimPwm {
        SimPwm {
            state: self.state.clone(),
        }
    }

    pub fn compass(&self) -> SimCompass {
        SimCompass {
            state: self.state.clone(),
        }
    }

    /// Advances the model by `dt_ms` and returns the signed encoder pulse
    /// delta per wheel, indexed by [`Wheel`].
    pub fn step(&self, dt_ms: u32) -> [i32; 2] {
        let mut s = self.state.lock().unwrap();
        let dt = dt_ms as f32 / 1000.0;
        let alpha = (dt_ms as f32 / s.cfg.tau_ms).min(1.0);

        let mut deltas = [0i32; 2];
        for wheel in Wheel::ALL {
            let idx = wheel as usize;
            let target = s.commanded(wheel);
            s.wheel_speed[idx] += (target - s.wheel_speed[idx]) * alpha;
            let pulses = s.wheel_speed[idx] * dt + s.residual[idx];
            let whole = pulses.trunc();
            s.residual[idx] = pulses - whole;
            deltas[idx] = whole as i32;
        }

        let left = s.wheel_speed[Wheel::Left as usize];
        let right = s.wheel_speed[Wheel::Right as usize];
        // Counterclockwise positive: a faster right wheel turns the chassis
        // left.
        s.heading_deg += (right - left) * s.cfg.turn_gain * dt;
        let heading_err = s.heading_deg - s.side_heading;
        s.lateral += heading_err * s.cfg.lat_gain * dt * s.cfg.max_pps;
        s.distance += (left + right) * 0.5 * dt;

        if !s.corner && s.distance >= s.cfg.side_pulses {
            s.corner = true;
            trace!(distance = s.distance, "corner marker reached");
        }
        if s.corner && heading_err >= 85.0 {
            s.side_heading += 90.0;
            s.distance = 0.0;
            s.lateral = REACQUIRE_LATERAL;
            s.corner = false;
            trace!(side_heading = s.side_heading, "corner completed");
        }

        deltas
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let s = self.state.lock().unwrap();
        SimSnapshot {
            heading_deg: s.heading_deg,
            lateral: s.lateral,
            distance: s.distance,
            wheel_speed: s.wheel_speed,
            corner: s.corner,
        }
    }
}

impl SimState {
    /// Commanded wheel speed from the current pin and compare state, in
    /// pulses per second. Mirrored wiring, as on the real chassis.
    fn commanded(&self, wheel: Wheel) -> f32 {
        let idx = wheel as usize;
        let duty = (self.cfg.period - self.compare[idx]) as f32 / self.cfg.period as f32;
        let dir = match (wheel, self.pins[idx]) {
            (Wheel::Left, (true, false)) | (Wheel::Right, (false, true)) => 1.0,
            (Wheel::Left, (false, true)) | (Wheel::Right, (true, false)) => -1.0,
            _ => 0.0,
        };
        dir * duty * self.cfg.max_pps
    }

    fn sensor_bits(&self) -> u8 {
        // At a corner the straight line ends under the marker. The marker is
        // visible until the pivot has swept it out of view; after that the
        // sensors see nothing until the 90-degree snap brings the next side's
        // line under them.
        if self.corner {
            let heading_err = self.heading_deg - self.side_heading;
            return if heading_err.abs() < MARKER_VIEW_DEG {
                CORNER_MARKER
            } else {
                0
            };
        }
        let mut bits = 0u8;
        for (i, w) in WEIGHTS.iter().enumerate() {
            if (w - self.lateral).abs() < self.cfg.sensor_halfwidth {
                bits |= 1 << i;
            }
        }
        bits
    }
}

/// Sensor-array handle onto the simulated chassis.
#[derive(Debug, Clone)]
pub struct SimSensorBank {
    state: Arc<Mutex<SimState>>,
}

impl SensorBank for SimSensorBank {
    fn read_levels(&mut self) -> Result<u8, DynError> {
        let s = self.state.lock().unwrap();
        let bits = s.sensor_bits();
        Ok(if s.cfg.active_low { !bits & 0x7F } else { bits })
    }
}

#[derive(Debug, Clone)]
pub struct SimHBridge {
    state: Arc<Mutex<SimState>>,
}

impl HBridge for SimHBridge {
    fn set_pins(&mut self, wheel: Wheel, in1: bool, in2: bool) -> Result<(), DynError> {
        self.state.lock().unwrap().pins[wheel as usize] = (in1, in2);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimPwm {
    state: Arc<Mutex<SimState>>,
}

impl Pwm for SimPwm {
    fn set_compare(&mut self, wheel: Wheel, value: u32) -> Result<(), DynError> {
        let mut s = self.state.lock().unwrap();
        let period = s.cfg.period;
        s.compare[wheel as usize] = value.min(period);
        Ok(())
    }

    fn period(&self, _wheel: Wheel) -> u32 {
        self.state.lock().unwrap().cfg.period
    }
}

#[derive(Debug, Clone)]
pub struct SimCompass {
    state: Arc<Mutex<SimState>>,
}

impl Heading for SimCompass {
    /// The model integrates heading without bound; the reported value is
    /// wrapped into (-180, 180] per the trait contract.
    fn heading_deg(&mut self) -> Result<f32, DynError> {
        let mut deg = self.state.lock().unwrap().heading_deg;
        while deg > 180.0 {
            deg -= 360.0;
        }
        while deg <= -180.0 {
            deg += 360.0;
        }
        Ok(deg)
    }
}
