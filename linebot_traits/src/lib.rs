pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Drive wheel identifier. Two wheels, fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    Left,
    Right,
}

impl Wheel {
    pub const ALL: [Wheel; 2] = [Wheel::Left, Wheel::Right];
}

/// H-bridge direction command for one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
    Brake,
}

/// Raw access to the reflectance sensor bank.
///
/// Returns the electrical level of the seven sensor outputs as a bitmask
/// (bit i = sensor i, index 0 = leftmost). Polarity interpretation is the
/// core's job; implementations report levels as read.
pub trait SensorBank {
    fn read_levels(&mut self) -> Result<u8, Box<dyn std::error::Error + Send + Sync>>;
}

/// Per-wheel H-bridge direction pins (IN1/IN2).
pub trait HBridge {
    fn set_pins(
        &mut self,
        wheel: Wheel,
        in1: bool,
        in2: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Per-wheel PWM channel. The timer counts down, so a larger compare value
/// means a shorter on-time; duty mapping is done by the core.
pub trait Pwm {
    fn set_compare(
        &mut self,
        wheel: Wheel,
        value: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn period(&self, wheel: Wheel) -> u32;
}

/// Attitude source: yaw heading in degrees, range (-180, 180].
///
/// The value wraps at the boundary; consumers computing angle differences
/// must take the shortest-path delta.
pub trait Heading {
    fn heading_deg(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fire-and-forget text display. The core never consumes a result from it.
pub trait Display {
    fn show_text(&mut self, x: u8, y: u8, text: &str);
    fn clear(&mut self);
}

/// Display that drops everything, for headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show_text(&mut self, _x: u8, _y: u8, _text: &str) {}
    fn clear(&mut self) {}
}
