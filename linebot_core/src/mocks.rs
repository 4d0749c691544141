//! Test doubles for the hardware traits.
//!
//! Shipped as a normal module so integration tests and benches can drive the
//! control stack without hardware.

use std::sync::{Arc, Mutex};

use linebot_traits::{HBridge, Heading, Pwm, SensorBank, Wheel};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Replays a fixed sequence of raw sensor levels, then holds the last one.
#[derive(Debug)]
pub struct ScriptedBank {
    script: Vec<u8>,
    next: usize,
}

impl ScriptedBank {
    pub fn new(script: Vec<u8>) -> Self {
        Self { script, next: 0 }
    }
}

impl SensorBank for ScriptedBank {
    fn read_levels(&mut self) -> Result<u8, DynError> {
        if self.script.is_empty() {
            return Ok(0);
        }
        let idx = self.next.min(self.script.len() - 1);
        self.next += 1;
        Ok(self.script[idx])
    }
}

/// A sensor bank whose level a test mutates from outside while the
/// controller owns the bank itself.
#[derive(Debug, Clone)]
pub struct SharedBank {
    level: Arc<Mutex<u8>>,
}

impl SharedBank {
    pub fn new(initial: u8) -> Self {
        Self {
            level: Arc::new(Mutex::new(initial)),
        }
    }

    /// Sets the raw level returned by every subsequent read.
    pub fn set(&self, level: u8) {
        *self.level.lock().unwrap() = level;
    }
}

impl SensorBank for SharedBank {
    fn read_levels(&mut self) -> Result<u8, DynError> {
        Ok(*self.level.lock().unwrap())
    }
}

/// Always fails, for exercising hardware error propagation.
#[derive(Debug)]
pub struct FailingBank;

impl SensorBank for FailingBank {
    fn read_levels(&mut self) -> Result<u8, DynError> {
        Err("sensor bus read failed".into())
    }
}

/// Records the last pin levels commanded per wheel. Clones share state, so a
/// test can keep a handle while the controller owns its copy.
#[derive(Debug, Clone, Default)]
pub struct SpyBridge {
    pins: Arc<Mutex<[(bool, bool); 2]>>,
}

impl SpyBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pins(&self, wheel: Wheel) -> (bool, bool) {
        self.pins.lock().unwrap()[wheel as usize]
    }
}

impl HBridge for SpyBridge {
    fn set_pins(&mut self, wheel: Wheel, in1: bool, in2: bool) -> Result<(), DynError> {
        self.pins.lock().unwrap()[wheel as usize] = (in1, in2);
        Ok(())
    }
}

/// Records the last compare value commanded per wheel. Clones share state.
#[derive(Debug, Clone)]
pub struct SpyPwm {
    period: u32,
    compare: Arc<Mutex<[u32; 2]>>,
}

impl SpyPwm {
    pub fn new(period: u32) -> Self {
        Self {
            period,
            compare: Arc::new(Mutex::new([period; 2])),
        }
    }

    pub fn compare(&self, wheel: Wheel) -> u32 {
        self.compare.lock().unwrap()[wheel as usize]
    }
}

impl Pwm for SpyPwm {
    fn set_compare(&mut self, wheel: Wheel, value: u32) -> Result<(), DynError> {
        self.compare.lock().unwrap()[wheel as usize] = value;
        Ok(())
    }

    fn period(&self, wheel: Wheel) -> u32 {
        let _ = wheel;
        self.period
    }
}

/// Reports a constant heading.
#[derive(Debug)]
pub struct FixedHeading(pub f32);

impl FixedHeading {
    pub fn new(degrees: f32) -> Self {
        Self(degrees)
    }
}

impl Heading for FixedHeading {
    fn heading_deg(&mut self) -> Result<f32, DynError> {
        Ok(self.0)
    }
}
