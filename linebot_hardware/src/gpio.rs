//! Raspberry Pi GPIO backend (`hardware` feature).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub use rppal::gpio::Gpio;
use rppal::gpio::{InputPin, OutputPin};
use tracing::{debug, warn};

use crate::error::{HwError, Result};
use linebot_traits::{HBridge, Pwm, SensorBank, Wheel};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// BCM pin assignments for the whole chassis.
#[derive(Debug, Clone)]
pub struct PinMap {
    /// Reflectance sensors, leftmost first.
    pub sensors: [u8; 7],
    /// H-bridge inputs as (IN1, IN2) per wheel, left then right.
    pub bridge: [(u8, u8); 2],
    /// Encoder channels as (A, B) per wheel, left then right.
    pub encoders: [(u8, u8); 2],
}

/// Reads the seven reflectance sensors as raw electrical levels.
pub struct GpioSensorBank {
    pins: Vec<InputPin>,
}

impl GpioSensorBank {
    pub fn new(gpio: &Gpio, map: &PinMap) -> Result<Self> {
        let mut pins = Vec::with_capacity(map.sensors.len());
        for &bcm in &map.sensors {
            let pin = gpio
                .get(bcm)
                .map_err(|e| HwError::Gpio(format!("sensor pin {bcm}: {e}")))?
                .into_input_pullup();
            pins.push(pin);
        }
        Ok(Self { pins })
    }
}

impl SensorBank for GpioSensorBank {
    fn read_levels(&mut self) -> std::result::Result<u8, DynError> {
        let mut levels = 0u8;
        for (i, pin) in self.pins.iter().enumerate() {
            if pin.is_high() {
                levels |= 1 << i;
            }
        }
        Ok(levels)
    }
}

/// Drives the four H-bridge direction inputs.
pub struct GpioHBridge {
    pins: [(OutputPin, OutputPin); 2],
}

impl GpioHBridge {
    pub fn new(gpio: &Gpio, map: &PinMap) -> Result<Self> {
        let mut get_output = |bcm: u8| -> Result<OutputPin> {
            Ok(gpio
                .get(bcm)
                .map_err(|e| HwError::Gpio(format!("bridge pin {bcm}: {e}")))?
                .into_output_low())
        };
        let (l1, l2) = map.bridge[Wheel::Left as usize];
        let (r1, r2) = map.bridge[Wheel::Right as usize];
        Ok(Self {
            pins: [
                (get_output(l1)?, get_output(l2)?),
                (get_output(r1)?, get_output(r2)?),
            ],
        })
    }
}

impl HBridge for GpioHBridge {
    fn set_pins(&mut self, wheel: Wheel, in1: bool, in2: bool) -> std::result::Result<(), DynError> {
        let (p1, p2) = &mut self.pins[wheel as usize];
        if in1 { p1.set_high() } else { p1.set_low() }
        if in2 { p2.set_high() } else { p2.set_low() }
        Ok(())
    }
}

/// The Pi's two hardware PWM channels, one per wheel, exposed through the
/// tick-based compare interface the control stack expects.
pub struct HardwarePwm {
    channels: [rppal::pwm::Pwm; 2],
    period_ticks: u32,
}

impl HardwarePwm {
    pub fn new(frequency_hz: f64, period_ticks: u32) -> Result<Self> {
        use rppal::pwm::{Channel, Polarity, Pwm as RpPwm};
        let mk = |ch: Channel| -> Result<RpPwm> {
            RpPwm::with_frequency(ch, frequency_hz, 0.0, Polarity::Normal, true)
                .map_err(|e| HwError::Pwm(format!("channel {ch:?}: {e}")))
        };
        Ok(Self {
            channels: [mk(Channel::Pwm0)?, mk(Channel::Pwm1)?],
            period_ticks,
        })
    }
}

impl Pwm for HardwarePwm {
    fn set_compare(&mut self, wheel: Wheel, value: u32) -> std::result::Result<(), DynError> {
        let value = value.min(self.period_ticks);
        // Inverted compare: `period_ticks` is fully off.
        let duty = f64::from(self.period_ticks - value) / f64::from(self.period_ticks);
        self.channels[wheel as usize]
            .set_duty_cycle(duty)
            .map_err(|e| HwError::Pwm(e.to_string()))?;
        Ok(())
    }

    fn period(&self, _wheel: Wheel) -> u32 {
        self.period_ticks
    }
}

/// Polls the four encoder channels and delivers decoded edges to a callback.
///
/// `callback(wheel, phase_a, level_a, level_b)` runs on the watcher thread
/// for every detected edge; `phase_a` is true for a phase-A edge. The thread
/// is joined on drop.
pub struct EncoderWatcher {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EncoderWatcher {
    pub fn spawn<F>(gpio: &Gpio, map: &PinMap, poll: Duration, callback: F) -> Result<Self>
    where
        F: Fn(Wheel, bool, bool, bool) + Send + 'static,
    {
        let mut channels = Vec::with_capacity(2);
        for wheel in Wheel::ALL {
            let (a, b) = map.encoders[wheel as usize];
            let get = |bcm: u8| -> Result<InputPin> {
                Ok(gpio
                    .get(bcm)
                    .map_err(|e| HwError::Gpio(format!("encoder pin {bcm}: {e}")))?
                    .into_input_pullup())
            };
            channels.push((wheel, get(a)?, get(b)?));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let handle = thread::Builder::new()
            .name("encoder-watcher".into())
            .spawn(move || {
                let mut last: Vec<(bool, bool)> = channels
                    .iter()
                    .map(|(_, a, b)| (a.is_high(), b.is_high()))
                    .collect();
                debug!("encoder watcher running");
                while !stop.load(Ordering::Relaxed) {
                    for (i, (wheel, a, b)) in channels.iter().enumerate() {
                        let now = (a.is_high(), b.is_high());
                        let (was_a, was_b) = last[i];
                        if now.0 != was_a {
                            callback(*wheel, true, now.0, now.1);
                        }
                        if now.1 != was_b {
                            callback(*wheel, false, now.0, now.1);
                        }
                        last[i] = now;
                    }
                    thread::sleep(poll);
                }
                debug!("encoder watcher stopped");
            })
            .map_err(HwError::Io)?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for EncoderWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("encoder watcher thread panicked");
        }
    }
}
