//! Motor actuation: direction pins plus inverted-compare PWM duty.

use tracing::trace;

use crate::config::DriveCfg;
use crate::error::{Result, map_hw_error_dyn};
use linebot_traits::{Direction, HBridge, Pwm, Wheel};

/// Drives both wheels through an H-bridge and a PWM peripheral.
///
/// The two motors are mounted mirrored, so "forward" energizes opposite
/// bridge inputs per side. The PWM hardware is active-low: a compare value of
/// `period` is fully off and 0 is fully on.
#[derive(Debug)]
pub struct MotorDrive<B, P> {
    bridge: B,
    pwm: P,
    min_effective_duty: f32,
}

impl<B: HBridge, P: Pwm> MotorDrive<B, P> {
    pub fn new(bridge: B, pwm: P, cfg: &DriveCfg) -> Self {
        Self {
            bridge,
            pwm,
            min_effective_duty: cfg.min_effective_duty,
        }
    }

    /// Runs one wheel at a normalized signed speed in [-1, 1].
    ///
    /// Zero stops the wheel. Any nonzero speed is boosted to at least the
    /// minimum effective duty so the motor actually turns.
    pub fn run(&mut self, wheel: Wheel, speed: f32) -> Result<()> {
        if speed == 0.0 {
            return self.stop(wheel);
        }
        let direction = if speed > 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        let duty = speed.abs().min(1.0).max(self.min_effective_duty);
        self.set_direction(wheel, direction)?;
        self.set_duty(wheel, duty)?;
        trace!(?wheel, ?direction, duty, "motor run");
        Ok(())
    }

    /// Cuts PWM drive and releases both bridge inputs on one wheel.
    pub fn stop(&mut self, wheel: Wheel) -> Result<()> {
        self.set_duty(wheel, 0.0)?;
        self.set_direction(wheel, Direction::Brake)?;
        trace!(?wheel, "motor stop");
        Ok(())
    }

    /// Stops both wheels, continuing past a failure on the first so the
    /// second still gets its stop command.
    pub fn stop_all(&mut self) -> Result<()> {
        let left = self.stop(Wheel::Left);
        let right = self.stop(Wheel::Right);
        left.and(right)
    }

    fn set_direction(&mut self, wheel: Wheel, direction: Direction) -> Result<()> {
        let (in1, in2) = match (wheel, direction) {
            // Mirrored mounting: forward is IN1 on the left, IN2 on the right.
            (Wheel::Left, Direction::Forward) => (true, false),
            (Wheel::Left, Direction::Reverse) => (false, true),
            (Wheel::Right, Direction::Forward) => (false, true),
            (Wheel::Right, Direction::Reverse) => (true, false),
            (_, Direction::Brake) => (false, false),
        };
        self.bridge
            .set_pins(wheel, in1, in2)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))?;
        Ok(())
    }

    fn set_duty(&mut self, wheel: Wheel, duty: f32) -> Result<()> {
        let period = self.pwm.period(wheel);
        // Active-low compare: off at `period`, full on at 0.
        let compare = period - (period as f32 * duty) as u32;
        self.pwm
            .set_compare(wheel, compare)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{SpyBridge, SpyPwm};

    const PERIOD: u32 = 1000;

    fn drive() -> MotorDrive<SpyBridge, SpyPwm> {
        MotorDrive::new(SpyBridge::new(), SpyPwm::new(PERIOD), &DriveCfg::default())
    }

    #[test]
    fn forward_is_mirrored_between_wheels() {
        let mut d = drive();
        d.run(Wheel::Left, 0.5).unwrap();
        d.run(Wheel::Right, 0.5).unwrap();
        assert_eq!(d.bridge.pins(Wheel::Left), (true, false));
        assert_eq!(d.bridge.pins(Wheel::Right), (false, true));
    }

    #[test]
    fn reverse_swaps_bridge_inputs() {
        let mut d = drive();
        d.run(Wheel::Left, -0.5).unwrap();
        assert_eq!(d.bridge.pins(Wheel::Left), (false, true));
    }

    #[test]
    fn duty_maps_to_inverted_compare() {
        let mut d = drive();
        d.run(Wheel::Left, 0.25).unwrap();
        assert_eq!(d.pwm.compare(Wheel::Left), 750);
        d.run(Wheel::Left, 1.0).unwrap();
        assert_eq!(d.pwm.compare(Wheel::Left), 0);
    }

    #[test]
    fn small_commands_are_boosted_to_minimum_duty() {
        let mut d = drive();
        d.run(Wheel::Left, 0.01).unwrap();
        // 10% floor: compare = 1000 - 100.
        assert_eq!(d.pwm.compare(Wheel::Left), 900);
        d.run(Wheel::Left, -0.01).unwrap();
        assert_eq!(d.pwm.compare(Wheel::Left), 900);
        assert_eq!(d.bridge.pins(Wheel::Left), (false, true));
    }

    #[test]
    fn overdrive_is_clamped_to_full_duty() {
        let mut d = drive();
        d.run(Wheel::Right, 1.5).unwrap();
        assert_eq!(d.pwm.compare(Wheel::Right), 0);
    }

    #[test]
    fn zero_speed_stops_the_wheel() {
        let mut d = drive();
        d.run(Wheel::Left, 0.8).unwrap();
        d.run(Wheel::Left, 0.0).unwrap();
        assert_eq!(d.pwm.compare(Wheel::Left), PERIOD);
        assert_eq!(d.bridge.pins(Wheel::Left), (false, false));
    }

    #[test]
    fn stop_all_reaches_both_wheels() {
        let mut d = drive();
        d.run(Wheel::Left, 0.5).unwrap();
        d.run(Wheel::Right, 0.5).unwrap();
        d.stop_all().unwrap();
        assert_eq!(d.bridge.pins(Wheel::Left), (false, false));
        assert_eq!(d.bridge.pins(Wheel::Right), (false, false));
    }
}
