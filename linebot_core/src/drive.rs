//! Drive orchestrator: outer guidance loops cascaded into per-wheel speed
//! loops.

use tracing::{debug, trace};

use crate::config::DriveCfg;
use crate::encoder::Encoders;
use crate::error::Result;
use crate::line_sensor::{LineReading, LineSensorArray};
use crate::motor::MotorDrive;
use crate::pid::Pid;
use linebot_traits::{HBridge, Heading, Pwm, SensorBank, Wheel};

/// What the outer guidance loop is steering towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// Motors off, no control action.
    #[default]
    Stop,
    /// Steer to keep the weighted line position at zero.
    LineFollowing,
    /// Steer to hold a compass heading.
    HeadingHold,
    /// Wheel speed targets are set externally (pivots, scripted moves).
    SpeedTarget,
    /// Both wheels run at base speed, no feedback on the outer loop.
    Manual,
}

/// Cascaded drive controller.
///
/// One `update` runs the outer loop for the current mode to produce per-wheel
/// speed targets, then closes the inner speed loop on each wheel against the
/// latest encoder velocities. Call [`DriveController::control_tick`] at the
/// encoder window cadence; it samples velocities first so the inner loop
/// never acts on stale data.
#[derive(Debug)]
pub struct DriveController<S, B, P, H> {
    sensors: LineSensorArray<S>,
    motors: MotorDrive<B, P>,
    compass: H,
    encoders: Encoders,
    cfg: DriveCfg,
    mode: DriveMode,
    line_pid: Pid,
    heading_pid: Pid,
    speed_pids: [Pid; 2],
    wheel_targets: [f32; 2],
    heading_target: f32,
    base_speed: f32,
    last_reading: Option<LineReading>,
    pending_reading: Option<LineReading>,
}

impl<S, B, P, H> DriveController<S, B, P, H>
where
    S: SensorBank,
    B: HBridge,
    P: Pwm,
    H: Heading,
{
    pub fn new(
        sensors: LineSensorArray<S>,
        motors: MotorDrive<B, P>,
        compass: H,
        encoders: Encoders,
        cfg: DriveCfg,
    ) -> Self {
        let mut line_pid = Pid::new(cfg.line_pid);
        line_pid.set_target(0.0);
        let mut heading_pid = Pid::new(cfg.heading_pid);
        heading_pid.set_target(0.0);
        let speed_pids = [Pid::new(cfg.speed_pid), Pid::new(cfg.speed_pid)];
        let base_speed = cfg.base_speed;
        Self {
            sensors,
            motors,
            compass,
            encoders,
            cfg,
            mode: DriveMode::Stop,
            line_pid,
            heading_pid,
            speed_pids,
            wheel_targets: [0.0; 2],
            heading_target: 0.0,
            base_speed,
            last_reading: None,
            pending_reading: None,
        }
    }

    /// Takes one sensor reading and holds it for the next `update`, so an
    /// outer state machine and the line-following loop share a single sample
    /// per tick.
    pub fn sense(&mut self) -> Result<LineReading> {
        let reading = self.sensors.read()?;
        self.last_reading = Some(reading);
        self.pending_reading = Some(reading);
        Ok(reading)
    }

    /// Samples encoder velocities, then runs one control update.
    pub fn control_tick(&mut self) -> Result<()> {
        self.encoders.sample_velocity();
        self.update()
    }

    /// Runs the outer loop for the current mode, then the inner speed loops.
    pub fn update(&mut self) -> Result<()> {
        match self.mode {
            DriveMode::Stop => return Ok(()),
            DriveMode::LineFollowing => self.update_line_following()?,
            DriveMode::HeadingHold => self.update_heading_hold()?,
            DriveMode::SpeedTarget => {}
            DriveMode::Manual => {
                self.wheel_targets[Wheel::Left as usize] = self.base_speed;
                self.wheel_targets[Wheel::Right as usize] =
                    self.base_speed * self.cfg.balance_factor;
            }
        }
        self.update_speed_loops()
    }

    fn update_line_following(&mut self) -> Result<()> {
        let reading = match self.pending_reading.take() {
            Some(r) => r,
            None => {
                let r = self.sensors.read()?;
                self.last_reading = Some(r);
                r
            }
        };
        let correction = self.line_pid.calculate(f32::from(reading.position));
        // Normalize the correction against its own clamp so a full-scale
        // correction steers one wheel to zero and the other to double base.
        let ratio = correction / self.cfg.line_pid.output_limit;
        let left = self.base_speed * (1.0 - ratio);
        let right = self.base_speed * (1.0 + ratio) * self.cfg.balance_factor;
        self.wheel_targets[Wheel::Left as usize] = left.clamp(0.0, self.cfg.max_speed);
        self.wheel_targets[Wheel::Right as usize] = right.clamp(0.0, self.cfg.max_speed);
        trace!(position = reading.position, correction, "line follow step");
        Ok(())
    }

    fn update_heading_hold(&mut self) -> Result<()> {
        let heading = self
            .compass
            .heading_deg()
            .map_err(|e| eyre::Report::new(crate::error::map_hw_error_dyn(&*e)))?;
        let err = wrap_deg(self.heading_target - heading);
        // PID target is zero, so feeding the negated error recovers it as the
        // loop error with the right sign.
        let correction = self.heading_pid.calculate(-err);
        let left = self.base_speed - correction;
        let right = (self.base_speed + correction) * self.cfg.balance_factor;
        let limit = self.cfg.max_speed;
        self.wheel_targets[Wheel::Left as usize] = left.clamp(-limit, limit);
        self.wheel_targets[Wheel::Right as usize] = right.clamp(-limit, limit);
        trace!(heading, err, correction, "heading hold step");
        Ok(())
    }

    fn update_speed_loops(&mut self) -> Result<()> {
        for wheel in Wheel::ALL {
            let idx = wheel as usize;
            self.speed_pids[idx].set_target(self.wheel_targets[idx]);
            let actual = self.encoders.velocity(wheel);
            let out = self.speed_pids[idx]
                .calculate(actual)
                .clamp(-self.cfg.max_speed, self.cfg.max_speed);
            self.motors.run(wheel, out / self.cfg.max_speed)?;
        }
        Ok(())
    }

    /// Switches mode. Entering `Stop` halts both motors and resets every
    /// loop so stale integrator state cannot kick on the next start.
    pub fn set_mode(&mut self, mode: DriveMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }
        debug!(from = ?self.mode, to = ?mode, "drive mode change");
        self.mode = mode;
        if mode == DriveMode::Stop {
            self.motors.stop_all()?;
            self.reset_loops();
        }
        Ok(())
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Sets the nominal forward speed, clamped to [0, max].
    pub fn set_base_speed(&mut self, speed: f32) {
        self.base_speed = speed.clamp(0.0, self.cfg.max_speed);
    }

    pub fn base_speed(&self) -> f32 {
        self.base_speed
    }

    pub fn set_heading_target(&mut self, degrees: f32) {
        self.heading_target = wrap_deg(degrees);
    }

    /// Sets explicit per-wheel targets for `SpeedTarget` mode, clamped
    /// symmetrically.
    pub fn set_wheel_targets(&mut self, left: f32, right: f32) {
        let limit = self.cfg.max_speed;
        self.wheel_targets[Wheel::Left as usize] = left.clamp(-limit, limit);
        self.wheel_targets[Wheel::Right as usize] = right.clamp(-limit, limit);
    }

    pub fn wheel_target(&self, wheel: Wheel) -> f32 {
        self.wheel_targets[wheel as usize]
    }

    /// Most recent line reading taken by the outer loop, if any.
    pub fn last_reading(&self) -> Option<LineReading> {
        self.last_reading
    }

    pub fn encoders(&self) -> &Encoders {
        &self.encoders
    }

    fn reset_loops(&mut self) {
        self.line_pid.reset();
        self.heading_pid.reset();
        for pid in &mut self.speed_pids {
            pid.reset();
        }
    }
}

/// Wraps an angle difference to the shortest signed arc in (-180, 180].
pub fn wrap_deg(mut deg: f32) -> f32 {
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg <= -180.0 {
        deg += 360.0;
    }
    deg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderCfg;
    use crate::config::SensorCfg;
    use crate::mocks::{FixedHeading, ScriptedBank, SpyBridge, SpyPwm};
    use rstest::rstest;

    fn controller(levels: Vec<u8>) -> DriveController<ScriptedBank, SpyBridge, SpyPwm, FixedHeading> {
        controller_with_heading(levels, 0.0)
    }

    fn controller_with_heading(
        levels: Vec<u8>,
        heading: f32,
    ) -> DriveController<ScriptedBank, SpyBridge, SpyPwm, FixedHeading> {
        let cfg = DriveCfg::default();
        let sensors = LineSensorArray::new(
            ScriptedBank::new(levels),
            SensorCfg {
                active_low: false,
                ..SensorCfg::default()
            },
        );
        let motors = MotorDrive::new(SpyBridge::new(), SpyPwm::new(1000), &cfg);
        DriveController::new(
            sensors,
            motors,
            FixedHeading::new(heading),
            Encoders::new(EncoderCfg::default()),
            cfg,
        )
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(190.0, -170.0)]
    #[case(-190.0, 170.0)]
    #[case(540.0, 180.0)]
    #[case(-180.0, 180.0)]
    #[case(180.0, 180.0)]
    fn wrap_deg_shortest_arc(#[case] input: f32, #[case] expected: f32) {
        assert_eq!(wrap_deg(input), expected);
    }

    #[test]
    fn stop_mode_takes_no_control_action() {
        let mut c = controller(vec![0b0001000]);
        c.update().unwrap();
        assert_eq!(c.wheel_target(Wheel::Left), 0.0);
        assert!(c.last_reading().is_none());
    }

    #[test]
    fn centered_line_drives_both_wheels_at_base_speed() {
        let mut c = controller(vec![0b0001000]);
        c.set_mode(DriveMode::LineFollowing).unwrap();
        c.update().unwrap();
        assert_eq!(c.wheel_target(Wheel::Left), 50.0);
        assert_eq!(c.wheel_target(Wheel::Right), 50.0);
    }

    #[test]
    fn line_to_the_right_speeds_up_left_wheel() {
        // Rightmost sensor active: position +30, correction positive, the
        // differential slows the left wheel and speeds the right one in the
        // sign convention where position error steers toward the line.
        let mut c = controller(vec![0b1000000]);
        c.set_mode(DriveMode::LineFollowing).unwrap();
        c.update().unwrap();
        let left = c.wheel_target(Wheel::Left);
        let right = c.wheel_target(Wheel::Right);
        assert!(left > right, "left {left} should exceed right {right}");
    }

    #[test]
    fn line_targets_never_go_negative() {
        let mut c = controller(vec![0b1000000; 50]);
        c.set_mode(DriveMode::LineFollowing).unwrap();
        for _ in 0..50 {
            c.update().unwrap();
        }
        assert!(c.wheel_target(Wheel::Right) >= 0.0);
    }

    #[test]
    fn heading_hold_is_symmetric_at_target() {
        let mut c = controller_with_heading(vec![], 90.0);
        c.set_mode(DriveMode::HeadingHold).unwrap();
        c.set_heading_target(90.0);
        c.update().unwrap();
        assert_eq!(c.wheel_target(Wheel::Left), 50.0);
        assert_eq!(c.wheel_target(Wheel::Right), 50.0);
    }

    #[test]
    fn heading_error_takes_the_short_way_round() {
        // Heading 350, target 10: shortest arc is +20 degrees, a left-hand
        // correction, so the right wheel gets the larger target.
        let mut c = controller_with_heading(vec![], 350.0);
        c.set_mode(DriveMode::HeadingHold).unwrap();
        c.set_heading_target(10.0);
        c.update().unwrap();
        assert!(c.wheel_target(Wheel::Right) > c.wheel_target(Wheel::Left));
    }

    #[test]
    fn manual_mode_applies_balance_factor() {
        let mut cfg = DriveCfg::default();
        cfg.balance_factor = 0.9;
        let sensors = LineSensorArray::new(ScriptedBank::new(vec![]), SensorCfg::default());
        let motors = MotorDrive::new(SpyBridge::new(), SpyPwm::new(1000), &cfg);
        let mut c = DriveController::new(
            sensors,
            motors,
            FixedHeading::new(0.0),
            Encoders::new(EncoderCfg::default()),
            cfg,
        );
        c.set_mode(DriveMode::Manual).unwrap();
        c.update().unwrap();
        assert_eq!(c.wheel_target(Wheel::Left), 50.0);
        assert_eq!(c.wheel_target(Wheel::Right), 45.0);
    }

    #[test]
    fn speed_target_mode_uses_external_targets() {
        let mut c = controller(vec![]);
        c.set_mode(DriveMode::SpeedTarget).unwrap();
        c.set_wheel_targets(-2.5, 5.0);
        c.update().unwrap();
        assert_eq!(c.wheel_target(Wheel::Left), -2.5);
        assert_eq!(c.wheel_target(Wheel::Right), 5.0);
    }

    #[test]
    fn wheel_targets_are_clamped_to_max_speed() {
        let mut c = controller(vec![]);
        c.set_wheel_targets(500.0, -500.0);
        assert_eq!(c.wheel_target(Wheel::Left), 100.0);
        assert_eq!(c.wheel_target(Wheel::Right), -100.0);
    }

    #[test]
    fn base_speed_is_clamped_nonnegative() {
        let mut c = controller(vec![]);
        c.set_base_speed(-10.0);
        assert_eq!(c.base_speed(), 0.0);
        c.set_base_speed(250.0);
        assert_eq!(c.base_speed(), 100.0);
    }

    #[test]
    fn entering_stop_resets_loop_state() {
        let mut c = controller(vec![0b1000000, 0b0001000]);
        c.set_mode(DriveMode::LineFollowing).unwrap();
        c.update().unwrap();
        c.set_mode(DriveMode::Stop).unwrap();
        c.set_mode(DriveMode::LineFollowing).unwrap();
        // Centered reading after the reset: no derivative kick from the old
        // offset, both targets back at base.
        c.update().unwrap();
        assert_eq!(c.wheel_target(Wheel::Left), 50.0);
        assert_eq!(c.wheel_target(Wheel::Right), 50.0);
    }
}
