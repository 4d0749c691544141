//! End-to-end checks of the cascaded drive loop against spy hardware.

use linebot_core::config::{DriveCfg, EncoderCfg, SensorCfg};
use linebot_core::drive::{DriveController, DriveMode};
use linebot_core::encoder::{Encoders, Phase};
use linebot_core::line_sensor::LineSensorArray;
use linebot_core::mocks::{FixedHeading, SharedBank, SpyBridge, SpyPwm};
use linebot_core::motor::MotorDrive;
use linebot_traits::Wheel;

const PERIOD: u32 = 1000;
const CENTER: u8 = 0b0001000;

struct Rig {
    drive: DriveController<SharedBank, SpyBridge, SpyPwm, FixedHeading>,
    bank: SharedBank,
    bridge: SpyBridge,
    pwm: SpyPwm,
    encoders: Encoders,
}

fn rig(initial_level: u8) -> Rig {
    let cfg = DriveCfg::default();
    let bank = SharedBank::new(initial_level);
    let bridge = SpyBridge::new();
    let pwm = SpyPwm::new(PERIOD);
    let encoders = Encoders::new(EncoderCfg::default());
    let sensors = LineSensorArray::new(
        bank.clone(),
        SensorCfg {
            active_low: false,
            ..SensorCfg::default()
        },
    );
    let motors = MotorDrive::new(bridge.clone(), pwm.clone(), &cfg);
    let drive = DriveController::new(
        sensors,
        motors,
        FixedHeading::new(0.0),
        encoders.clone(),
        cfg,
    );
    Rig {
        drive,
        bank,
        bridge,
        pwm,
        encoders,
    }
}

#[test]
fn stationary_follower_drives_both_wheels_forward() {
    let mut r = rig(CENTER);
    r.drive.set_mode(DriveMode::LineFollowing).unwrap();
    r.drive.control_tick().unwrap();
    assert_eq!(r.bridge.pins(Wheel::Left), (true, false));
    assert_eq!(r.bridge.pins(Wheel::Right), (false, true));
    assert!(r.pwm.compare(Wheel::Left) < PERIOD);
    assert!(r.pwm.compare(Wheel::Right) < PERIOD);
}

#[test]
fn centered_line_holds_base_speed_for_a_hundred_ticks() {
    let mut r = rig(CENTER);
    r.drive.set_mode(DriveMode::LineFollowing).unwrap();
    let base = DriveCfg::default().base_speed;

    let mut compares = Vec::new();
    for _ in 0..100 {
        r.drive.control_tick().unwrap();
        assert_eq!(r.drive.wheel_target(Wheel::Left), base);
        assert_eq!(r.drive.wheel_target(Wheel::Right), base);
        compares.push((r.pwm.compare(Wheel::Left), r.pwm.compare(Wheel::Right)));
    }

    // Both wheels forward throughout, and the inner loop settles on one
    // steady command strictly inside the duty range.
    assert_eq!(r.bridge.pins(Wheel::Left), (true, false));
    assert_eq!(r.bridge.pins(Wheel::Right), (false, true));
    let steady = compares[99];
    assert_eq!(compares[50], steady);
    assert_eq!(steady.0, steady.1);
    assert!(steady.0 > 0 && steady.0 < PERIOD);
}

#[test]
fn line_offset_steers_differentially() {
    // Line under the right side of the array: the correction slows the
    // right wheel and speeds up the left one.
    let mut r = rig(0b1110000);
    r.drive.set_mode(DriveMode::LineFollowing).unwrap();
    r.drive.control_tick().unwrap();
    assert!(
        r.pwm.compare(Wheel::Left) < r.pwm.compare(Wheel::Right),
        "left duty should exceed right duty"
    );
}

#[test]
fn overspeeding_wheel_is_driven_in_reverse() {
    let mut r = rig(CENTER);
    r.drive.set_mode(DriveMode::LineFollowing).unwrap();
    // 5 pulses inside one 10 ms window reads as 500 pps, far above the
    // 50 pps target, so the inner loop saturates negative.
    for _ in 0..5 {
        r.encoders.on_edge(Wheel::Left, Phase::A, true, true);
    }
    r.drive.control_tick().unwrap();
    assert_eq!(r.bridge.pins(Wheel::Left), (false, true));
    assert_eq!(r.pwm.compare(Wheel::Left), 0);
}

#[test]
fn stop_mode_issues_no_motor_commands() {
    let mut r = rig(CENTER);
    r.drive.control_tick().unwrap();
    assert_eq!(r.pwm.compare(Wheel::Left), PERIOD);
    assert_eq!(r.pwm.compare(Wheel::Right), PERIOD);
}

#[test]
fn stopping_mid_run_cuts_motor_drive() {
    let mut r = rig(CENTER);
    r.drive.set_mode(DriveMode::LineFollowing).unwrap();
    r.drive.control_tick().unwrap();
    assert!(r.pwm.compare(Wheel::Left) < PERIOD);

    r.drive.set_mode(DriveMode::Stop).unwrap();
    assert_eq!(r.pwm.compare(Wheel::Left), PERIOD);
    assert_eq!(r.pwm.compare(Wheel::Right), PERIOD);
    assert_eq!(r.bridge.pins(Wheel::Left), (false, false));
    assert_eq!(r.bridge.pins(Wheel::Right), (false, false));
}

#[test]
fn lost_line_keeps_last_correction() {
    let mut r = rig(0b1000000);
    r.drive.set_mode(DriveMode::LineFollowing).unwrap();
    r.drive.control_tick().unwrap();
    let left_before = r.drive.wheel_target(Wheel::Left);
    let right_before = r.drive.wheel_target(Wheel::Right);
    assert!(left_before > right_before);

    // Line gone: the held position keeps steering in the same direction
    // instead of snapping straight.
    r.bank.set(0);
    r.drive.control_tick().unwrap();
    assert!(r.drive.wheel_target(Wheel::Left) > r.drive.wheel_target(Wheel::Right));
}
