use linebot_hardware::{SimConfig, SimulatedRobot};
use linebot_traits::{HBridge, Heading, Pwm, SensorBank, Wheel};
use rstest::rstest;

const DT_MS: u32 = 10;

fn full_forward(robot: &SimulatedRobot) {
    let mut bridge = robot.h_bridge();
    let mut pwm = robot.pwm();
    // Mirrored wiring: forward is (high, low) left, (low, high) right.
    bridge.set_pins(Wheel::Left, true, false).unwrap();
    bridge.set_pins(Wheel::Right, false, true).unwrap();
    pwm.set_compare(Wheel::Left, 0).unwrap();
    pwm.set_compare(Wheel::Right, 0).unwrap();
}

#[test]
fn idle_robot_emits_no_pulses_and_sees_center_line() {
    let robot = SimulatedRobot::new(SimConfig::default());
    let deltas = robot.step(DT_MS);
    assert_eq!(deltas, [0, 0]);

    let mut bank = robot.sensor_bank();
    // Active-low levels: only the center sensor reads low.
    assert_eq!(bank.read_levels().unwrap(), !0b0001000u8 & 0x7F);
}

#[test]
fn forward_duty_spins_wheels_up_to_max() {
    let robot = SimulatedRobot::new(SimConfig::default());
    full_forward(&robot);
    let mut total = [0i64; 2];
    for _ in 0..100 {
        let d = robot.step(DT_MS);
        total[0] += i64::from(d[0]);
        total[1] += i64::from(d[1]);
    }
    // 1 second at up to 100 pps with a 50 ms lag: most of the way there.
    assert!(total[0] > 80, "left pulses {}", total[0]);
    assert!(total[1] > 80, "right pulses {}", total[1]);
    // Straight-line drive keeps the compass steady.
    let h = robot.compass().heading_deg().unwrap();
    assert!(h.abs() < 1e-3, "heading drifted to {h}");
}

#[test]
fn differential_drive_rotates_the_compass() {
    let robot = SimulatedRobot::new(SimConfig::default());
    let mut bridge = robot.h_bridge();
    let mut pwm = robot.pwm();
    // Left forward, right reverse: clockwise rotation, heading falls.
    bridge.set_pins(Wheel::Left, true, false).unwrap();
    bridge.set_pins(Wheel::Right, true, false).unwrap();
    pwm.set_compare(Wheel::Left, 0).unwrap();
    pwm.set_compare(Wheel::Right, 0).unwrap();
    for _ in 0..5 {
        robot.step(DT_MS);
    }
    assert!(robot.compass().heading_deg().unwrap() < -1.0);
}

#[test]
fn compass_wraps_into_signed_half_circle() {
    let robot = SimulatedRobot::new(SimConfig::default());
    let mut bridge = robot.h_bridge();
    let mut pwm = robot.pwm();
    // Spin in place long enough to accumulate several full revolutions.
    bridge.set_pins(Wheel::Left, true, false).unwrap();
    bridge.set_pins(Wheel::Right, true, false).unwrap();
    pwm.set_compare(Wheel::Left, 0).unwrap();
    pwm.set_compare(Wheel::Right, 0).unwrap();
    for _ in 0..50 {
        robot.step(DT_MS);
    }
    assert!(robot.snapshot().heading_deg < -360.0);
    let h = robot.compass().heading_deg().unwrap();
    assert!(h > -180.0 && h <= 180.0, "unwrapped heading {h}");
}

#[rstest]
// Mirrored wiring: (low, high) reverses the left wheel but drives the
// right wheel forward.
#[case(Wheel::Left, false, true, -1)]
#[case(Wheel::Right, false, true, 1)]
#[case(Wheel::Left, true, false, 1)]
#[case(Wheel::Right, true, false, -1)]
fn pin_polarity_sets_pulse_sign(
    #[case] wheel: Wheel,
    #[case] in1: bool,
    #[case] in2: bool,
    #[case] sign: i64,
) {
    let robot = SimulatedRobot::new(SimConfig::default());
    robot.h_bridge().set_pins(wheel, in1, in2).unwrap();
    robot.pwm().set_compare(wheel, 0).unwrap();
    let mut total = 0i64;
    for _ in 0..100 {
        total += i64::from(robot.step(DT_MS)[wheel as usize]);
    }
    assert!(total * sign > 80, "pulses {total} for sign {sign}");
}

#[test]
fn corner_marker_appears_and_clears_after_pivot() {
    let robot = SimulatedRobot::new(SimConfig {
        side_pulses: 20.0,
        ..SimConfig::default()
    });
    full_forward(&robot);
    let mut bank = robot.sensor_bank();

    let mut saw_corner = false;
    for _ in 0..200 {
        robot.step(DT_MS);
        // Corner marker: the three left sensors all read low.
        if bank.read_levels().unwrap() & 0b111 == 0 {
            saw_corner = true;
            break;
        }
    }
    assert!(saw_corner, "corner marker never appeared");
    assert!(robot.snapshot().corner);

    // Pivot left: left wheel reverse, right wheel forward.
    let mut bridge = robot.h_bridge();
    bridge.set_pins(Wheel::Left, false, true).unwrap();
    let mut saw_dark = false;
    for _ in 0..500 {
        robot.step(DT_MS);
        // Mid-pivot the marker has swept out of view and nothing is seen.
        if bank.read_levels().unwrap() == 0x7F {
            saw_dark = true;
        }
        if !robot.snapshot().corner {
            break;
        }
    }
    assert!(saw_dark, "marker never swept out of view");
    let snap = robot.snapshot();
    assert!(!snap.corner, "corner marker never cleared");
    assert_eq!(snap.distance, 0.0);
    assert!(snap.heading_deg >= 85.0);
    // The new side's line sits left of center, under sensors 2 and 3.
    assert_eq!(bank.read_levels().unwrap(), !0b0001100u8 & 0x7F);
}

#[test]
fn pwm_compare_is_clamped_to_period() {
    let robot = SimulatedRobot::new(SimConfig::default());
    let mut pwm = robot.pwm();
    pwm.set_compare(Wheel::Left, 5_000).unwrap();
    assert_eq!(pwm.period(Wheel::Left), 1000);
    // Clamped to off: no motion follows.
    robot.h_bridge().set_pins(Wheel::Left, true, false).unwrap();
    for _ in 0..20 {
        assert_eq!(robot.step(DT_MS)[Wheel::Left as usize], 0);
    }
}
