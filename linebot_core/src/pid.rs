//! Positional PID controller with clamped integral and conditional
//! anti-windup.

use crate::config::PidGains;

/// A single positional PID loop.
///
/// `calculate` returns the clamped output; the integral term is only
/// committed when it can still push the output in a useful direction, so a
/// saturated actuator does not wind the accumulator up.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    target: f32,
    integral: f32,
    last_error: f32,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            target: 0.0,
            integral: 0.0,
            last_error: 0.0,
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    /// Clears the integral accumulator and derivative history. The target is
    /// left untouched.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    /// Runs one control step against `actual` and returns the clamped output.
    pub fn calculate(&mut self, actual: f32) -> f32 {
        let error = self.target - actual;

        let candidate = clamp_sym(self.integral + error, self.gains.integral_limit);

        let raw = self.gains.kp * error
            + self.gains.ki * candidate
            + self.gains.kd * (error - self.last_error);
        let output = clamp_sym(raw, self.gains.output_limit);

        // Commit the integral candidate unless the output is saturated and the
        // integral term is pushing further into saturation. The strict
        // comparison freezes the accumulator exactly at the boundary value, so
        // a sign-matched overshoot starts draining it on the very next step.
        let integral_contribution = self.gains.ki * candidate;
        if raw == output || integral_contribution * output <= 0.0 {
            self.integral = candidate;
        }

        self.last_error = error;
        output
    }
}

fn clamp_sym(value: f32, limit: f32) -> f32 {
    value.clamp(-limit, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains(kp: f32, ki: f32, kd: f32, il: f32, ol: f32) -> PidGains {
        PidGains {
            kp,
            ki,
            kd,
            integral_limit: il,
            output_limit: ol,
        }
    }

    #[test]
    fn proportional_only_tracks_error() {
        let mut pid = Pid::new(gains(2.0, 0.0, 0.0, 100.0, 1000.0));
        pid.set_target(10.0);
        assert_eq!(pid.calculate(4.0), 12.0);
        assert_eq!(pid.calculate(10.0), 0.0);
    }

    #[test]
    fn output_is_clamped_symmetrically() {
        let mut pid = Pid::new(gains(10.0, 0.0, 0.0, 100.0, 50.0));
        pid.set_target(100.0);
        assert_eq!(pid.calculate(0.0), 50.0);
        pid.set_target(-100.0);
        assert_eq!(pid.calculate(0.0), -50.0);
    }

    #[test]
    fn derivative_sees_error_delta() {
        let mut pid = Pid::new(gains(0.0, 0.0, 1.0, 100.0, 1000.0));
        pid.set_target(0.0);
        assert_eq!(pid.calculate(-5.0), 5.0);
        // Same error again, no change.
        assert_eq!(pid.calculate(-5.0), 0.0);
    }

    #[test]
    fn integral_saturates_at_limit_under_constant_error() {
        let mut pid = Pid::new(gains(0.0, 1.0, 0.0, 20.0, 1000.0));
        pid.set_target(10.0);
        for _ in 0..10 {
            pid.calculate(0.0);
        }
        // 10 per step, clamped at 20: output stays pinned there.
        assert_eq!(pid.calculate(0.0), 20.0);
    }

    #[test]
    fn saturated_output_freezes_integral_windup() {
        let mut pid = Pid::new(gains(1.0, 1.0, 0.0, 100.0, 10.0));
        pid.set_target(50.0);
        // Output saturates from the first step; the accumulator must not
        // creep up behind it.
        for _ in 0..5 {
            assert_eq!(pid.calculate(0.0), 10.0);
        }
        assert_eq!(pid.integral, 0.0);
    }

    #[test]
    fn integral_unwinds_when_pushing_against_saturation() {
        let mut pid = Pid::new(gains(10.0, 1.0, 0.0, 100.0, 20.0));
        // Build up a negative accumulator while unsaturated.
        pid.set_target(-1.0);
        for _ in 0..5 {
            pid.calculate(0.0);
        }
        assert_eq!(pid.integral, -5.0);
        // Proportional term now pins the output at +20; the negative
        // integral opposes it, so it is allowed to drain.
        pid.set_target(3.0);
        assert_eq!(pid.calculate(0.0), 20.0);
        assert_eq!(pid.integral, -2.0);
    }

    #[test]
    fn sign_matched_overshoot_drains_the_accumulator() {
        let mut pid = Pid::new(gains(0.0, 1.0, 0.0, 100.0, 20.0));
        pid.set_target(10.0);
        for _ in 0..5 {
            pid.calculate(0.0);
        }
        // Frozen exactly at the saturation boundary, not past it.
        assert_eq!(pid.integral, 20.0);
        // Overshoot with the error flipped: the accumulator drains one error
        // per step instead of staying pinned behind the clamp.
        pid.set_target(0.0);
        assert_eq!(pid.calculate(10.0), 10.0);
        assert_eq!(pid.integral, 10.0);
        assert_eq!(pid.calculate(10.0), 0.0);
        assert_eq!(pid.integral, 0.0);
    }

    #[test]
    fn reset_clears_state_but_keeps_target() {
        let mut pid = Pid::new(gains(1.0, 1.0, 1.0, 100.0, 1000.0));
        pid.set_target(7.0);
        pid.calculate(0.0);
        pid.reset();
        assert_eq!(pid.target(), 7.0);
        // First step after reset behaves like a fresh controller.
        assert_eq!(pid.calculate(0.0), 7.0 + 7.0 + 7.0);
    }
}
