//! Square traversal maneuver: follow the line, pivot left at each detected
//! corner, repeat for a fixed number of sides.
//!
//! The sequencer is step-driven. The owning loop calls [`SquareSequencer::step`]
//! once per control period with the current tick; every wait is expressed as
//! a phase with a deadline, so a step never blocks.

use tracing::{debug, info, warn};

use crate::config::SquareCfg;
use crate::drive::{DriveController, DriveMode};
use crate::error::Result;
use crate::turn_detect::TurnDetection;
use linebot_traits::{HBridge, Heading, Pwm, SensorBank};

/// Bit for the mid-left sensor, whose reacquisition ends a pivot.
const TURN_EXIT_SENSOR: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquarePhase {
    /// Following the line towards the next corner.
    LineFollowing,
    /// Stopped, letting the chassis come to rest before pivoting.
    Pausing,
    /// Pivoting left until the line is reacquired.
    Turning,
    /// Pivot done, waiting for oscillations to die down.
    Settling,
    /// All sides done, motors off for good.
    Completed,
}

/// How one corner pivot ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The mid-left sensor reacquired the line.
    Reacquired,
    /// The pivot was abandoned after the timeout.
    TimedOut,
}

#[derive(Debug)]
pub struct SquareSequencer {
    cfg: SquareCfg,
    turns: TurnDetection,
    phase: SquarePhase,
    completed_sides: u32,
    phase_start: u32,
    outcomes: Vec<TurnOutcome>,
}

impl SquareSequencer {
    pub fn new(cfg: SquareCfg, turns: TurnDetection) -> Self {
        Self {
            cfg,
            turns,
            phase: SquarePhase::Completed,
            completed_sides: 0,
            phase_start: 0,
            outcomes: Vec::new(),
        }
    }

    /// Puts the drive into line following and arms the sequencer.
    pub fn start<S, B, P, H>(
        &mut self,
        drive: &mut DriveController<S, B, P, H>,
        now_ms: u32,
    ) -> Result<()>
    where
        S: SensorBank,
        B: HBridge,
        P: Pwm,
        H: Heading,
    {
        self.phase = SquarePhase::LineFollowing;
        self.completed_sides = 0;
        self.phase_start = now_ms;
        self.outcomes.clear();
        drive.set_base_speed(self.cfg.line_speed);
        drive.set_mode(DriveMode::LineFollowing)?;
        info!(sides = self.cfg.sides, "square traversal started");
        Ok(())
    }

    /// Runs one sequencer step followed by one drive control tick.
    ///
    /// Returns the phase in effect after the step.
    pub fn step<S, B, P, H>(
        &mut self,
        drive: &mut DriveController<S, B, P, H>,
        now_ms: u32,
    ) -> Result<SquarePhase>
    where
        S: SensorBank,
        B: HBridge,
        P: Pwm,
        H: Heading,
    {
        let reading = drive.sense()?;
        self.turns.update(reading.bits, now_ms);

        match self.phase {
            SquarePhase::LineFollowing => {
                if self.turns.is_turn_ready() {
                    drive.set_mode(DriveMode::Stop)?;
                    self.enter(SquarePhase::Pausing, now_ms);
                }
            }
            SquarePhase::Pausing => {
                if now_ms.wrapping_sub(self.phase_start) >= self.cfg.pause_ms {
                    // Left pivot: inner wheel backs up at half speed while
                    // the outer wheel drives forward.
                    drive.set_mode(DriveMode::SpeedTarget)?;
                    drive.set_wheel_targets(-self.cfg.turn_speed * 0.5, self.cfg.turn_speed);
                    self.enter(SquarePhase::Turning, now_ms);
                }
            }
            SquarePhase::Turning => {
                if reading.bits & TURN_EXIT_SENSOR != 0 {
                    self.finish_turn(drive, TurnOutcome::Reacquired, now_ms)?;
                } else if now_ms.wrapping_sub(self.phase_start) > self.cfg.turn_timeout_ms {
                    warn!(side = self.completed_sides + 1, "pivot timed out before reacquiring line");
                    self.finish_turn(drive, TurnOutcome::TimedOut, now_ms)?;
                }
            }
            SquarePhase::Settling => {
                if now_ms.wrapping_sub(self.phase_start) >= self.cfg.settle_ms {
                    self.completed_sides += 1;
                    if self.completed_sides >= self.cfg.sides {
                        drive.set_mode(DriveMode::Stop)?;
                        self.enter(SquarePhase::Completed, now_ms);
                        info!(sides = self.completed_sides, "square traversal completed");
                    } else {
                        drive.set_base_speed(self.cfg.line_speed);
                        drive.set_mode(DriveMode::LineFollowing)?;
                        self.enter(SquarePhase::LineFollowing, now_ms);
                    }
                }
            }
            SquarePhase::Completed => {}
        }

        drive.control_tick()?;
        Ok(self.phase)
    }

    fn finish_turn<S, B, P, H>(
        &mut self,
        drive: &mut DriveController<S, B, P, H>,
        outcome: TurnOutcome,
        now_ms: u32,
    ) -> Result<()>
    where
        S: SensorBank,
        B: HBridge,
        P: Pwm,
        H: Heading,
    {
        drive.set_mode(DriveMode::Stop)?;
        self.turns.reset(now_ms);
        self.outcomes.push(outcome);
        debug!(side = self.completed_sides + 1, ?outcome, "pivot finished");
        self.enter(SquarePhase::Settling, now_ms);
        Ok(())
    }

    fn enter(&mut self, phase: SquarePhase, now_ms: u32) {
        debug!(from = ?self.phase, to = ?phase, now_ms, "square phase change");
        self.phase = phase;
        self.phase_start = now_ms;
    }

    pub fn phase(&self) -> SquarePhase {
        self.phase
    }

    /// Sides finished so far, pivot included.
    pub fn completed_sides(&self) -> u32 {
        self.completed_sides
    }

    /// Outcome of every pivot attempted so far, in order.
    pub fn outcomes(&self) -> &[TurnOutcome] {
        &self.outcomes
    }

    pub fn turns(&self) -> &TurnDetection {
        &self.turns
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SquarePhase::Completed
    }
}
