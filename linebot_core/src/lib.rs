#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core motion-control logic for a differential-drive line follower
//! (hardware-agnostic).
//!
//! All hardware interactions go through the traits in `linebot_traits`:
//! `SensorBank`, `HBridge`, `Pwm`, and `Heading`.
//!
//! ## Architecture
//!
//! - **Encoders**: quadrature counting and windowed velocity (`encoder`)
//! - **Line sensing**: weighted position and geometric classification
//!   (`line_sensor`)
//! - **Control**: positional PID loops (`pid`) cascaded by the drive
//!   orchestrator (`drive`)
//! - **Actuation**: H-bridge direction plus inverted-compare PWM (`motor`)
//! - **Maneuvers**: corner detection (`turn_detect`) and the square
//!   traversal sequencer (`sequencer`)
//!
//! The stack is deterministic: all timing flows in as millisecond ticks, so
//! every state machine can be driven tick by tick in tests.

pub mod config;
pub mod drive;
pub mod encoder;
pub mod error;
pub mod line_sensor;
pub mod mocks;
pub mod motor;
pub mod pid;
pub mod sequencer;
pub mod turn_detect;

pub use config::{DriveCfg, EncoderCfg, PidGains, SensorCfg, SquareCfg, TurnCfg};
pub use drive::{DriveController, DriveMode, wrap_deg};
pub use encoder::{Encoders, Phase};
pub use error::{DriveError, Result};
pub use line_sensor::{LineReading, LineSensorArray, LineState, SENSOR_COUNT, WEIGHTS};
pub use motor::MotorDrive;
pub use pid::Pid;
pub use sequencer::{SquarePhase, SquareSequencer, TurnOutcome};
pub use turn_detect::{TurnDetection, TurnState};
