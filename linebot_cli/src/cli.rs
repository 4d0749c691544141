//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "linebot", version, about = "Line follower CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/linebot.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to the
    /// config's [logging] level, or "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Traverse the square course: follow the line, pivot at each corner
    Square {
        /// Sides to complete (takes precedence over config)
        #[arg(long)]
        sides: Option<u32>,
        /// Base speed between corners, pulses per second
        #[arg(long, value_name = "PPS")]
        line_speed: Option<f32>,
        /// Outer-wheel speed during the pivot, pulses per second
        #[arg(long, value_name = "PPS")]
        turn_speed: Option<f32>,
        /// Abort the run after this much time
        #[arg(long, value_name = "MS")]
        max_run_ms: Option<u64>,
        /// Print per-side progress lines while running
        #[arg(long, action = ArgAction::SetTrue)]
        progress: bool,
    },
    /// Follow the line for a fixed duration
    Follow {
        /// How long to run
        #[arg(long, value_name = "MS", default_value_t = 5_000)]
        duration_ms: u32,
        /// Base speed, pulses per second
        #[arg(long, value_name = "PPS")]
        base_speed: Option<f32>,
    },
    /// Sample the sensor array and print the classified readings
    Sensors {
        /// Number of samples to take
        #[arg(long, default_value_t = 10)]
        samples: u32,
    },
    /// Quick health check (config parses, control stack assembles)
    SelfCheck,
}
