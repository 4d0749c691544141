//! Command execution: config mapping, rig assembly, and the run loops.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::WrapErr;
use tracing::{info, warn};

use linebot_config::Config;
use linebot_core::{
    DriveController, DriveMode, Encoders, LineReading, LineSensorArray, MotorDrive, Phase,
    SquareSequencer, TurnDetection, TurnOutcome,
    error::DriveError,
};
use linebot_hardware::{SimCompass, SimConfig, SimHBridge, SimPwm, SimSensorBank, SimulatedRobot};
use linebot_traits::clock::{Clock, ManualClock};
use linebot_traits::{Display, HBridge, Heading, Pwm, SensorBank, Wheel};

pub fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    let cfg = linebot_config::load_toml(&text)
        .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn pid_gains(p: &linebot_config::PidCfg) -> linebot_core::PidGains {
    linebot_core::PidGains {
        kp: p.kp,
        ki: p.ki,
        kd: p.kd,
        integral_limit: p.integral_limit,
        output_limit: p.output_limit,
    }
}

pub fn drive_cfg(cfg: &Config) -> linebot_core::DriveCfg {
    linebot_core::DriveCfg {
        line_pid: pid_gains(&cfg.pid.line),
        heading_pid: pid_gains(&cfg.pid.heading),
        speed_pid: pid_gains(&cfg.pid.speed),
        base_speed: cfg.control.base_speed,
        balance_factor: cfg.control.balance_factor,
        max_speed: cfg.control.max_speed,
        min_effective_duty: cfg.control.min_effective_duty,
    }
}

pub fn encoder_cfg(cfg: &Config) -> linebot_core::EncoderCfg {
    linebot_core::EncoderCfg {
        window_ms: cfg.encoder.window_ms,
    }
}

pub fn sensor_cfg(cfg: &Config) -> linebot_core::SensorCfg {
    linebot_core::SensorCfg {
        active_low: cfg.sensors.active_low,
        position_threshold: cfg.sensors.position_threshold,
    }
}

pub fn turn_cfg(cfg: &Config) -> linebot_core::TurnCfg {
    linebot_core::TurnCfg {
        min_count: cfg.turn.min_count,
        quick_confirm_count: cfg.turn.quick_confirm_count,
        stable_ms: cfg.turn.stable_ms,
        detect_timeout_ms: cfg.turn.detect_timeout_ms,
        inhibit_ms: cfg.turn.inhibit_ms,
    }
}

pub fn square_cfg(cfg: &Config) -> linebot_core::SquareCfg {
    linebot_core::SquareCfg {
        sides: cfg.square.sides,
        line_speed: cfg.square.line_speed,
        turn_speed: cfg.square.turn_speed,
        pause_ms: cfg.square.pause_ms,
        settle_ms: cfg.square.settle_ms,
        turn_timeout_ms: cfg.square.turn_timeout_ms,
    }
}

pub type SimDrive = DriveController<SimSensorBank, SimHBridge, SimPwm, SimCompass>;

/// The simulated chassis plus the control stack wired onto it.
pub struct SimRig {
    pub robot: SimulatedRobot,
    pub drive: SimDrive,
    pub encoders: Encoders,
    pub clock: ManualClock,
}

pub fn build_sim_rig(cfg: &Config) -> SimRig {
    let robot = SimulatedRobot::new(SimConfig::default());
    let encoders = Encoders::new(encoder_cfg(cfg));
    let sensors = LineSensorArray::new(robot.sensor_bank(), sensor_cfg(cfg));
    let dcfg = drive_cfg(cfg);
    let motors = MotorDrive::new(robot.h_bridge(), robot.pwm(), &dcfg);
    let drive = DriveController::new(sensors, motors, robot.compass(), encoders.clone(), dcfg);
    SimRig {
        robot,
        drive,
        encoders,
        clock: ManualClock::new(),
    }
}

/// One-tick world advance: moves the clock, steps the kinematic model, and
/// feeds the resulting encoder edges.
pub fn advance_sim(robot: &SimulatedRobot, encoders: &Encoders, clock: &ManualClock, dt_ms: u32) {
    clock.sleep_ms(dt_ms);
    let deltas = robot.step(dt_ms);
    for wheel in Wheel::ALL {
        let delta = deltas[wheel as usize];
        // Phase A counts forward when both levels are equal.
        for _ in 0..delta.unsigned_abs() {
            encoders.on_edge(wheel, Phase::A, true, delta >= 0);
        }
    }
}

/// Writes display text to stdout, standing in for the chassis screen.
pub struct ConsoleDisplay {
    pub enabled: bool,
}

impl Display for ConsoleDisplay {
    fn show_text(&mut self, _x: u8, _y: u8, text: &str) {
        if self.enabled {
            println!("{text}");
        }
    }

    fn clear(&mut self) {}
}

/// Loop cadence and the run-time ceiling.
pub struct LoopOptions {
    pub loop_ms: u32,
    pub max_run_ms: u64,
}

#[derive(Debug)]
pub struct SquareOutcome {
    pub completed_sides: u32,
    pub reacquired: usize,
    pub timed_out: usize,
    pub elapsed_ms: u32,
    pub interrupted: bool,
}

/// Runs the square traversal to completion, interruption, or the run-time
/// ceiling. `advance` moves the world (and the clock) by one period; the
/// simulated rig steps its model there, the hardware rig just sleeps.
pub fn run_square<S, B, P, H, D, F>(
    drive: &mut DriveController<S, B, P, H>,
    seq: &mut SquareSequencer,
    clock: &dyn Clock,
    display: &mut D,
    opts: &LoopOptions,
    shutdown: &AtomicBool,
    mut advance: F,
) -> linebot_core::Result<SquareOutcome>
where
    S: SensorBank,
    B: HBridge,
    P: Pwm,
    H: Heading,
    D: Display,
    F: FnMut(u32),
{
    let start = clock.now_ms();
    seq.start(drive, start)?;
    let mut shown = 0;
    let interrupted = loop {
        if seq.is_completed() {
            break false;
        }
        if shutdown.load(Ordering::Relaxed) {
            warn!("interrupted, stopping the chassis");
            drive.set_mode(DriveMode::Stop)?;
            break true;
        }
        if u64::from(clock.elapsed_since(start)) > opts.max_run_ms {
            drive.set_mode(DriveMode::Stop)?;
            return Err(eyre::Report::new(DriveError::State(format!(
                "max run time exceeded ({} ms)",
                opts.max_run_ms
            ))));
        }
        advance(opts.loop_ms);
        seq.step(drive, clock.now_ms())?;
        if seq.completed_sides() != shown {
            shown = seq.completed_sides();
            display.show_text(0, 0, &format!("side {shown}"));
        }
    };
    display.clear();

    let timed_out = seq
        .outcomes()
        .iter()
        .filter(|o| matches!(o, TurnOutcome::TimedOut))
        .count();
    Ok(SquareOutcome {
        completed_sides: seq.completed_sides(),
        reacquired: seq.outcomes().len() - timed_out,
        timed_out,
        elapsed_ms: clock.elapsed_since(start),
        interrupted,
    })
}

#[derive(Debug)]
pub struct FollowOutcome {
    pub elapsed_ms: u32,
    pub pulses: [i64; 2],
    pub final_reading: Option<LineReading>,
    pub interrupted: bool,
}

/// Follows the line for a fixed duration, then stops the chassis.
pub fn run_follow<S, B, P, H, F>(
    drive: &mut DriveController<S, B, P, H>,
    clock: &dyn Clock,
    duration_ms: u32,
    loop_ms: u32,
    shutdown: &AtomicBool,
    mut advance: F,
) -> linebot_core::Result<FollowOutcome>
where
    S: SensorBank,
    B: HBridge,
    P: Pwm,
    H: Heading,
    F: FnMut(u32),
{
    let start = clock.now_ms();
    let base = [
        drive.encoders().count(Wheel::Left),
        drive.encoders().count(Wheel::Right),
    ];
    drive.set_mode(DriveMode::LineFollowing)?;
    info!(duration_ms, "line following started");
    let mut interrupted = false;
    while clock.elapsed_since(start) < duration_ms {
        if shutdown.load(Ordering::Relaxed) {
            warn!("interrupted, stopping the chassis");
            interrupted = true;
            break;
        }
        advance(loop_ms);
        drive.sense()?;
        drive.control_tick()?;
    }
    drive.set_mode(DriveMode::Stop)?;
    Ok(FollowOutcome {
        elapsed_ms: clock.elapsed_since(start),
        pulses: [
            drive.encoders().count(Wheel::Left) - base[0],
            drive.encoders().count(Wheel::Right) - base[1],
        ],
        final_reading: drive.last_reading(),
        interrupted,
    })
}

/// Takes `samples` one-per-period sensor readings without driving the wheels.
pub fn sample_sensors<S, B, P, H, F>(
    drive: &mut DriveController<S, B, P, H>,
    samples: u32,
    loop_ms: u32,
    mut advance: F,
) -> linebot_core::Result<Vec<LineReading>>
where
    S: SensorBank,
    B: HBridge,
    P: Pwm,
    H: Heading,
    F: FnMut(u32),
{
    let mut out = Vec::with_capacity(samples as usize);
    for _ in 0..samples {
        advance(loop_ms);
        out.push(drive.sense()?);
    }
    Ok(out)
}

/// Builds the turn detector and sequencer pair used by the square command.
pub fn build_sequencer(cfg: &Config, sq: linebot_core::SquareCfg) -> SquareSequencer {
    SquareSequencer::new(sq, TurnDetection::new(turn_cfg(cfg)))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hw {
    //! GPIO rig assembly for the real chassis.

    use std::time::Duration;

    use linebot_config::Config;
    use linebot_core::{DriveController, Encoders, LineSensorArray, MotorDrive, Phase};
    use linebot_hardware::gpio::{
        EncoderWatcher, Gpio, GpioHBridge, GpioSensorBank, HardwarePwm, PinMap,
    };
    use linebot_traits::Heading;

    /// No attitude source is fitted; heading-hold reads due north.
    pub struct FixedNorth;

    impl Heading for FixedNorth {
        fn heading_deg(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
            Ok(0.0)
        }
    }

    pub type GpioDrive = DriveController<GpioSensorBank, GpioHBridge, HardwarePwm, FixedNorth>;

    const PWM_FREQUENCY_HZ: f64 = 20_000.0;
    const PWM_PERIOD_TICKS: u32 = 1_000;
    const ENCODER_POLL: Duration = Duration::from_micros(200);

    fn pin_map(cfg: &Config) -> PinMap {
        PinMap {
            sensors: cfg.pins.sensors,
            bridge: [
                (cfg.pins.left_in1, cfg.pins.left_in2),
                (cfg.pins.right_in1, cfg.pins.right_in2),
            ],
            encoders: [
                (cfg.pins.left_enc_a, cfg.pins.left_enc_b),
                (cfg.pins.right_enc_a, cfg.pins.right_enc_b),
            ],
        }
    }

    /// Builds the full GPIO control stack. The returned watcher owns the
    /// encoder polling thread and must stay alive for the whole run.
    pub fn build_gpio_rig(cfg: &Config) -> eyre::Result<(GpioDrive, Encoders, EncoderWatcher)> {
        let gpio = Gpio::new().map_err(|e| eyre::eyre!("failed to open GPIO: {e}"))?;
        let map = pin_map(cfg);
        let encoders = Encoders::new(super::encoder_cfg(cfg));
        let sensors = LineSensorArray::new(GpioSensorBank::new(&gpio, &map)?, super::sensor_cfg(cfg));
        let dcfg = super::drive_cfg(cfg);
        let motors = MotorDrive::new(
            GpioHBridge::new(&gpio, &map)?,
            HardwarePwm::new(PWM_FREQUENCY_HZ, PWM_PERIOD_TICKS)?,
            &dcfg,
        );
        let counters = encoders.clone();
        let watcher = EncoderWatcher::spawn(&gpio, &map, ENCODER_POLL, move |wheel, phase_a, a, b| {
            let phase = if phase_a { Phase::A } else { Phase::B };
            counters.on_edge(wheel, phase, a, b);
        })?;
        let drive = DriveController::new(sensors, motors, FixedNorth, encoders.clone(), dcfg);
        Ok((drive, encoders, watcher))
    }
}
