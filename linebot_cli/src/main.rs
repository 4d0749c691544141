//! Binary entry point: logging, signal handling, and command dispatch.

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use cli::{Cli, Commands, JSON_MODE};
use linebot_config::{Config, Logging};
#[cfg(all(feature = "hardware", target_os = "linux"))]
use linebot_traits::Clock;
use run::{ConsoleDisplay, LoopOptions};

/// Ceiling for a square run unless --max-run-ms says otherwise.
const DEFAULT_SQUARE_MAX_RUN_MS: u64 = 600_000;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(err) = try_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("Error: {}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn try_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let config = run::load_config(&cli.config)?;
    let _file_guard = init_logging(cli.json, cli.log_level.as_deref(), &config.logging);
    info!(config = %cli.config.display(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .wrap_err("failed to install signal handler")?;

    match cli.cmd {
        Commands::Square {
            sides,
            line_speed,
            turn_speed,
            max_run_ms,
            progress,
        } => {
            let mut sq = run::square_cfg(&config);
            if let Some(s) = sides {
                if s == 0 {
                    eyre::bail!("invalid configuration: --sides must be at least 1");
                }
                sq.sides = s;
            }
            if let Some(s) = line_speed {
                sq.line_speed = s;
            }
            if let Some(s) = turn_speed {
                sq.turn_speed = s;
            }
            let opts = LoopOptions {
                loop_ms: config.control.loop_ms,
                max_run_ms: max_run_ms.unwrap_or(DEFAULT_SQUARE_MAX_RUN_MS),
            };
            cmd_square(&config, sq, &opts, progress, cli.json, &shutdown)
        }
        Commands::Follow {
            duration_ms,
            base_speed,
        } => cmd_follow(&config, duration_ms, base_speed, cli.json, &shutdown),
        Commands::Sensors { samples } => cmd_sensors(&config, samples, cli.json),
        Commands::SelfCheck => cmd_self_check(&config, cli.json),
    }
}

/// Console layer always; a JSON-lines file layer when the config names one.
fn init_logging(
    json: bool,
    cli_level: Option<&str>,
    logging: &Logging,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = cli_level
        .or(logging.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    let mut guard = None;
    if let Some(path) = logging.file.as_deref() {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "linebot.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        layers.push(fmt::layer().json().with_writer(writer).boxed());
    }

    tracing_subscriber::registry().with(layers).with(filter).init();
    guard
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn cmd_square(
    config: &Config,
    sq: linebot_core::SquareCfg,
    opts: &LoopOptions,
    progress: bool,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let run::SimRig {
        robot,
        mut drive,
        encoders,
        clock,
    } = run::build_sim_rig(config);
    let mut seq = run::build_sequencer(config, sq);
    let mut display = ConsoleDisplay { enabled: progress };

    let outcome = run::run_square(&mut drive, &mut seq, &clock, &mut display, opts, shutdown, |dt| {
        run::advance_sim(&robot, &encoders, &clock, dt)
    })?;
    print_square(&outcome, json);
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn cmd_square(
    config: &Config,
    sq: linebot_core::SquareCfg,
    opts: &LoopOptions,
    progress: bool,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let (mut drive, _encoders, _watcher) = run::hw::build_gpio_rig(config)?;
    let mut seq = run::build_sequencer(config, sq);
    let mut display = ConsoleDisplay { enabled: progress };
    let clock = linebot_traits::MonotonicClock::new();

    let outcome = run::run_square(&mut drive, &mut seq, &clock, &mut display, opts, shutdown, |dt| {
        clock.sleep_ms(dt)
    })?;
    print_square(&outcome, json);
    Ok(())
}

fn print_square(outcome: &run::SquareOutcome, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "cmd": "square",
                "completed_sides": outcome.completed_sides,
                "reacquired": outcome.reacquired,
                "timed_out": outcome.timed_out,
                "elapsed_ms": outcome.elapsed_ms,
                "interrupted": outcome.interrupted
            })
        );
    } else if outcome.interrupted {
        println!(
            "square traversal interrupted after {} sides ({} ms)",
            outcome.completed_sides, outcome.elapsed_ms
        );
    } else {
        println!(
            "square traversal complete: {} sides in {} ms ({} pivots reacquired the line, {} timed out)",
            outcome.completed_sides, outcome.elapsed_ms, outcome.reacquired, outcome.timed_out
        );
    }
    info!(
        sides = outcome.completed_sides,
        elapsed_ms = outcome.elapsed_ms,
        "square run finished"
    );
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn cmd_follow(
    config: &Config,
    duration_ms: u32,
    base_speed: Option<f32>,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let run::SimRig {
        robot,
        mut drive,
        encoders,
        clock,
    } = run::build_sim_rig(config);
    if let Some(s) = base_speed {
        drive.set_base_speed(s);
    }
    let outcome = run::run_follow(
        &mut drive,
        &clock,
        duration_ms,
        config.control.loop_ms,
        shutdown,
        |dt| run::advance_sim(&robot, &encoders, &clock, dt),
    )?;
    print_follow(&outcome, json);
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn cmd_follow(
    config: &Config,
    duration_ms: u32,
    base_speed: Option<f32>,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let (mut drive, _encoders, _watcher) = run::hw::build_gpio_rig(config)?;
    if let Some(s) = base_speed {
        drive.set_base_speed(s);
    }
    let clock = linebot_traits::MonotonicClock::new();
    let outcome = run::run_follow(
        &mut drive,
        &clock,
        duration_ms,
        config.control.loop_ms,
        shutdown,
        |dt| clock.sleep_ms(dt),
    )?;
    print_follow(&outcome, json);
    Ok(())
}

fn print_follow(outcome: &run::FollowOutcome, json: bool) {
    let state = outcome
        .final_reading
        .map_or_else(|| "Unknown".to_string(), |r| format!("{:?}", r.state));
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "cmd": "follow",
                "elapsed_ms": outcome.elapsed_ms,
                "left_pulses": outcome.pulses[0],
                "right_pulses": outcome.pulses[1],
                "final_state": state,
                "interrupted": outcome.interrupted
            })
        );
    } else {
        println!(
            "line follow complete: {} ms, pulses L={} R={}, final state {state}",
            outcome.elapsed_ms, outcome.pulses[0], outcome.pulses[1]
        );
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn cmd_sensors(config: &Config, samples: u32, json: bool) -> eyre::Result<()> {
    let run::SimRig {
        robot,
        mut drive,
        encoders,
        clock,
    } = run::build_sim_rig(config);
    let readings = run::sample_sensors(&mut drive, samples, config.control.loop_ms, |dt| {
        run::advance_sim(&robot, &encoders, &clock, dt)
    })?;
    print_sensors(&readings, json);
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn cmd_sensors(config: &Config, samples: u32, json: bool) -> eyre::Result<()> {
    let (mut drive, _encoders, _watcher) = run::hw::build_gpio_rig(config)?;
    let clock = linebot_traits::MonotonicClock::new();
    let readings = run::sample_sensors(&mut drive, samples, config.control.loop_ms, |dt| {
        clock.sleep_ms(dt)
    })?;
    print_sensors(&readings, json);
    Ok(())
}

fn print_sensors(readings: &[linebot_core::LineReading], json: bool) {
    for r in readings {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "bits": format!("{:07b}", r.bits),
                    "active": r.active_count,
                    "position": r.position,
                    "state": format!("{:?}", r.state)
                })
            );
        } else {
            println!(
                "bits {:07b}  active {}  position {:+3}  {:?}",
                r.bits, r.active_count, r.position, r.state
            );
        }
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn cmd_self_check(config: &Config, json: bool) -> eyre::Result<()> {
    let run::SimRig {
        robot,
        mut drive,
        encoders,
        clock,
    } = run::build_sim_rig(config);
    run::advance_sim(&robot, &encoders, &clock, config.control.loop_ms);
    let reading = drive.sense()?;
    drive.control_tick()?;
    print_self_check(reading.state, json);
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn cmd_self_check(config: &Config, json: bool) -> eyre::Result<()> {
    let (mut drive, _encoders, _watcher) = run::hw::build_gpio_rig(config)?;
    let reading = drive.sense()?;
    drive.control_tick()?;
    print_self_check(reading.state, json);
    Ok(())
}

fn print_self_check(state: linebot_core::LineState, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "ok": true, "cmd": "self-check", "state": format!("{state:?}") })
        );
    } else {
        println!("self-check ok: sensors read {state:?}");
    }
}
