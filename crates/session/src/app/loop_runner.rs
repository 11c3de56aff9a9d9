use std::io::{self, Write};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::controller::SessionController;
use crate::persistence::PersistenceError;
use crate::StartupError;

use super::console::{format_status, ConsoleFlow, SessionConsole};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub status_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            status_log_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to load session config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to open leaderboard: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("failed to spawn console input thread: {0}")]
    SpawnInput(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    QuitRequested,
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

/// Runs the controller in real time until `quit` or until the command
/// channel disconnects. Queued command lines are applied before the frame's
/// ticks, so input that arrives in the same frame as a timer expiry wins.
pub fn run_session_loop<W: Write>(
    config: &LoopConfig,
    controller: &mut SessionController,
    commands: &Receiver<String>,
    out: &mut W,
) -> LoopExit {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let status_log_interval =
        normalize_non_zero_duration(config.status_log_interval, Duration::from_secs(5));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        status_log_interval_ms = status_log_interval.as_millis() as u64,
        "loop_config"
    );

    let mut console = SessionConsole::new();
    let mut pending_output = Vec::new();
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_status_instant = Instant::now();

    let exit = loop {
        let frame_start = Instant::now();

        let mut exit = None;
        loop {
            match commands.try_recv() {
                Ok(line) => {
                    if console.submit_line(controller, &line) == ConsoleFlow::Quit {
                        exit = Some(LoopExit::QuitRequested);
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!(reason = "input_closed", "shutdown_requested");
                    exit = Some(LoopExit::InputClosed);
                    break;
                }
            }
        }

        let raw_frame_dt = frame_start.saturating_duration_since(last_frame_instant);
        last_frame_instant = frame_start;
        accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            controller.tick(fixed_dt_seconds);
        }
        accumulator = step_plan.remaining_accumulator;
        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        console.drain_output_into(&mut pending_output);
        write_output_lines(out, &mut pending_output);

        if frame_start.saturating_duration_since(last_status_instant) >= status_log_interval {
            last_status_instant = frame_start;
            if controller.is_session_live() {
                info!(status = %format_status(&controller.snapshot()), "session_status");
            }
        }

        if let Some(exit) = exit {
            break exit;
        }

        let frame_elapsed = Instant::now().saturating_duration_since(frame_start);
        let sleep_for = fixed_dt.saturating_sub(frame_elapsed);
        if sleep_for > Duration::ZERO {
            thread::sleep(sleep_for);
        }
    };

    let snapshot = controller.snapshot();
    info!(
        ?exit,
        phase = ?snapshot.phase,
        total_score = snapshot.total_score,
        rounds_played = snapshot.rounds_played,
        "loop_exited"
    );
    exit
}

fn write_output_lines<W: Write>(out: &mut W, lines: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    for line in lines.drain(..) {
        if let Err(error) = writeln!(out, "{line}") {
            warn!(error = %error, "console_write_failed");
            return;
        }
    }
    if let Err(error) = out.flush() {
        warn!(error = %error, "console_write_failed");
    }
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::config::SessionConfig;
    use crate::state::SessionPhase;

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(40), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 2);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(8));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn zero_durations_fall_back() {
        assert_eq!(
            normalize_non_zero_duration(Duration::ZERO, Duration::from_secs(5)),
            Duration::from_secs(5)
        );
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(3), Duration::from_secs(5)),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn loop_applies_commands_and_stops_on_quit() {
        let mut controller = SessionController::new(SessionConfig::default()).expect("controller");
        let (sender, receiver) = mpsc::channel();
        for line in ["start", "next", "win 5", "status", "quit", "lose"] {
            sender.send(line.to_string()).expect("send");
        }
        let mut out = Vec::new();

        let exit = run_session_loop(&LoopConfig::default(), &mut controller, &receiver, &mut out);

        assert_eq!(exit, LoopExit::QuitRequested);
        assert_eq!(controller.total_score(), 105);
        assert_eq!(controller.phase(), SessionPhase::PostRoundSequencing);
        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("score=105"));
        assert_eq!(receiver.try_recv(), Ok("lose".to_string()));
    }

    #[test]
    fn loop_exits_when_input_disconnects() {
        let mut controller = SessionController::new(SessionConfig::default()).expect("controller");
        let (sender, receiver) = mpsc::channel();
        sender.send("start".to_string()).expect("send");
        drop(sender);
        let mut out = Vec::new();

        let exit = run_session_loop(&LoopConfig::default(), &mut controller, &receiver, &mut out);

        assert_eq!(exit, LoopExit::InputClosed);
        assert!(controller.is_session_live());
    }
}
