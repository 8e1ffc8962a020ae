//! Scheduler (§4.8): spawns the supervised command, ticks a fixed-cadence
//! sampling loop against its process tree, and hands the finished tracker
//! off to [`crate::builder`].

use std::process::{Child, Command};
use std::time::{Duration, Instant};

use log::warn;

use crate::builder;
use crate::config::RunnerConfig;
use crate::error::RunError;
use crate::gpu;
use crate::proc;
use crate::record::RunResults;
use crate::sampler::InstantSampler;
use crate::tracker::ProcessTracker;
use crate::Pid;

/// Child-process wait outcome for one `try_wait` poll.
enum WaitOutcome {
    StillRunning,
    Exited(i32),
}

fn poll_child(child: &mut Child) -> Result<WaitOutcome, RunError> {
    match child.try_wait().map_err(RunError::Wait)? {
        Some(status) => Ok(WaitOutcome::Exited(status.code().unwrap_or(-1))),
        None => Ok(WaitOutcome::StillRunning),
    }
}

/// Runs `program args...` under supervision and returns the assembled
/// [`RunResults`] once it exits (§4.8, §4.9).
///
/// `std` has no blocking wait-with-timeout, so the tick loop polls
/// [`Child::try_wait`] instead of blocking on the child between samples.
pub fn run(config: &RunnerConfig, program: &str, args: &[String]) -> Result<RunResults, RunError> {
    let usage_before = builder::read_rusage_children().map_err(RunError::Rusage)?;
    let start = Instant::now();

    let mut command = Command::new(program);
    command.args(args);
    command.env("CHRONES_LOGS_DIRECTORY", &config.logs_directory);
    let mut child = command.spawn()?;
    let main_pid = child.id() as Pid;

    let mut tracker = ProcessTracker::new();
    let discovery_bracket = (0.0, start.elapsed().as_secs_f64());
    tracker.start(main_pid, proc::read_cmdline(main_pid).unwrap_or_else(|_| vec![program.to_string()]), discovery_bracket);

    let sampler = InstantSampler::new();
    sampler.prime(&mut tracker, main_pid);

    let tick_duration = Duration::from_secs_f64(config.monitoring_interval);
    let mut next_tick: u64 = 1;
    // The previous successful tick's timestamp; every bracket this loop
    // records is `(previous_timestamp, this_tick_timestamp)` (§4.5, §9).
    let mut previous_timestamp = 0.0_f64;
    let mut system_instant_metrics = Vec::new();

    let exit_code = loop {
        let target = tick_duration.mul_f64(next_tick as f64);
        let now = start.elapsed();
        // Ticks skipped between this tick and the last successful one
        // (§4.8); reset every iteration, not accumulated across the run.
        let mut missed_this_gap: u64 = 0;
        if now < target {
            std::thread::sleep(target - now);
        } else {
            // Fell behind: skip straight to the next instant still in the future,
            // rather than firing every tick we've already missed (§4.8).
            let behind_ticks = ((now.as_secs_f64() / tick_duration.as_secs_f64()).floor() as u64).saturating_sub(next_tick - 1);
            missed_this_gap = behind_ticks;
            next_tick += behind_ticks;
        }

        match poll_child(&mut child)? {
            WaitOutcome::Exited(code) => break code,
            WaitOutcome::StillRunning => {}
        }

        let timestamp = start.elapsed().as_secs_f64();

        if missed_this_gap > config.allowed_missing_samples {
            warn!("monitoring is slow: {} samples missed before t={:.3}s", missed_this_gap, timestamp);
        }

        discover_new_children(&mut tracker, &sampler, previous_timestamp, timestamp);

        let gpu_probes =
            if config.monitor_gpu { Some((gpu::spawn_process_attribution_probe()?, gpu::spawn_system_transfer_probe()?)) } else { None };

        let gone = sampler.sample_all(&mut tracker, timestamp);

        if let Some((process_probe, system_probe)) = gpu_probes {
            let system_sample = gpu::collect_and_attribute(process_probe, system_probe, &mut tracker, timestamp)?;
            system_instant_metrics.push(system_sample);
        }

        for pid in gone {
            tracker.drop_process(pid, (previous_timestamp, timestamp));
        }

        previous_timestamp = timestamp;
        next_tick += 1;
    };

    let termination_timestamp = start.elapsed().as_secs_f64();
    tracker.finalize((previous_timestamp, termination_timestamp));

    let usage_after = builder::read_rusage_children().map_err(RunError::Rusage)?;
    Ok(builder::build(&tracker, config.monitor_gpu, system_instant_metrics, exit_code, usage_before, usage_after))
}

fn discover_new_children(tracker: &mut ProcessTracker, sampler: &InstantSampler, previous_timestamp: f64, timestamp: f64) {
    let known: Vec<Pid> = tracker.pids();
    for parent in known {
        let Ok(children) = proc::children_of(parent) else { continue };
        for child_pid in children {
            if tracker.is_monitored(child_pid) {
                continue;
            }
            let command_list = proc::read_cmdline(child_pid).unwrap_or_default();
            tracker.discover(child_pid, Some(parent), command_list, (previous_timestamp, timestamp));
            sampler.prime(tracker, child_pid);
        }
    }
}
