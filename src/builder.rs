//! Run record builder (§4.9): turns the finalized tracker tree plus the
//! process-group resource-usage delta into the immutable [`RunResults`].
//! The only component allowed to read `resource_usage_after -
//! resource_usage_before` (§4.9).

use std::io;
use std::mem::MaybeUninit;

use crate::record::{MainProcess, MainProcessGlobalMetrics, RunResults, RunSettings, SystemMetrics};
use crate::tracker::ProcessTracker;

/// A `getrusage(RUSAGE_CHILDREN, ...)` snapshot, in the units §3 wants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RusageSnapshot {
    pub user_time: f64,
    pub system_time: f64,
    pub minor_page_faults: u64,
    pub major_page_faults: u64,
    pub input_blocks: u64,
    pub output_blocks: u64,
    pub voluntary_context_switches: u64,
    pub involuntary_context_switches: u64,
}

fn timeval_to_seconds(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0
}

/// Reads the calling process's children resource-usage counters, the
/// "before"/"after" snapshots §4.8 bracket the run with.
pub fn read_rusage_children() -> io::Result<RusageSnapshot> {
    let mut usage = MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: RUSAGE_CHILDREN and a valid out-pointer is exactly what getrusage expects.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let usage = unsafe { usage.assume_init() };
    Ok(RusageSnapshot {
        user_time: timeval_to_seconds(usage.ru_utime),
        system_time: timeval_to_seconds(usage.ru_stime),
        minor_page_faults: usage.ru_minflt as u64,
        major_page_faults: usage.ru_majflt as u64,
        input_blocks: usage.ru_inblock as u64,
        output_blocks: usage.ru_oublock as u64,
        voluntary_context_switches: usage.ru_nvcsw as u64,
        involuntary_context_switches: usage.ru_nivcsw as u64,
    })
}

/// Builds the frozen [`RunResults`] from a finalized tracker, the
/// system-wide GPU transfer samples gathered over the run, the main
/// process's exit code, and the before/after resource-usage snapshots.
pub fn build(
    tracker: &ProcessTracker,
    gpu_monitored: bool,
    system_instant_metrics: Vec<crate::record::SystemInstantMetrics>,
    exit_code: i32,
    usage_before: RusageSnapshot,
    usage_after: RusageSnapshot,
) -> RunResults {
    let process = tracker.build_tree();
    RunResults {
        run_settings: RunSettings { gpu_monitored },
        system: SystemMetrics { instant_metrics: system_instant_metrics },
        main_process: MainProcess {
            process,
            exit_code,
            global_metrics: MainProcessGlobalMetrics {
                user_time: usage_after.user_time - usage_before.user_time,
                system_time: usage_after.system_time - usage_before.system_time,
                minor_page_faults: usage_after.minor_page_faults.saturating_sub(usage_before.minor_page_faults),
                major_page_faults: usage_after.major_page_faults.saturating_sub(usage_before.major_page_faults),
                input_blocks: usage_after.input_blocks.saturating_sub(usage_before.input_blocks),
                output_blocks: usage_after.output_blocks.saturating_sub(usage_before.output_blocks),
                voluntary_context_switches: usage_after
                    .voluntary_context_switches
                    .saturating_sub(usage_before.voluntary_context_switches),
                involuntary_context_switches: usage_after
                    .involuntary_context_switches
                    .saturating_sub(usage_before.involuntary_context_switches),
            },
        },
    }
}
