//! Instant sampler (§4.6): one tick's CPU/memory/IO/context-switch reading
//! for every tracked process, read directly from Linux's `/proc/<pid>`
//! accounting files, without an intermediate procfs crate.

use std::fs;
use std::time::Instant;

use log::warn;

use crate::error::SamplerError;
use crate::record::{ContextSwitchInstantMetrics, IoInstantMetrics, MemoryInstantMetrics, ProcessInstantMetrics};
use crate::tracker::ProcessTracker;
use crate::Pid;

/// The subset of `/proc/<pid>/stat` this sampler needs, already converted
/// to seconds using `sysconf(_SC_CLK_TCK)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimesSample {
    pub instant: Instant,
    pub user_time: f64,
    pub system_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StatFields {
    num_threads: u32,
    user_time: f64,
    system_time: f64,
}

fn clock_ticks_per_second() -> f64 {
    // SAFETY: sysconf with a valid name never mutates memory and is signal-safe.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        100.0 // the near-universal Linux default, used as a last resort.
    }
}

fn parse_stat_fields(contents: &str, clk_tck: f64) -> Result<StatFields, SamplerError> {
    // `comm` (the second field) is parenthesized and may itself contain
    // spaces or parentheses, so locate it by its *last* closing paren.
    let right_paren = contents.rfind(')').ok_or_else(|| SamplerError::BadFormat("/proc/<pid>/stat".into()))?;
    let mut fields = contents[right_paren + 1..].split_whitespace();
    let mut nth = |n: usize| -> Result<&str, SamplerError> {
        fields.nth(n).ok_or_else(|| SamplerError::BadFormat("/proc/<pid>/stat".into()))
    };
    let utime: u64 = nth(11)?.parse()?; // field 14
    let stime: u64 = nth(0)?.parse()?; // field 15 (field 14 already consumed)
    let _cutime: u64 = nth(0)?.parse()?; // field 16, not used (children counted separately)
    let _cstime: u64 = nth(0)?.parse()?; // field 17
    let _priority = nth(0)?; // field 18
    let _nice = nth(0)?; // field 19
    let num_threads: u32 = nth(0)?.parse()?; // field 20
    Ok(StatFields { num_threads, user_time: utime as f64 / clk_tck, system_time: stime as f64 / clk_tck })
}

fn parse_status_rss_and_ctxsw(contents: &str) -> Result<(u64, u64, u64), SamplerError> {
    let mut rss_kb = None;
    let mut voluntary = None;
    let mut involuntary = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss_kb = rest.trim().split_whitespace().next().and_then(|v| v.parse::<u64>().ok());
        } else if let Some(rest) = line.strip_prefix("voluntary_ctxt_switches:") {
            voluntary = rest.trim().parse::<u64>().ok();
        } else if let Some(rest) = line.strip_prefix("nonvoluntary_ctxt_switches:") {
            involuntary = rest.trim().parse::<u64>().ok();
        }
    }
    let rss_bytes = rss_kb.unwrap_or(0) * 1024;
    Ok((rss_bytes, voluntary.unwrap_or(0), involuntary.unwrap_or(0)))
}

fn parse_io(contents: &str) -> Result<(u64, u64), SamplerError> {
    let mut read_chars = None;
    let mut write_chars = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("rchar:") {
            read_chars = rest.trim().parse::<u64>().ok();
        } else if let Some(rest) = line.strip_prefix("wchar:") {
            write_chars = rest.trim().parse::<u64>().ok();
        }
    }
    Ok((read_chars.unwrap_or(0), write_chars.unwrap_or(0)))
}

fn proc_path(pid: Pid, leaf: &str) -> String {
    format!("/proc/{}/{}", pid, leaf)
}

fn read_to_string_mapped(path: &str, pid: Pid) -> Result<String, SamplerError> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::PermissionDenied => SamplerError::ProcessAccessDenied(pid),
        std::io::ErrorKind::NotFound => SamplerError::ProcessGone(pid),
        _ => SamplerError::Io(err),
    })
}

fn count_open_files(pid: Pid) -> Result<u32, SamplerError> {
    let path = proc_path(pid, "fd");
    let entries = fs::read_dir(&path).map_err(|err| match err.kind() {
        std::io::ErrorKind::PermissionDenied => SamplerError::ProcessAccessDenied(pid),
        std::io::ErrorKind::NotFound => SamplerError::ProcessGone(pid),
        _ => SamplerError::Io(err),
    })?;
    Ok(entries.count() as u32)
}

/// Reads the current raw `/proc/<pid>` facts needed for one sample, without
/// knowledge of any previous sample (the caller derives `cpu_percent`).
fn read_cpu_times(pid: Pid, clk_tck: f64) -> Result<StatFields, SamplerError> {
    let contents = read_to_string_mapped(&proc_path(pid, "stat"), pid)?;
    parse_stat_fields(&contents, clk_tck)
}

/// Drives one tick's sampling of every tracked process (§4.6).
pub struct InstantSampler {
    clk_tck: f64,
}

impl Default for InstantSampler {
    fn default() -> Self {
        InstantSampler { clk_tck: clock_ticks_per_second() }
    }
}

impl InstantSampler {
    pub fn new() -> Self {
        InstantSampler::default()
    }

    /// Performs the mandatory priming read at discovery time (§4.6: "the
    /// sampler is responsible for performing a priming read at discovery
    /// time"). The reading is discarded; only the CPU-time baseline is kept.
    pub fn prime(&self, tracker: &mut ProcessTracker, pid: Pid) {
        match read_cpu_times(pid, self.clk_tck) {
            Ok(stat) => {
                if let Some(process) = tracker.get_mut(pid) {
                    process.prev_cpu_sample =
                        Some(CpuTimesSample { instant: Instant::now(), user_time: stat.user_time, system_time: stat.system_time });
                    process.cpu_primed = true;
                }
            }
            Err(err) => warn!("priming read failed for pid {}: {}", pid, err),
        }
    }

    /// Samples every pid the tracker currently knows about, appending one
    /// `ProcessInstantMetrics` to each still-reachable process. Processes
    /// the OS reports gone are left to the caller, who calls
    /// `tracker.drop_process` (§4.5).
    pub fn sample_all(&self, tracker: &mut ProcessTracker, timestamp: f64) -> Vec<Pid> {
        let mut gone = Vec::new();
        for pid in tracker.pids() {
            match self.sample_one(tracker, pid, timestamp) {
                Ok(()) => {}
                Err(SamplerError::ProcessGone(_)) => gone.push(pid),
                Err(err) => warn!("instant metrics for pid {} missing at t={:.3}s: {}", pid, timestamp, err),
            }
        }
        gone
    }

    fn sample_one(&self, tracker: &mut ProcessTracker, pid: Pid, timestamp: f64) -> Result<(), SamplerError> {
        let stat = read_cpu_times(pid, self.clk_tck)?;
        let status = read_to_string_mapped(&proc_path(pid, "status"), pid)?;
        let (rss, voluntary, involuntary) = parse_status_rss_and_ctxsw(&status)?;
        let io = read_to_string_mapped(&proc_path(pid, "io"), pid)?;
        let (read_chars, write_chars) = parse_io(&io)?;
        let open_files = count_open_files(pid)?;

        let process = tracker.get_mut(pid).ok_or(SamplerError::ProcessGone(pid))?;
        let now = Instant::now();
        let cpu_percent = match process.prev_cpu_sample {
            Some(prev) => {
                let elapsed = (now - prev.instant).as_secs_f64();
                if elapsed > 0.0 {
                    100.0 * ((stat.user_time + stat.system_time) - (prev.user_time + prev.system_time)) / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        process.prev_cpu_sample = Some(CpuTimesSample { instant: now, user_time: stat.user_time, system_time: stat.system_time });

        process.instant_metrics.push(ProcessInstantMetrics {
            timestamp,
            threads: stat.num_threads,
            cpu_percent: cpu_percent as f32,
            user_time: stat.user_time,
            system_time: stat.system_time,
            memory: MemoryInstantMetrics { rss },
            open_files,
            io: IoInstantMetrics { read_chars, write_chars },
            context_switches: ContextSwitchInstantMetrics { voluntary, involuntary },
            gpu_percent: None,
            gpu_memory: None,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_STAT: &str =
        "1234 (my prog) S 1 1234 1234 0 -1 4194304 100 0 0 0 1500 300 0 0 20 0 4 0 1000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0";

    #[test]
    fn parses_utime_stime_and_thread_count() {
        let fields = parse_stat_fields(SAMPLE_STAT, 100.0).unwrap();
        assert_eq!(fields.user_time, 15.0);
        assert_eq!(fields.system_time, 3.0);
        assert_eq!(fields.num_threads, 4);
    }

    #[test]
    fn comm_field_with_spaces_and_parens_is_handled() {
        let stat = "99 (a (weird) name) S 1 99 99 0 -1 0 0 0 0 0 10 20 0 0 20 0 1 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 3 4 0 0 0 0 0";
        let fields = parse_stat_fields(stat, 100.0).unwrap();
        assert_eq!(fields.user_time, 0.1);
        assert_eq!(fields.system_time, 0.2);
        assert_eq!(fields.num_threads, 1);
    }

    #[test]
    fn parses_rss_and_context_switches_from_status() {
        let status = "Name:\tsleep\nVmRSS:\t    4096 kB\nvoluntary_ctxt_switches:\t7\nnonvoluntary_ctxt_switches:\t2\n";
        let (rss, voluntary, involuntary) = parse_status_rss_and_ctxsw(status).unwrap();
        assert_eq!(rss, 4096 * 1024);
        assert_eq!(voluntary, 7);
        assert_eq!(involuntary, 2);
    }

    #[test]
    fn parses_read_and_write_chars_from_io() {
        let io = "rchar: 123\nwchar: 456\nsyscr: 1\nsyscw: 1\nread_bytes: 0\nwrite_bytes: 0\ncancelled_write_bytes: 0\n";
        let (read_chars, write_chars) = parse_io(io).unwrap();
        assert_eq!(read_chars, 123);
        assert_eq!(write_chars, 456);
    }
}
