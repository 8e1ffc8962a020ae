//! GPU probe driver (§4.7): spawns `nvidia-smi pmon`/`dmon` once per tick
//! and attributes their output to tracked pids and the system-wide record.

use std::io::Read;
use std::process::{Child, Command, Stdio};

use crate::error::GpuProbeError;
use crate::record::SystemInstantMetrics;
use crate::tracker::ProcessTracker;
use crate::Pid;

/// A probe spawned at the start of a tick, joined at the end of the same
/// tick (§5: "synchronize at well-defined join points within a tick").
pub struct SpawnedProbe {
    child: Child,
}

fn spawn(program: &str, args: &[&str]) -> Result<SpawnedProbe, GpuProbeError> {
    let child = Command::new(program).args(args).stdout(Stdio::piped()).stderr(Stdio::null()).spawn()?;
    Ok(SpawnedProbe { child })
}

impl SpawnedProbe {
    fn collect_stdout(mut self) -> Result<String, GpuProbeError> {
        self.child.wait()?;
        let mut out = String::new();
        self.child.stdout.take().expect("stdout was piped").read_to_string(&mut out)?;
        Ok(out)
    }
}

/// Spawns the process-attribution probe (`nvidia-smi pmon`) as early as
/// possible in a tick.
pub fn spawn_process_attribution_probe() -> Result<SpawnedProbe, GpuProbeError> {
    spawn("nvidia-smi", &["pmon", "-c", "1", "-s", "um"])
}

/// Spawns the system-transfer probe (`nvidia-smi dmon`) as early as
/// possible in a tick.
pub fn spawn_system_transfer_probe() -> Result<SpawnedProbe, GpuProbeError> {
    spawn("nvidia-smi", &["dmon", "-c", "1", "-s", "t"])
}

struct ProcessAttribution {
    pid: Pid,
    gpu_percent: f32,
    gpu_memory: f32,
}

fn parse_process_attribution(output: &str) -> Result<Vec<ProcessAttribution>, GpuProbeError> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.is_empty() {
        return Err(GpuProbeError::SchemaError("pmon", "empty output".into()));
    }
    let header: Vec<&str> = lines[0].split_whitespace().collect();
    if header.first() != Some(&"#") {
        return Err(GpuProbeError::SchemaError("pmon", "header does not start with '#'".into()));
    }
    let header = &header[1..];
    let check = |idx: usize, name: &str| -> Result<(), GpuProbeError> {
        if header.get(idx) != Some(&name) {
            return Err(GpuProbeError::SchemaError("pmon", format!("expected '{}' at column {}", name, idx)));
        }
        Ok(())
    };
    check(1, "pid")?;
    check(3, "sm")?;
    check(7, "fb")?;

    let mut rows = Vec::new();
    for line in lines.iter().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let pid: Pid = parts
            .get(1)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| GpuProbeError::SchemaError("pmon", "unparseable pid column".into()))?;
        let gpu_percent = parts.get(3).and_then(|v| v.parse::<f32>().ok()).unwrap_or(0.0);
        let gpu_memory = parts.get(7).and_then(|v| v.parse::<f32>().ok()).unwrap_or(0.0);
        rows.push(ProcessAttribution { pid, gpu_percent, gpu_memory });
    }
    Ok(rows)
}

struct SystemTransfer {
    host_to_device_transfer_rate: f64,
    device_to_host_transfer_rate: f64,
}

fn parse_system_transfer(output: &str) -> Result<SystemTransfer, GpuProbeError> {
    let lines: Vec<&str> = output.lines().collect();
    let header: Vec<&str> = lines.first().map(|l| l.split_whitespace().collect()).unwrap_or_default();
    if header.first() != Some(&"#") {
        return Err(GpuProbeError::SchemaError("dmon", "header does not start with '#'".into()));
    }
    let header = &header[1..];
    let check = |idx: usize, name: &str| -> Result<(), GpuProbeError> {
        if header.get(idx) != Some(&name) {
            return Err(GpuProbeError::SchemaError("dmon", format!("expected '{}' at column {}", name, idx)));
        }
        Ok(())
    };
    check(0, "gpu")?;
    check(1, "rxpci")?;
    check(2, "txpci")?;

    if lines.len() != 3 {
        if lines.len() > 3 {
            return Err(GpuProbeError::MultiGpuUnsupported(lines.len() - 2));
        }
        return Err(GpuProbeError::SchemaError("dmon", format!("expected exactly 3 lines, got {}", lines.len())));
    }
    let parts: Vec<&str> = lines[2].split_whitespace().collect();
    let host_to_device_transfer_rate = parts
        .get(1)
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| GpuProbeError::SchemaError("dmon", "unparseable rxpci column".into()))?;
    let device_to_host_transfer_rate = parts
        .get(2)
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| GpuProbeError::SchemaError("dmon", "unparseable txpci column".into()))?;
    Ok(SystemTransfer { host_to_device_transfer_rate, device_to_host_transfer_rate })
}

/// Collects both probes' output (after they've been left to run alongside
/// OS sampling for the rest of the tick) and applies §4.7 steps 3-5.
pub fn collect_and_attribute(
    process_probe: SpawnedProbe,
    system_probe: SpawnedProbe,
    tracker: &mut ProcessTracker,
    timestamp: f64,
) -> Result<SystemInstantMetrics, GpuProbeError> {
    let process_output = process_probe.collect_stdout()?;
    let attributions = parse_process_attribution(&process_output)?;
    for attribution in attributions {
        if let Some(process) = tracker.get_mut(attribution.pid) {
            if let Some(last) = process.instant_metrics.last_mut() {
                if last.timestamp == timestamp {
                    last.gpu_percent = Some(attribution.gpu_percent);
                    last.gpu_memory = Some(attribution.gpu_memory);
                }
            }
        }
    }

    let system_output = system_probe.collect_stdout()?;
    let transfer = parse_system_transfer(&system_output)?;
    Ok(SystemInstantMetrics {
        timestamp,
        host_to_device_transfer_rate: Some(transfer.host_to_device_transfer_rate),
        device_to_host_transfer_rate: Some(transfer.device_to_host_transfer_rate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PMON_HEADER: &str = "# gpu        pid  type    sm   mem   enc   dec   fb   command";
    const DMON_HEADER: &str = "# gpu   rxpci   txpci";

    #[test]
    fn parses_process_attribution_rows() {
        let output = format!("{}\n# Idx      #      C/G     %     %     %     %    MB    name\n0     1234     C    42    10     -     -   256   my-proc\n", PMON_HEADER);
        let rows = parse_process_attribution(&output).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pid, 1234);
        assert_eq!(rows[0].gpu_percent, 42.0);
        assert_eq!(rows[0].gpu_memory, 256.0);
    }

    #[test]
    fn idle_dash_fields_become_zero() {
        let output = format!("{}\n# Idx      #      C/G     %     %     %     %    MB    name\n0     1234     C     -     -     -     -     -   my-proc\n", PMON_HEADER);
        let rows = parse_process_attribution(&output).unwrap();
        assert_eq!(rows[0].gpu_percent, 0.0);
        assert_eq!(rows[0].gpu_memory, 0.0);
    }

    #[test]
    fn pmon_schema_mismatch_is_fatal() {
        let output = "# gpu        pid  type    zz   mem   enc   dec   fb   command\nheader2\n";
        let err = parse_process_attribution(output).unwrap_err();
        assert!(matches!(err, GpuProbeError::SchemaError("pmon", _)));
    }

    #[test]
    fn parses_system_transfer_row() {
        let output = format!("{}\n# Idx     MB/s    MB/s\n0          120      80\n", DMON_HEADER);
        let transfer = parse_system_transfer(&output).unwrap();
        assert_eq!(transfer.host_to_device_transfer_rate, 120.0);
        assert_eq!(transfer.device_to_host_transfer_rate, 80.0);
    }

    #[test]
    fn second_device_row_is_fatal() {
        let output = format!("{}\n# Idx     MB/s    MB/s\n0          120      80\n1           90      40\n", DMON_HEADER);
        let err = parse_system_transfer(&output).unwrap_err();
        assert!(matches!(err, GpuProbeError::MultiGpuUnsupported(1)));
    }

    #[test]
    fn dmon_schema_mismatch_is_fatal() {
        let output = "# notgpu   rxpci   txpci\nheader2\nrow\n";
        let err = parse_system_transfer(output).unwrap_err();
        assert!(matches!(err, GpuProbeError::SchemaError("dmon", _)));
    }
}
