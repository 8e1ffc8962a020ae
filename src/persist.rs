//! Run-record persistence (§6): the versioned `run-result.json` envelope.
//!
//! Writing the file the pretty-printed report tooling actually reads is an
//! external collaborator's job; this module only owns the envelope shape
//! and its version check, the part the core's error taxonomy names
//! (`RunRecordFormatVersionMismatch`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::record::RunResults;

pub const CURRENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunResultsEnvelope {
    format_version: u32,
    data: RunResults,
}

/// Just the version tag, decoded first so a version mismatch is reported
/// even when `data`'s shape has changed between format versions.
#[derive(Debug, Deserialize)]
struct FormatVersionOnly {
    format_version: u32,
}

/// Writes `results` to `path` as `{"format_version": 1, "data": ...}`.
pub fn save(results: &RunResults, path: &Path) -> Result<(), PersistError> {
    let envelope = RunResultsEnvelope { format_version: CURRENT_FORMAT_VERSION, data: results.clone() };
    let json = serde_json::to_string(&envelope)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads a previously saved run record, rejecting any `format_version`
/// other than the one this build understands (§7).
pub fn load(path: &Path) -> Result<RunResults, PersistError> {
    let contents = fs::read_to_string(path)?;
    let version_tag: FormatVersionOnly = serde_json::from_str(&contents)?;
    if version_tag.format_version != CURRENT_FORMAT_VERSION {
        return Err(PersistError::FormatVersionMismatch(version_tag.format_version, CURRENT_FORMAT_VERSION));
    }
    let envelope: RunResultsEnvelope = serde_json::from_str(&contents)?;
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MainProcess, MainProcessGlobalMetrics, Process, RunSettings, SystemMetrics};

    fn sample_results() -> RunResults {
        RunResults {
            run_settings: RunSettings { gpu_monitored: false },
            system: SystemMetrics::default(),
            main_process: MainProcess {
                process: Process {
                    command_list: vec!["true".into()],
                    pid: 1,
                    started_between_timestamps: (0.0, 0.0),
                    terminated_between_timestamps: (0.1, 0.2),
                    instant_metrics: vec![],
                    children: vec![],
                },
                exit_code: 0,
                global_metrics: MainProcessGlobalMetrics {
                    user_time: 0.0,
                    system_time: 0.0,
                    minor_page_faults: 0,
                    major_page_faults: 0,
                    input_blocks: 0,
                    output_blocks: 0,
                    voluntary_context_switches: 0,
                    involuntary_context_switches: 0,
                },
            },
        }
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-result.json");
        let results = sample_results();
        save(&results, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, results);
    }

    #[test]
    fn rejects_unknown_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-result.json");
        fs::write(&path, r#"{"format_version": 2, "data": {}}"#).unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, PersistError::FormatVersionMismatch(2, 1)));
    }
}
