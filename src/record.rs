//! The frozen run-record tree (§3): what a completed run produces.

use serde::{Deserialize, Serialize};

use crate::Pid;

/// `(start, end)` wall-clock seconds bracketing an unobservable event such
/// as a process's birth or death (§9 glossary: "Bracket").
pub type Bracket = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryInstantMetrics {
    pub rss: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IoInstantMetrics {
    pub read_chars: u64,
    pub write_chars: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextSwitchInstantMetrics {
    pub voluntary: u64,
    pub involuntary: u64,
}

/// One tick's instantaneous sample for one tracked process (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstantMetrics {
    pub timestamp: f64,
    pub threads: u32,
    pub cpu_percent: f32,
    pub user_time: f64,
    pub system_time: f64,
    pub memory: MemoryInstantMetrics,
    pub open_files: u32,
    pub io: IoInstantMetrics,
    pub context_switches: ContextSwitchInstantMetrics,
    pub gpu_percent: Option<f32>,
    pub gpu_memory: Option<f32>,
}

/// One tick's system-wide GPU transfer sample (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemInstantMetrics {
    pub timestamp: f64,
    pub host_to_device_transfer_rate: Option<f64>,
    pub device_to_host_transfer_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemMetrics {
    pub instant_metrics: Vec<SystemInstantMetrics>,
}

/// A frozen, immutable process record in the result tree (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub command_list: Vec<String>,
    pub pid: Pid,
    pub started_between_timestamps: Bracket,
    pub terminated_between_timestamps: Bracket,
    pub instant_metrics: Vec<ProcessInstantMetrics>,
    pub children: Vec<Process>,
}

impl Process {
    /// Shell-quoted join of `command_list`, suitable for pasting into a
    /// terminal. Wraps any argument containing whitespace, a quote, or an
    /// empty string in single quotes, escaping embedded single quotes.
    pub fn command(&self) -> String {
        self.command_list.iter().map(|arg| shell_quote(arg)).collect::<Vec<_>>().join(" ")
    }
}

fn shell_quote(arg: &str) -> String {
    let needs_quoting = arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || "'\"\\$`".contains(c));
    if !needs_quoting {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MainProcessGlobalMetrics {
    pub user_time: f64,
    pub system_time: f64,
    pub minor_page_faults: u64,
    pub major_page_faults: u64,
    pub input_blocks: u64,
    pub output_blocks: u64,
    pub voluntary_context_switches: u64,
    pub involuntary_context_switches: u64,
}

/// The supervised command's own record, extended with the process-group
/// resource-usage delta and its exit code (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainProcess {
    #[serde(flatten)]
    pub process: Process,
    pub exit_code: i32,
    pub global_metrics: MainProcessGlobalMetrics,
}

impl std::ops::Deref for MainProcess {
    type Target = Process;
    fn deref(&self) -> &Process {
        &self.process
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunSettings {
    pub gpu_monitored: bool,
}

/// The complete, immutable result of one supervised run (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub run_settings: RunSettings,
    pub system: SystemMetrics,
    pub main_process: MainProcess,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_quotes_arguments_with_whitespace() {
        let process = Process {
            command_list: vec!["echo".into(), "hello world".into(), "plain".into()],
            pid: 1,
            started_between_timestamps: (0.0, 0.1),
            terminated_between_timestamps: (1.0, 1.1),
            instant_metrics: vec![],
            children: vec![],
        };
        assert_eq!(process.command(), "echo 'hello world' plain");
    }

    #[test]
    fn main_process_derefs_to_process_fields() {
        let main = MainProcess {
            process: Process {
                command_list: vec!["true".into()],
                pid: 42,
                started_between_timestamps: (0.0, 0.1),
                terminated_between_timestamps: (1.0, 1.1),
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
        };
        assert_eq!(main.pid, 42);
    }
}
