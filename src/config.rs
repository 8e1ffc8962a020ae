//! Runner configuration (§6): the small, fully-enumerated set of knobs the
//! outer CLI collaborator exposes to callers of this crate.

/// Configuration for one supervised run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunnerConfig {
    /// Target sampling cadence, in seconds.
    pub monitoring_interval: f64,
    /// Whether to spawn the GPU probe subprocesses each tick.
    pub monitor_gpu: bool,
    /// How many consecutive missed ticks are tolerated before warning.
    pub allowed_missing_samples: u64,
    /// Absolute path exported as `CHRONES_LOGS_DIRECTORY` before spawning
    /// the child (§6).
    pub logs_directory: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            monitoring_interval: 0.2,
            monitor_gpu: false,
            allowed_missing_samples: 1,
            logs_directory: ".".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = RunnerConfig::default();
        assert_eq!(config.monitoring_interval, 0.2);
        assert!(!config.monitor_gpu);
        assert_eq!(config.allowed_missing_samples, 1);
    }
}
