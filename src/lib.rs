#![warn(missing_debug_implementations)]
//! Supervises an instrumented command, samples per-process resource usage
//! and GPU telemetry on a fixed cadence, and reconstructs stopwatch timing
//! summaries from the events the instrumented program emits on its own.
//!
//! The pieces compose roughly in pipeline order:
//!
//! * [`scheduler`] spawns and supervises the command, driving [`tracker`],
//!   [`sampler`] and [`gpu`] once per tick.
//! * [`builder`] turns the finalized tracker into a [`record::RunResults`].
//! * [`event`], [`extractor`], [`aggregator`] and [`summary`] independently
//!   turn the command's own CSV stopwatch stream into [`summary::Summary`]
//!   records, for callers that want to reconstruct timing summaries rather
//!   than (or in addition to) running a live supervised command.
//! * [`persist`] reads and writes the versioned run-record envelope.

#[macro_use]
extern crate quick_error;

mod aggregator;
mod builder;
mod config;
mod error;
mod event;
mod extractor;
mod gpu;
mod proc;
mod record;
mod sampler;
mod scheduler;
mod summary;
mod tracker;

pub use aggregator::{aggregate_process_events, ProcessAggregator};
pub use builder::{read_rusage_children, RusageSnapshot};
pub use config::RunnerConfig;
pub use error::{CodecError, Error, ExtractorError, GpuProbeError, PersistError, RunError, SamplerError};
pub use event::{Event, EventHeader};
pub use extractor::{ExtractedDurations, SingleThreadExtractor, StopwatchKey};
pub use record::{
    Bracket, ContextSwitchInstantMetrics, IoInstantMetrics, MainProcess, MainProcessGlobalMetrics, MemoryInstantMetrics,
    Process, ProcessInstantMetrics, RunResults, RunSettings, SystemInstantMetrics, SystemMetrics,
};
pub use sampler::InstantSampler;
pub use scheduler::run;
pub use summary::{ns_to_ms, synthesize_summaries, Summary};
pub use tracker::ProcessTracker;

pub mod persist;

/// A Pid, as the kernel hands it back from `fork`/`waitpid` and as it
/// appears in every `/proc/<pid>` path this crate reads.
pub type Pid = libc::pid_t;
