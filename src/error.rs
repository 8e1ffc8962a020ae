use std::io;
use std::num::ParseIntError;

use crate::Pid;

quick_error! {
    #[derive(Debug)]
    /// Error parsing a single CSV row into an `Event` (§4.1).
    pub enum CodecError {
        MalformedEvent(tag: String, got_fields: usize, want_fields: usize) {
            description("wrong number of fields for this event tag")
            display("malformed '{}' event: got {} fields, expected {}", tag, got_fields, want_fields)
        }
        UnknownEventTag(tag: String) {
            description("unknown event tag")
            display("unknown event tag: '{}'", tag)
        }
        ParseInt(e: ParseIntError) {
            description("error parsing int field")
            display("error parsing int field: {}", e)
            from()
        }
    }
}

quick_error! {
    #[derive(Debug)]
    /// Error reconstructing stopwatch durations from one thread's events (§4.2).
    pub enum ExtractorError {
        NegativeDuration(function_name: String, label: Option<String>, duration_ns: i64) {
            description("a stopwatch stop preceded its start")
            display("negative duration for {:?}/{:?}: {}ns", function_name, label, duration_ns)
        }
        UnbalancedStopwatch(thread_id: String, pending: usize) {
            description("stream ended with unmatched stopwatch starts")
            display("thread {} ended with {} unmatched start(s)", thread_id, pending)
        }
    }
}

quick_error! {
    #[derive(Debug)]
    /// Error reading per-process instant metrics from /proc (§4.6).
    pub enum SamplerError {
        Io(err: io::Error) {
            description("IO error")
            display("{}", err)
            from()
        }
        ParseInt(e: ParseIntError) {
            description("error parsing int")
            display("error parsing int: {}", e)
            from()
        }
        BadFormat(path: String) {
            description("unexpected /proc file format")
            display("unexpected format reading {}", path)
        }
        ProcessAccessDenied(pid: Pid) {
            description("permission denied reading process metrics")
            display("permission denied reading metrics for pid {}", pid)
        }
        ProcessGone(pid: Pid) {
            description("process no longer exists")
            display("pid {} no longer exists", pid)
        }
    }
}

quick_error! {
    #[derive(Debug)]
    /// Error driving the two GPU probe subprocesses (§4.7).
    pub enum GpuProbeError {
        Spawn(err: io::Error) {
            description("failed to spawn GPU probe")
            display("failed to spawn GPU probe: {}", err)
            from()
        }
        SchemaError(probe: &'static str, reason: String) {
            description("GPU probe output did not match the expected schema")
            display("{} probe schema error: {}", probe, reason)
        }
        MultiGpuUnsupported(device_count: usize) {
            description("more than one GPU device was reported")
            display("{} GPU devices reported, only one is supported", device_count)
        }
    }
}

quick_error! {
    #[derive(Debug)]
    /// Error running the supervising scheduler loop (§4.8, §4.9).
    pub enum RunError {
        ChildSpawnFailed(err: io::Error) {
            description("failed to spawn the supervised command")
            display("failed to spawn the supervised command: {}", err)
            from()
        }
        Wait(err: io::Error) {
            description("error waiting for the supervised command")
            display("error waiting for the supervised command: {}", err)
        }
        Rusage(err: io::Error) {
            description("failed to read process-group resource usage")
            display("failed to read process-group resource usage: {}", err)
        }
        GpuProbe(err: GpuProbeError) {
            description("GPU probe failed")
            display("GPU probe failed: {}", err)
            from()
        }
        Persist(err: PersistError) {
            description("failed to persist the run record")
            display("failed to persist the run record: {}", err)
            from()
        }
    }
}

quick_error! {
    #[derive(Debug)]
    /// Error loading or saving a persisted run record (§6).
    pub enum PersistError {
        Io(err: io::Error) {
            description("IO error")
            display("{}", err)
            from()
        }
        Json(err: serde_json::Error) {
            description("JSON (de)serialization error")
            display("{}", err)
            from()
        }
        FormatVersionMismatch(got: u32, want: u32) {
            description("run record format_version mismatch")
            display("run record has format_version {}, this build understands {}", got, want)
        }
    }
}

quick_error! {
    #[derive(Debug)]
    /// Top-level error, wrapping every component's error domain.
    pub enum Error {
        Codec(err: CodecError) {
            description("event codec error")
            display("{}", err)
            from()
        }
        Extractor(err: ExtractorError) {
            description("stopwatch extraction error")
            display("{}", err)
            from()
        }
        Sampler(err: SamplerError) {
            description("sampler error")
            display("{}", err)
            from()
        }
        GpuProbe(err: GpuProbeError) {
            description("GPU probe error")
            display("{}", err)
            from()
        }
        Run(err: RunError) {
            description("run error")
            display("{}", err)
            from()
        }
        Persist(err: PersistError) {
            description("persistence error")
            display("{}", err)
            from()
        }
    }
}
