//! Per-process aggregator (§4.3): multiplexes one process's events by
//! thread id and merges all threads' results once the stream ends.

use indexmap::IndexMap;

use crate::error::ExtractorError;
use crate::event::Event;
use crate::extractor::{ExtractedDurations, SingleThreadExtractor};

/// Consumes one process's events, lazily creating a [`SingleThreadExtractor`]
/// per `thread_id` the first time it's seen.
#[derive(Debug, Default)]
pub struct ProcessAggregator {
    extractors: IndexMap<String, SingleThreadExtractor>,
}

impl ProcessAggregator {
    pub fn new() -> Self {
        ProcessAggregator::default()
    }

    pub fn process(&mut self, event: &Event) -> Result<(), ExtractorError> {
        let extractor = self
            .extractors
            .entry(event.thread_id().to_string())
            .or_insert_with(|| SingleThreadExtractor::new(event.thread_id()));
        extractor.process(event)
    }

    /// Consumes the aggregator, merging every thread's result by key-wise
    /// concatenation, in the order threads were first observed.
    pub fn finish(self) -> Result<ExtractedDurations, ExtractorError> {
        let mut merged = ExtractedDurations::default();
        for (_thread_id, extractor) in self.extractors {
            merged = merged.merge(extractor.finish()?);
        }
        Ok(merged)
    }
}

/// Feeds an ordered, single-process event stream through a fresh aggregator.
pub fn aggregate_process_events<'a>(
    events: impl IntoIterator<Item = &'a Event>,
) -> Result<ExtractedDurations, ExtractorError> {
    let mut aggregator = ProcessAggregator::new();
    for event in events {
        aggregator.process(event)?;
    }
    aggregator.finish()
}
