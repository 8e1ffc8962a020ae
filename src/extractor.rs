//! Per-thread extractor (§4.2): turns one thread's ordered event stream into
//! durations (from matched Start/Stop pairs) and pass-through summaries.

use indexmap::IndexMap;

use crate::error::ExtractorError;
use crate::event::Event;

/// `(function_name, label)`, the key final summaries are grouped by.
pub type StopwatchKey = (String, Option<String>);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDurations {
    pub durations: IndexMap<StopwatchKey, Vec<i64>>,
    pub summaries: IndexMap<StopwatchKey, Vec<Event>>,
}

impl ExtractedDurations {
    fn merge_key(map: &mut IndexMap<StopwatchKey, Vec<i64>>, key: StopwatchKey, mut values: Vec<i64>) {
        map.entry(key).or_default().append(&mut values);
    }

    fn merge_summary_key(map: &mut IndexMap<StopwatchKey, Vec<Event>>, key: StopwatchKey, mut values: Vec<Event>) {
        map.entry(key).or_default().append(&mut values);
    }

    /// Key-wise concatenation, preserving the order keys were first seen in
    /// `self` then `other` (§4.3: "order within a key reflects the order
    /// threads were first seen; between keys, insertion order is preserved").
    pub fn merge(mut self, other: ExtractedDurations) -> ExtractedDurations {
        for (key, values) in other.durations {
            Self::merge_key(&mut self.durations, key, values);
        }
        for (key, values) in other.summaries {
            Self::merge_summary_key(&mut self.summaries, key, values);
        }
        self
    }
}

/// Processes one thread's events in order, maintaining the pending-Start
/// stack described in §4.2.
#[derive(Debug, Default)]
pub struct SingleThreadExtractor {
    thread_id: String,
    stack: Vec<(String, Option<String>, i64)>,
    result: ExtractedDurations,
}

impl SingleThreadExtractor {
    pub fn new(thread_id: impl Into<String>) -> Self {
        SingleThreadExtractor { thread_id: thread_id.into(), stack: Vec::new(), result: ExtractedDurations::default() }
    }

    pub fn process(&mut self, event: &Event) -> Result<(), ExtractorError> {
        match event {
            Event::StopwatchStart { function_name, label, header, .. } => {
                self.stack.push((function_name.clone(), label.clone(), header.timestamp));
            }
            Event::StopwatchStop { header } => {
                // The stop's own label is irrelevant: the key comes from the matched start.
                if let Some((function_name, label, start_ts)) = self.stack.pop() {
                    let duration = header.timestamp - start_ts;
                    if duration < 0 {
                        return Err(ExtractorError::NegativeDuration(function_name, label, duration));
                    }
                    self.result.durations.entry((function_name, label)).or_default().push(duration);
                } else {
                    return Err(ExtractorError::UnbalancedStopwatch(self.thread_id.clone(), 0));
                }
            }
            Event::StopwatchSummary { function_name, label, .. } => {
                self.result
                    .summaries
                    .entry((function_name.clone(), label.clone()))
                    .or_default()
                    .push(event.clone());
            }
        }
        Ok(())
    }

    /// Consumes the extractor, failing if the Start stack isn't empty.
    pub fn finish(self) -> Result<ExtractedDurations, ExtractorError> {
        if !self.stack.is_empty() {
            return Err(ExtractorError::UnbalancedStopwatch(self.thread_id, self.stack.len()));
        }
        Ok(self.result)
    }
}
