//! Summary synthesizer (§4.4): folds per-process extraction results into
//! final per-(function, label) statistics.

use itertools::Itertools;

use crate::aggregator::aggregate_process_events;
use crate::error::ExtractorError;
use crate::event::Event;
use crate::extractor::{ExtractedDurations, StopwatchKey};

/// One function/label's final timing statistics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub function_name: String,
    pub label: Option<String>,
    pub executions_count: i64,
    pub average_duration: Option<f64>,
    pub duration_standard_deviation: Option<f64>,
    pub min_duration: Option<i64>,
    pub median_duration: Option<f64>,
    pub max_duration: Option<i64>,
    pub total_duration: i64,
}

/// Converts a nanosecond duration to milliseconds, truncated toward zero at
/// 10µs granularity: `trunc(ns / 10_000) / 100`.
pub fn ns_to_ms(ns: i64) -> f64 {
    (ns / 10_000) as f64 / 100.0
}

/// Groups events by `process_id` (consecutive runs, as §4.4 assumes — one
/// process's events come from one concatenated file) and folds every
/// process's extracted durations/summaries together, then emits final
/// [`Summary`] records sorted by `(executions_count asc, total_duration desc)`.
pub fn synthesize_summaries<'a>(
    events: impl IntoIterator<Item = &'a Event>,
) -> Result<Vec<Summary>, ExtractorError> {
    let mut merged = ExtractedDurations::default();
    for (_process_id, group) in &events.into_iter().group_by(|e| e.process_id().to_string()) {
        let group: Vec<&Event> = group.collect();
        merged = merged.merge(aggregate_process_events(group)?);
    }
    Ok(finalize(merged))
}

fn finalize(extracted: ExtractedDurations) -> Vec<Summary> {
    let mut out = Vec::new();

    // Pre-aggregated summaries and raw durations are deliberately visited as
    // two independent passes over two independent maps: a key present in
    // *both* maps yields two separate Summary records rather than one
    // merged record. See DESIGN.md for why this is kept rather than fixed.
    for (key, summaries) in &extracted.summaries {
        if summaries.len() == 1 {
            out.push(summary_from_single_event(key, &summaries[0]));
        } else {
            out.push(merge_summary_events(key, summaries));
        }
    }

    for (key, durations) in &extracted.durations {
        if durations.len() == 1 {
            out.push(Summary {
                function_name: key.0.clone(),
                label: key.1.clone(),
                executions_count: 1,
                average_duration: None,
                duration_standard_deviation: None,
                min_duration: None,
                median_duration: None,
                max_duration: None,
                total_duration: durations[0],
            });
        } else {
            out.push(summary_from_many_durations(key, durations));
        }
    }

    out.sort_by(|a, b| a.executions_count.cmp(&b.executions_count).then(b.total_duration.cmp(&a.total_duration)));
    out
}

fn summary_from_single_event(key: &StopwatchKey, event: &Event) -> Summary {
    match event {
        Event::StopwatchSummary {
            executions_count,
            average_duration,
            duration_standard_deviation,
            min_duration,
            median_duration,
            max_duration,
            total_duration,
            ..
        } => Summary {
            function_name: key.0.clone(),
            label: key.1.clone(),
            executions_count: *executions_count,
            average_duration: Some(*average_duration as f64),
            duration_standard_deviation: Some(*duration_standard_deviation as f64),
            min_duration: Some(*min_duration),
            median_duration: Some(*median_duration as f64),
            max_duration: Some(*max_duration),
            total_duration: *total_duration,
        },
        _ => unreachable!("ProcessAggregator only stores StopwatchSummary events under `summaries`"),
    }
}

fn merge_summary_events(key: &StopwatchKey, events: &[Event]) -> Summary {
    let mut executions_count = 0i64;
    let mut weighted_average = 0f64;
    let mut min_duration = i64::MAX;
    let mut max_duration = i64::MIN;
    let mut total_duration = 0i64;
    for event in events {
        if let Event::StopwatchSummary { executions_count: e, average_duration: a, min_duration: mn, max_duration: mx, total_duration: t, .. } = event {
            executions_count += e;
            weighted_average += (*e as f64) * (*a as f64);
            min_duration = min_duration.min(*mn);
            max_duration = max_duration.max(*mx);
            total_duration += t;
        }
    }
    Summary {
        function_name: key.0.clone(),
        label: key.1.clone(),
        executions_count,
        average_duration: Some(weighted_average / executions_count as f64),
        duration_standard_deviation: None,
        min_duration: Some(min_duration),
        median_duration: None,
        max_duration: Some(max_duration),
        total_duration,
    }
}

fn summary_from_many_durations(key: &StopwatchKey, durations: &[i64]) -> Summary {
    let n = durations.len();
    let total: i64 = durations.iter().sum();
    let mean = total as f64 / n as f64;
    let variance = durations.iter().map(|&d| { let diff = d as f64 - mean; diff * diff }).sum::<f64>() / (n - 1) as f64;
    let stddev = variance.sqrt();

    let mut sorted = durations.to_vec();
    sorted.sort_unstable();
    let median = if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
    };

    Summary {
        function_name: key.0.clone(),
        label: key.1.clone(),
        executions_count: n as i64,
        average_duration: Some(mean),
        duration_standard_deviation: Some(stddev),
        min_duration: Some(*sorted.first().unwrap()),
        median_duration: Some(median),
        max_duration: Some(*sorted.last().unwrap()),
        total_duration: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventHeader;

    fn header(pid: &str, tid: &str, ts: i64) -> EventHeader {
        EventHeader { process_id: pid.into(), thread_id: tid.into(), timestamp: ts }
    }

    fn start(pid: &str, tid: &str, ts: i64, f: &str, l: Option<&str>) -> Event {
        Event::StopwatchStart { header: header(pid, tid, ts), function_name: f.into(), label: l.map(str::to_string), index: None }
    }

    fn stop(pid: &str, tid: &str, ts: i64) -> Event {
        Event::StopwatchStop { header: header(pid, tid, ts) }
    }

    #[test]
    fn empty_input_yields_no_summaries() {
        assert_eq!(synthesize_summaries(std::iter::empty()).unwrap(), vec![]);
    }

    #[test]
    fn single_duration_has_only_total() {
        let events = [start("p", "t", 1234, "f", None), stop("p", "t", 1534)];
        let summaries = synthesize_summaries(&events).unwrap();
        assert_eq!(
            summaries,
            vec![Summary {
                function_name: "f".into(),
                label: None,
                executions_count: 1,
                average_duration: None,
                duration_standard_deviation: None,
                min_duration: None,
                median_duration: None,
                max_duration: None,
                total_duration: 300,
            }]
        );
    }

    #[test]
    fn two_durations_compute_full_statistics() {
        let events = [
            start("p", "t", 1234, "f", Some("label")),
            stop("p", "t", 1434),
            start("p", "t", 1534, "f", Some("label")),
            stop("p", "t", 1934),
        ];
        let summaries = synthesize_summaries(&events).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.executions_count, 2);
        assert_eq!(s.average_duration, Some(300.0));
        assert_eq!(s.duration_standard_deviation, Some(100.0 * 2f64.sqrt()));
        assert_eq!(s.min_duration, Some(200));
        assert_eq!(s.max_duration, Some(400));
        assert_eq!(s.total_duration, 600);
    }

    #[test]
    fn loop_with_label_matches_worked_example() {
        let events = [
            start("p", "t", 100, "f", Some("L")),
            stop("p", "t", 200),
            start("p", "t", 250, "f", Some("L")),
            stop("p", "t", 300),
            start("p", "t", 310, "f", Some("L")),
            stop("p", "t", 460),
        ];
        let summaries = synthesize_summaries(&events).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.executions_count, 3);
        assert_eq!(s.average_duration, Some(100.0));
        assert_eq!(s.min_duration, Some(50));
        assert_eq!(s.max_duration, Some(150));
        assert_eq!(s.median_duration, Some(100.0));
        assert_eq!(s.total_duration, 300);
    }

    fn summary_event(pid: &str, executions_count: i64, average_duration: i64, total_duration: i64, min_duration: i64, max_duration: i64, label: Option<&str>) -> Event {
        Event::StopwatchSummary {
            header: header(pid, "t", 42),
            function_name: "f".into(),
            label: label.map(str::to_string),
            executions_count,
            average_duration,
            duration_standard_deviation: 0,
            min_duration,
            median_duration: 0,
            max_duration,
            total_duration,
        }
    }

    #[test]
    fn single_preaggregated_summary_is_reemitted_verbatim() {
        let events = [summary_event("p", 412, 411, 46, 49, 48, Some("label"))];
        let summaries = synthesize_summaries(&events).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.executions_count, 412);
        assert_eq!(s.average_duration, Some(411.0));
        assert_eq!(s.min_duration, Some(49));
        assert_eq!(s.max_duration, Some(48));
        assert_eq!(s.total_duration, 46);
    }

    #[test]
    fn multiple_preaggregated_summaries_merge_and_lose_stddev_and_median() {
        // Two processes, each contributing one pre-aggregated Summary for the same key.
        let events = [summary_event("p1", 2, 11, 20, 10, 11, Some("L")), summary_event("p2", 4, 14, 40, 9, 12, Some("L"))];
        let summaries = synthesize_summaries(&events).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.executions_count, 6);
        assert_eq!(s.total_duration, 60);
        assert_eq!(s.average_duration, Some((2.0 * 11.0 + 4.0 * 14.0) / 6.0));
        assert_eq!(s.min_duration, Some(9));
        assert_eq!(s.max_duration, Some(12));
        assert_eq!(s.duration_standard_deviation, None);
        assert_eq!(s.median_duration, None);
    }

    #[test]
    fn summary_and_duration_key_overlap_is_not_merged() {
        // One process reports a pre-aggregated summary for (f, None); another
        // contributes raw start/stop pairs for the same key. Per the pinned
        // Open Question, this yields two separate Summary records.
        let events = [
            summary_event("p1", 5, 100, 500, 10, 200, None),
            start("p2", "t", 0, "f", None),
            stop("p2", "t", 50),
        ];
        let summaries = synthesize_summaries(&events).unwrap();
        assert_eq!(summaries.len(), 2);
    }

    #[test]
    fn sort_order_is_executions_count_then_total_duration_desc() {
        let events = [
            start("p", "t", 0, "a", None),
            stop("p", "t", 100),
            start("p", "t", 200, "b", None),
            stop("p", "t", 400),
            start("p", "t", 500, "c", None),
            stop("p", "t", 510),
        ];
        let summaries = synthesize_summaries(&events).unwrap();
        for window in summaries.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            assert!(a.executions_count < b.executions_count || (a.executions_count == b.executions_count && a.total_duration >= b.total_duration));
        }
    }

    #[test]
    fn ns_to_ms_truncates_at_10_microsecond_granularity() {
        assert_eq!(ns_to_ms(12_345), 0.01);
        assert_eq!(ns_to_ms(1_234_500), 1.23);
        assert_eq!(ns_to_ms(0), 0.0);
        assert_eq!(ns_to_ms(9_999), 0.0);
    }
}
