//! Event codec (§4.1): turns one CSV row written by the instrumentation
//! collaborator into a typed [`Event`], and back.

use crate::error::CodecError;

const DASH: &str = "-";

/// Fields shared by every event variant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventHeader {
    pub process_id: String,
    pub thread_id: String,
    /// Nanoseconds since an arbitrary epoch.
    pub timestamp: i64,
}

/// One row of a `<program>.<pid>.chrones.csv` file (§6).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    StopwatchStart {
        #[serde(flatten)]
        header: EventHeader,
        function_name: String,
        label: Option<String>,
        index: Option<i64>,
    },
    StopwatchStop {
        #[serde(flatten)]
        header: EventHeader,
    },
    StopwatchSummary {
        #[serde(flatten)]
        header: EventHeader,
        function_name: String,
        label: Option<String>,
        executions_count: i64,
        average_duration: i64,
        duration_standard_deviation: i64,
        min_duration: i64,
        median_duration: i64,
        max_duration: i64,
        total_duration: i64,
    },
}

impl Event {
    pub fn header(&self) -> &EventHeader {
        match self {
            Event::StopwatchStart { header, .. } => header,
            Event::StopwatchStop { header, .. } => header,
            Event::StopwatchSummary { header, .. } => header,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.header().process_id
    }

    pub fn thread_id(&self) -> &str {
        &self.header().thread_id
    }

    pub fn timestamp(&self) -> i64 {
        self.header().timestamp
    }

    /// Parses one already-split CSV row. Field 3 (0-indexed) discriminates
    /// the variant; everything before it is the shared header.
    pub fn parse(fields: &[&str]) -> Result<Event, CodecError> {
        if fields.len() < 4 {
            return Err(CodecError::MalformedEvent("<short row>".into(), fields.len(), 4));
        }
        let header = EventHeader {
            process_id: fields[0].to_string(),
            thread_id: fields[1].to_string(),
            timestamp: fields[2].parse()?,
        };
        match fields[3] {
            "sw_start" => {
                if fields.len() != 7 {
                    return Err(CodecError::MalformedEvent("sw_start".into(), fields.len(), 7));
                }
                Ok(Event::StopwatchStart {
                    header,
                    function_name: fields[4].to_string(),
                    label: parse_optional_str(fields[5]),
                    index: parse_optional_int(fields[6])?,
                })
            }
            "sw_stop" => {
                if fields.len() != 4 {
                    return Err(CodecError::MalformedEvent("sw_stop".into(), fields.len(), 4));
                }
                Ok(Event::StopwatchStop { header })
            }
            "sw_summary" => {
                if fields.len() != 13 {
                    return Err(CodecError::MalformedEvent("sw_summary".into(), fields.len(), 13));
                }
                Ok(Event::StopwatchSummary {
                    header,
                    function_name: fields[4].to_string(),
                    label: parse_optional_str(fields[5]),
                    executions_count: fields[6].parse()?,
                    average_duration: fields[7].parse()?,
                    duration_standard_deviation: fields[8].parse()?,
                    min_duration: fields[9].parse()?,
                    median_duration: fields[10].parse()?,
                    max_duration: fields[11].parse()?,
                    total_duration: fields[12].parse()?,
                })
            }
            other => Err(CodecError::UnknownEventTag(other.to_string())),
        }
    }

    /// Parses one raw CSV line (no external CSV crate needed: fields here
    /// never contain commas or quoting, per §6).
    pub fn parse_line(line: &str) -> Result<Event, CodecError> {
        let fields: Vec<&str> = line.split(',').collect();
        Event::parse(&fields)
    }

    /// Re-renders this event as the CSV fields it would have been parsed
    /// from. Used by round-trip tests; the instrumentation collaborator
    /// that actually writes these files is out of this crate's scope.
    pub fn encode(&self) -> Vec<String> {
        let header = self.header();
        let mut fields = vec![
            header.process_id.clone(),
            header.thread_id.clone(),
            header.timestamp.to_string(),
        ];
        match self {
            Event::StopwatchStart { function_name, label, index, .. } => {
                fields.push("sw_start".to_string());
                fields.push(function_name.clone());
                fields.push(encode_optional_str(label));
                fields.push(encode_optional_int(index));
            }
            Event::StopwatchStop { .. } => {
                fields.push("sw_stop".to_string());
            }
            Event::StopwatchSummary {
                function_name,
                label,
                executions_count,
                average_duration,
                duration_standard_deviation,
                min_duration,
                median_duration,
                max_duration,
                total_duration,
                ..
            } => {
                fields.push("sw_summary".to_string());
                fields.push(function_name.clone());
                fields.push(encode_optional_str(label));
                fields.push(executions_count.to_string());
                fields.push(average_duration.to_string());
                fields.push(duration_standard_deviation.to_string());
                fields.push(min_duration.to_string());
                fields.push(median_duration.to_string());
                fields.push(max_duration.to_string());
                fields.push(total_duration.to_string());
            }
        }
        fields
    }

    pub fn encode_line(&self) -> String {
        self.encode().join(",")
    }
}

fn parse_optional_str(field: &str) -> Option<String> {
    if field == DASH {
        None
    } else {
        Some(field.to_string())
    }
}

fn parse_optional_int(field: &str) -> Result<Option<i64>, CodecError> {
    if field == DASH {
        Ok(None)
    } else {
        Ok(Some(field.parse()?))
    }
}

fn encode_optional_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| DASH.to_string())
}

fn encode_optional_int(value: &Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| DASH.to_string())
}
