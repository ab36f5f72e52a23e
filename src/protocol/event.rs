// src/protocol/event.rs

//! Progress event model and its JSON codec.
//!
//! Every event is one JSON object carrying the envelope fields `version`,
//! `event`, `timestamp` and `worker_id`, plus fields specific to the variant.
//! Decoding is two-stage: the envelope and the `event` tag are read first,
//! then the variant body. Tags this build does not know decode to
//! [`EventBody::Other`] instead of failing.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event payload is not a JSON object")]
    NotAnObject,

    #[error("event payload has no string `event` field")]
    MissingEvent,
}

/// Fields present on every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,

    /// Seconds since the Unix epoch, as written by the producer.
    pub timestamp: f64,

    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMarker {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStart {
    #[serde(deserialize_with = "string_or_number")]
    pub taskid: String,
    pub test_name: String,
    #[serde(default)]
    pub test_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnd {
    #[serde(deserialize_with = "string_or_number")]
    pub taskid: String,
    pub test_name: String,
    #[serde(default)]
    pub test_file: String,
    pub result: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Fixed set of runner phases reported by section events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionPhase {
    CommonSetup,
    Setup,
    Test,
    Cleanup,
    CommonCleanup,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStart {
    pub section: SectionPhase,
    #[serde(deserialize_with = "string_or_number")]
    pub parent_task: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEnd {
    pub section: SectionPhase,
    #[serde(deserialize_with = "string_or_number")]
    pub parent_task: String,
    pub result: String,
}

/// Closed set of event variants.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    JobStart(JobMarker),
    JobEnd(JobMarker),
    TaskStart(TaskStart),
    TaskEnd(TaskEnd),
    SectionStart(SectionStart),
    SectionEnd(SectionEnd),
    /// Last line before the producer closes stdout.
    StreamComplete,
    /// A tag this consumer does not know; logged and otherwise ignored.
    Other { event: String },
}

impl EventBody {
    pub fn name(&self) -> &str {
        match self {
            EventBody::JobStart(_) => "job_start",
            EventBody::JobEnd(_) => "job_end",
            EventBody::TaskStart(_) => "task_start",
            EventBody::TaskEnd(_) => "task_end",
            EventBody::SectionStart(_) => "section_start",
            EventBody::SectionEnd(_) => "section_end",
            EventBody::StreamComplete => "stream_complete",
            EventBody::Other { event } => event,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub envelope: Envelope,
    pub body: EventBody,
}

impl ProgressEvent {
    pub fn new(envelope: Envelope, body: EventBody) -> Self {
        Self { envelope, body }
    }

    /// Decode the JSON body of an event line (prefix already stripped).
    pub fn decode(json: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        let tag = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingEvent)?;

        let envelope = Envelope::deserialize(&value)?;

        let body = match tag {
            "job_start" => EventBody::JobStart(JobMarker::deserialize(&value)?),
            "job_end" => EventBody::JobEnd(JobMarker::deserialize(&value)?),
            "task_start" => EventBody::TaskStart(TaskStart::deserialize(&value)?),
            "task_end" => EventBody::TaskEnd(TaskEnd::deserialize(&value)?),
            "section_start" => EventBody::SectionStart(SectionStart::deserialize(&value)?),
            "section_end" => EventBody::SectionEnd(SectionEnd::deserialize(&value)?),
            "stream_complete" => EventBody::StreamComplete,
            other => EventBody::Other {
                event: other.to_string(),
            },
        };

        Ok(Self { envelope, body })
    }

    /// Encode as a single-line JSON object (no embedded newlines).
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut map = Map::new();
        map.insert("version".into(), Value::String(self.envelope.version.clone()));
        map.insert("event".into(), Value::String(self.body.name().to_string()));
        map.insert("timestamp".into(), serde_json::to_value(self.envelope.timestamp)?);
        if let Some(worker_id) = &self.envelope.worker_id {
            map.insert("worker_id".into(), Value::String(worker_id.clone()));
        }

        let body = match &self.body {
            EventBody::JobStart(m) | EventBody::JobEnd(m) => serde_json::to_value(m)?,
            EventBody::TaskStart(t) => serde_json::to_value(t)?,
            EventBody::TaskEnd(t) => serde_json::to_value(t)?,
            EventBody::SectionStart(s) => serde_json::to_value(s)?,
            EventBody::SectionEnd(s) => serde_json::to_value(s)?,
            EventBody::StreamComplete | EventBody::Other { .. } => Value::Null,
        };
        if let Value::Object(fields) = body {
            map.extend(fields);
        }

        serde_json::to_string(&Value::Object(map))
    }
}

/// Producers written in dynamic languages send some ids as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!(
            "expected string, number or null, got {other}"
        ))),
    }
}
