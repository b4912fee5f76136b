//! Core data models shared by the plugins

use crate::error::{AdvisorError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single input or output observation of the impact framework.
///
/// Records are open-ended JSON objects; plugins read the fields they know
/// and copy everything else through untouched.
pub type PluginRecord = Map<String, Value>;

/// Read an optional numeric field, rejecting values of any other type
pub fn record_f64(record: &PluginRecord, key: &str) -> Result<Option<f64>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| AdvisorError::InputValidation(format!("{} is not a finite number", key))),
        Some(other) => Err(AdvisorError::InputValidation(format!(
            "{} must be a number, got {}",
            key, other
        ))),
    }
}

/// Read a required numeric field
pub fn require_f64(record: &PluginRecord, key: &str) -> Result<f64> {
    record_f64(record, key)?
        .ok_or_else(|| AdvisorError::InputValidation(format!("required field {} is missing", key)))
}

/// Read an optional non-empty string field
pub fn record_str<'a>(record: &'a PluginRecord, key: &str) -> Result<Option<&'a str>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(AdvisorError::InputValidation(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

/// Read a required non-empty string field
pub fn require_str<'a>(record: &'a PluginRecord, key: &str) -> Result<&'a str> {
    record_str(record, key)?
        .ok_or_else(|| AdvisorError::InputValidation(format!("required field {} is missing", key)))
}

/// Carbon-intensity data point returned by an emissions source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsRecord {
    pub location: String,
    pub time: DateTime<Utc>,
    pub rating: f64,
    /// Span covered by the rating, formatted `HH:MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl EmissionsRecord {
    pub fn new(location: impl Into<String>, time: DateTime<Utc>, rating: f64) -> Self {
        Self {
            location: location.into(),
            time,
            rating,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    /// Parsed duration, zero when absent or malformed
    pub fn span(&self) -> Duration {
        self.duration
            .as_deref()
            .and_then(parse_hms)
            .unwrap_or_else(Duration::zero)
    }

    /// End of the span covered by this record
    pub fn end(&self) -> DateTime<Utc> {
        self.time + self.span()
    }

    /// Whether the record's span touches the window, bounds inclusive
    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        self.time <= window.to && self.end() >= window.from
    }

    /// JSON form used in plugin output (`time` as RFC 3339 with offset)
    pub fn to_output(&self) -> Value {
        let mut map = Map::new();
        map.insert("location".into(), Value::String(self.location.clone()));
        map.insert("time".into(), Value::String(self.time.to_rfc3339()));
        map.insert("rating".into(), serde_json::json!(self.rating));
        if let Some(duration) = &self.duration {
            map.insert("duration".into(), Value::String(duration.clone()));
        }
        Value::Object(map)
    }
}

/// Parse an `HH:MM:SS` duration
pub fn parse_hms(value: &str) -> Option<Duration> {
    let mut parts = value.split(':');
    let hours: i64 = parts.next()?.trim().parse().ok()?;
    let minutes: i64 = parts.next()?.trim().parse().ok()?;
    let seconds: i64 = parts.next().unwrap_or("0").trim().parse().ok()?;
    if parts.next().is_some() || hours < 0 || minutes < 0 || seconds < 0 {
        return None;
    }
    Some(Duration::hours(hours) + Duration::minutes(minutes) + Duration::seconds(seconds))
}

/// Allowed time window for running a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, enforcing `from < to`
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from >= to {
            return Err(AdvisorError::Configuration(format!(
                "Start time {} must be before end time {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(Self { from, to })
    }

    /// Parse the `"<from> - <to>"` form used in plugin configuration
    pub fn parse(value: &str) -> Result<Self> {
        let (from, to) = value
            .split_once(" - ")
            .ok_or_else(|| AdvisorError::Configuration(format!("Timeframe {} is invalid", value)))?;
        let from = parse_instant(from)
            .ok_or_else(|| AdvisorError::Configuration(format!("Timeframe {} is invalid", value)))?;
        let to = parse_instant(to)
            .ok_or_else(|| AdvisorError::Configuration(format!("Timeframe {} is invalid", value)))?;
        Self::new(from, to)
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
