use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SensorSample
// ---------------------------------------------------------------------------

/// One raw telemetry reading. `timestamp` is unix seconds and unique.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp: i64,
    pub torque: f64,
    pub speed: f64,
    pub oil_temperature: f64,
}

impl SensorSample {
    /// Feature row in the order the destruction model is trained on.
    pub fn features(&self) -> Vec<f64> {
        vec![self.torque, self.speed, self.oil_temperature]
    }
}

// ---------------------------------------------------------------------------
// DestructionRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DestructionRecord {
    pub timestamp: i64,
    /// Instantaneous increment for this sample.
    pub destruction: f64,
    /// Running total including this record's own increment.
    pub accumulated_destruction: f64,
}

// ---------------------------------------------------------------------------
// BatchWindow
// ---------------------------------------------------------------------------

/// Contiguous timestamp range. Store queries treat both ends as inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    pub start: i64,
    pub stop: i64,
}

impl BatchWindow {
    pub fn new(start: i64, stop: i64) -> Self {
        Self { start, stop }
    }

    pub fn span(&self) -> i64 {
        self.stop - self.start
    }
}

impl fmt::Display for BatchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            format_timestamp(self.start),
            format_timestamp(self.stop)
        )
    }
}

// ---------------------------------------------------------------------------
// TimestampBounds
// ---------------------------------------------------------------------------

/// MIN/MAX timestamp of a table; both `None` when the table is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampBounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl TimestampBounds {
    pub fn is_empty(&self) -> bool {
        self.max.is_none()
    }
}

/// Render unix seconds as `YYYY-MM-DD HH:MM:SS` (UTC) for log lines.
pub fn format_timestamp(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}
