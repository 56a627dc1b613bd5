use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LabError;

/// Version tag written alongside every persisted series
pub const SERIES_FORMAT_VERSION: &str = "1";

/// A single voltage/current reading as returned by a power supply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub voltage_v: f64,
    pub current_a: f64,
}

impl Reading {
    pub fn new(voltage_v: f64, current_a: f64) -> Self {
        Self {
            voltage_v,
            current_a,
        }
    }
}

/// One timestamped reading in a recorded series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    #[serde(with = "non_finite")]
    pub voltage_v: f64,
    #[serde(with = "non_finite")]
    pub current_a: f64,
}

/// JSON has no NaN or infinity, so those are written as the strings
/// `"NaN"`, `"inf"` and `"-inf"`.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value == f64::INFINITY {
            serializer.serialize_str("inf")
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str("-inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid reading {other:?}"))),
            },
        }
    }
}

impl Sample {
    pub fn new(time: DateTime<Utc>, reading: Reading) -> Self {
        Self {
            time,
            voltage_v: reading.voltage_v,
            current_a: reading.current_a,
        }
    }
}

/// Ordered samples from one recording session plus the metadata that is
/// persisted with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub values: Vec<Sample>,
    pub file_name: String,
    pub version: String,
}

impl Series {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            values: Vec::new(),
            file_name: file_name.into(),
            version: SERIES_FORMAT_VERSION.to_string(),
        }
    }

    /// Append a sample, clamping its timestamp so the series never goes
    /// backwards when the wall clock is stepped.
    pub fn push(&mut self, mut sample: Sample) {
        if let Some(last) = self.values.last() {
            if sample.time < last.time {
                sample.time = last.time;
            }
        }
        self.values.push(sample);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Seconds since the first sample, one entry per sample
    pub fn elapsed_seconds(&self) -> Vec<f64> {
        let Some(first) = self.values.first() else {
            return Vec::new();
        };
        self.values
            .iter()
            .map(|s| (s.time - first.time).num_microseconds().unwrap_or(0) as f64 * 1e-6)
            .collect()
    }

    pub fn voltages(&self) -> Vec<f64> {
        self.values.iter().map(|s| s.voltage_v).collect()
    }

    pub fn currents(&self) -> Vec<f64> {
        self.values.iter().map(|s| s.current_a).collect()
    }
}

/// How long a recording runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBound {
    Bounded(Duration),
    /// Run until cancelled
    Unbounded,
}

impl RecordBound {
    pub fn is_reached(&self, elapsed: Duration) -> bool {
        match self {
            RecordBound::Bounded(limit) => elapsed >= *limit,
            RecordBound::Unbounded => false,
        }
    }
}

impl FromStr for RecordBound {
    type Err = LabError;

    /// `"0"` means unbounded, any other non-negative float is seconds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let seconds: f64 = s.trim().parse().map_err(|_| {
            LabError::Config(format!(
                "Unknown duration {s}. Must be 0, or a float (number of seconds)."
            ))
        })?;
        if seconds == 0.0 {
            return Ok(RecordBound::Unbounded);
        }
        Duration::try_from_secs_f64(seconds)
            .map(RecordBound::Bounded)
            .map_err(|_| {
                LabError::Config(format!(
                    "Unknown duration {s}. Must be 0, or a float (number of seconds)."
                ))
            })
    }
}

impl fmt::Display for RecordBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordBound::Bounded(d) => write!(f, "{:.3} s", d.as_secs_f64()),
            RecordBound::Unbounded => write!(f, "until interrupted"),
        }
    }
}

/// Parse a sampling period in seconds; `0` disables the inter-sample delay
pub fn parse_period(s: &str) -> Result<Duration, LabError> {
    s.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            LabError::Config(format!(
                "Invalid period {s}. Must be a non-negative number of seconds."
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
    C,
    D,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::A => "A",
            Channel::B => "B",
            Channel::C => "C",
            Channel::D => "D",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coupling {
    Ac,
    #[default]
    Dc,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSetup {
    pub coupling: Coupling,
    pub voltage_range_v: f64,
    pub voltage_offset_v: f64,
}

impl Default for ChannelSetup {
    fn default() -> Self {
        Self {
            coupling: Coupling::Dc,
            voltage_range_v: 0.05,
            voltage_offset_v: 0.0,
        }
    }
}

/// Block-mode capture set: one row per capture, raw ADC counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub serial_number: String,
    pub channel: Channel,
    pub sample_interval_s: f64,
    pub captures: Array2<i16>,
}

impl Trace {
    pub fn num_captures(&self) -> usize {
        self.captures.nrows()
    }

    pub fn samples_per_capture(&self) -> usize {
        self.captures.ncols()
    }

    /// Mean of all raw counts across every capture
    pub fn mean_counts(&self) -> Option<f64> {
        self.captures.mapv(f64::from).mean()
    }
}
