/// Core data types for the coastal hazard prediction service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic beyond small accessors, no I/O, and no external
/// dependencies besides chrono/serde, only types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// The four weather metrics carried through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Humidity,
    WindSpeed,
    Rainfall,
}

/// All metrics, in canonical order. Iteration order matters for feature
/// extraction and for stable response layout.
pub const ALL_METRICS: [Metric; 4] = [
    Metric::Temperature,
    Metric::Humidity,
    Metric::WindSpeed,
    Metric::Rainfall,
];

impl Metric {
    /// Canonical short name used in feature field names and alert metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::WindSpeed => "wind_speed",
            Metric::Rainfall => "rainfall",
        }
    }

    /// Ordered source-column synonyms for this metric. Source datasets come
    /// from several archives with inconsistent headers; the first candidate
    /// present in a dataset's header row wins, resolved once at load time.
    pub fn column_candidates(&self) -> &'static [&'static str] {
        match self {
            Metric::Temperature => &["temperature", "temp", "Temperature (C)", "temperature_x"],
            Metric::Humidity => &["humidity", "Humidity", "humidity_x"],
            Metric::WindSpeed => &["wind_speed", "Wind Speed (km/h)", "wind_speed_x"],
            Metric::Rainfall => &["rainfall", "precipitation", "rain", "rainfall_x"],
        }
    }
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// One row from either observation dataset.
///
/// Every field is optional: archives routinely lack coordinates, timestamps,
/// or individual metric readings. A missing value is a first-class state,
/// distinct from zero, and is threaded through the pipeline as `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationRow {
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Observation instant for current rows; observation date for historical
    /// rows (midnight UTC).
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rainfall: Option<f64>,
}

impl ObservationRow {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::WindSpeed => self.wind_speed,
            Metric::Rainfall => self.rainfall,
        }
    }

    pub fn set_metric(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Temperature => self.temperature = value,
            Metric::Humidity => self.humidity = value,
            Metric::WindSpeed => self.wind_speed = value,
            Metric::Rainfall => self.rainfall = value,
        }
    }
}

/// Present-moment conditions returned by a live weather provider.
///
/// Units are normalized at the provider boundary: temperature °C, relative
/// humidity %, wind speed m/s, rainfall mm. Any field a provider omits
/// stays `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveConditions {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rainfall: Option<f64>,
}

impl LiveConditions {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::WindSpeed => self.wind_speed,
            Metric::Rainfall => self.rainfall,
        }
    }
}

// ---------------------------------------------------------------------------
// Feature record
// ---------------------------------------------------------------------------

/// Rolling statistics for one metric over the historical window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RollingStats {
    /// Mean over in-window samples. Defined with >= 1 sample.
    pub mean: Option<f64>,
    /// Population standard deviation. Defined with >= 1 sample.
    pub std: Option<f64>,
    /// Latest minus earliest in-window reading, chronological order.
    /// Defined with >= 2 samples.
    pub trend: Option<f64>,
}

/// The unit passed to inference: one normalized view of everything known
/// about a location at a point in time.
///
/// Invariant: a FeatureRecord is always produced once any data source has at
/// least one row. In the worst case every current metric is `None` and only
/// the calendar and location fields carry information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub city: Option<String>,
    pub timestamp: DateTime<Utc>,

    pub temperature_current: Option<f64>,
    pub humidity_current: Option<f64>,
    pub wind_speed_current: Option<f64>,
    pub rainfall_current: Option<f64>,

    pub temperature_stats: RollingStats,
    pub humidity_stats: RollingStats,
    pub wind_speed_stats: RollingStats,
    pub rainfall_stats: RollingStats,

    /// Calendar features derived purely from the request timestamp (UTC).
    pub hour: u32,
    pub dayofweek: u32,
    pub month: u32,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// True when any current metric was filled from a live network fetch
    /// rather than from stored data.
    pub live_source: bool,
}

impl FeatureRecord {
    pub fn current(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature_current,
            Metric::Humidity => self.humidity_current,
            Metric::WindSpeed => self.wind_speed_current,
            Metric::Rainfall => self.rainfall_current,
        }
    }

    pub fn set_current(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Temperature => self.temperature_current = value,
            Metric::Humidity => self.humidity_current = value,
            Metric::WindSpeed => self.wind_speed_current = value,
            Metric::Rainfall => self.rainfall_current = value,
        }
    }

    pub fn set_stats(&mut self, metric: Metric, stats: RollingStats) {
        match metric {
            Metric::Temperature => self.temperature_stats = stats,
            Metric::Humidity => self.humidity_stats = stats,
            Metric::WindSpeed => self.wind_speed_stats = stats,
            Metric::Rainfall => self.rainfall_stats = stats,
        }
    }
}

// ---------------------------------------------------------------------------
// Inference types
// ---------------------------------------------------------------------------

/// Output of one successful model invocation.
///
/// Failures never become a `ModelOutcome`; they are accumulated as strings in
/// the batch error list so one bad model cannot suppress the others.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutcome {
    pub model_id: &'static str,
    pub value: f64,
    /// Probability mass on the positive class, for classifiers. In [0, 1].
    pub probability: Option<f64>,
}

// ---------------------------------------------------------------------------
// Alert types
// ---------------------------------------------------------------------------

/// Alert severity tiers, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

/// A structured, human-readable hazard alert derived from model outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: &'static str,
    pub severity: Severity,
    pub metric: &'static str,
    pub value: Option<f64>,
    pub unit: &'static str,
    pub confidence: Option<f64>,
    pub text: String,
    pub suggested_action: &'static str,
    /// Free-form provenance: which model (or rule) produced this alert.
    pub model_meta: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Request-fatal pipeline errors.
///
/// Everything else in the pipeline degrades gracefully: live-fetch failures
/// fall back to stored data, model failures go to a per-response error list,
/// and alert composition failures drop only the single affected alert.
#[derive(Debug, PartialEq)]
pub enum PipelineError {
    /// User-supplied timestamp could not be parsed.
    InvalidTimestamp(String),
    /// Neither observation dataset has any row at all.
    LocationUnresolved,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::InvalidTimestamp(raw) => {
                write!(f, "Invalid timestamp: {}", raw)
            }
            PipelineError::LocationUnresolved => {
                write!(f, "No current data found for location and no fallback available")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
