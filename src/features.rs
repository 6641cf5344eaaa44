/// Feature vector construction.
///
/// Orchestrates location resolution, optional live enrichment, and rolling
/// historical statistics into one normalized `FeatureRecord`, the unit every
/// model consumes. This is the seam where three imperfect sources meet:
/// stored current observations, stored history, and the live providers.
///
/// Enrichment policy: live data only ever fills metrics that are still
/// absent after the stored row is read. A present stored value is never
/// overwritten, and a failed fetch silently degrades to stored/absent data.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::config::PipelineConfig;
use crate::live::LiveWeatherClient;
use crate::model::{
    ALL_METRICS, FeatureRecord, Metric, ObservationRow, PipelineError, RollingStats,
};
use crate::resolve;
use crate::store::{ObservationStore, parse_timestamp_cell};

/// Coordinate tolerance for matching historical rows when no city label is
/// known, in degrees (matches the curation granularity of the datasets).
const COORD_MATCH_TOLERANCE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Build a feature record for a location and instant, defaulting the
/// timestamp to the current wall clock.
pub fn build(
    store: &ObservationStore,
    live: Option<&LiveWeatherClient>,
    config: &PipelineConfig,
    city: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
    timestamp_raw: Option<&str>,
) -> Result<FeatureRecord, PipelineError> {
    build_at(store, live, config, city, lat, lon, timestamp_raw, Utc::now())
}

/// Build with an explicit "now", for deterministic tests.
#[allow(clippy::too_many_arguments)]
pub fn build_at(
    store: &ObservationStore,
    live: Option<&LiveWeatherClient>,
    config: &PipelineConfig,
    city: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
    timestamp_raw: Option<&str>,
    now: DateTime<Utc>,
) -> Result<FeatureRecord, PipelineError> {
    let timestamp = match timestamp_raw {
        None => now,
        Some(raw) => parse_timestamp_cell(raw)
            .ok_or_else(|| PipelineError::InvalidTimestamp(raw.to_string()))?,
    };

    let resolved = resolve::resolve(store, city, lat, lon, timestamp)?;

    let mut record = FeatureRecord {
        city: resolved.city.clone().or_else(|| city.map(str::to_string)),
        timestamp,
        temperature_current: None,
        humidity_current: None,
        wind_speed_current: None,
        rainfall_current: None,
        temperature_stats: RollingStats::default(),
        humidity_stats: RollingStats::default(),
        wind_speed_stats: RollingStats::default(),
        rainfall_stats: RollingStats::default(),
        hour: timestamp.hour(),
        dayofweek: timestamp.weekday().num_days_from_monday(),
        month: timestamp.month(),
        // prefer the resolved row's own coordinate over the request's
        latitude: resolved.latitude.or(lat),
        longitude: resolved.longitude.or(lon),
        live_source: false,
    };

    for metric in ALL_METRICS {
        record.set_current(metric, resolved.metric(metric));
    }

    if let Some(client) = live {
        enrich_from_live(&mut record, &resolved, client, config);
    }

    let window = recent_history(
        store.historical(),
        record.city.as_deref(),
        record.latitude,
        record.longitude,
        timestamp,
        config.history_days,
    );
    for metric in ALL_METRICS {
        record.set_stats(metric, rolling_stats(&window, metric));
    }

    Ok(record)
}

// ---------------------------------------------------------------------------
// Live enrichment
// ---------------------------------------------------------------------------

/// Whether the stored observation justifies a live fetch: a missing core
/// metric (temperature, humidity, wind), or an observation more than
/// `stale_after_minutes` older than the request instant. A row without an
/// observation timestamp cannot prove freshness and counts as stale.
fn needs_enrichment(
    record: &FeatureRecord,
    observed_at: Option<DateTime<Utc>>,
    config: &PipelineConfig,
) -> bool {
    let core_missing = record.temperature_current.is_none()
        || record.humidity_current.is_none()
        || record.wind_speed_current.is_none();
    let stale = match observed_at {
        Some(at) => record.timestamp - at > Duration::minutes(config.stale_after_minutes),
        None => true,
    };
    core_missing || stale
}

fn enrich_from_live(
    record: &mut FeatureRecord,
    resolved: &ObservationRow,
    client: &LiveWeatherClient,
    config: &PipelineConfig,
) {
    if !needs_enrichment(record, resolved.timestamp, config) {
        return;
    }
    let (Some(lat), Some(lon)) = (record.latitude, record.longitude) else {
        return;
    };
    let Some(conditions) = client.fetch(lat, lon) else {
        // enrichment unavailable: keep whatever storage gave us
        return;
    };
    if fill_absent_from_live(record, &conditions) {
        record.live_source = true;
    }
}

/// Copy live values into metrics that are still absent. Returns whether
/// anything was filled. Present stored values are never overwritten.
fn fill_absent_from_live(
    record: &mut FeatureRecord,
    conditions: &crate::model::LiveConditions,
) -> bool {
    let mut filled_any = false;
    for metric in ALL_METRICS {
        if record.current(metric).is_none() {
            if let Some(value) = conditions.metric(metric) {
                record.set_current(metric, Some(value));
                filled_any = true;
            }
        }
    }
    filled_any
}

// ---------------------------------------------------------------------------
// Rolling statistics
// ---------------------------------------------------------------------------

/// Historical rows for the resolved location dated within the window, in
/// chronological order. Location match is by city label when one is known,
/// otherwise by coordinate proximity.
fn recent_history<'a>(
    historical: &'a [ObservationRow],
    city: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
    as_of: DateTime<Utc>,
    history_days: i64,
) -> Vec<&'a ObservationRow> {
    let cutoff = as_of - Duration::days(history_days);
    let wanted_city = city.map(|c| c.trim().to_lowercase());

    let mut window: Vec<&ObservationRow> = historical
        .iter()
        .filter(|row| match (&wanted_city, lat, lon) {
            (Some(wanted), _, _) => row
                .city
                .as_deref()
                .is_some_and(|c| c.trim().to_lowercase() == *wanted),
            (None, Some(lat), Some(lon)) => {
                row.latitude
                    .is_some_and(|rl| (rl - lat).abs() <= COORD_MATCH_TOLERANCE)
                    && row
                        .longitude
                        .is_some_and(|rl| (rl - lon).abs() <= COORD_MATCH_TOLERANCE)
            }
            (None, _, _) => false,
        })
        .filter(|row| row.timestamp.is_some_and(|ts| ts >= cutoff))
        .collect();
    window.sort_by_key(|row| row.timestamp);
    window
}

/// Mean and population standard deviation over in-window samples, plus
/// trend (latest minus earliest) when at least two samples exist.
fn rolling_stats(window: &[&ObservationRow], metric: Metric) -> RollingStats {
    let samples: Vec<f64> = window.iter().filter_map(|row| row.metric(metric)).collect();
    if samples.is_empty() {
        return RollingStats::default();
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let trend = if samples.len() >= 2 {
        Some(samples[samples.len() - 1] - samples[0])
    } else {
        None
    };
    RollingStats {
        mean: Some(mean),
        std: Some(variance.sqrt()),
        trend,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
