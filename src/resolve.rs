/// Location resolution against the observation store.
///
/// Given a city name and/or a coordinate, finds the best-available row to
/// treat as the current observation. No single data source is complete, so
/// resolution walks a fallback chain (first success wins):
///
///   1. Exact case-insensitive city match in the current table, most recent
///      timestamp first.
///   2. Coordinate only: nearest historical station gives a city label, then
///      retry step 1 with that city.
///   3. Coordinate given: nearest current row, preferring rows observed
///      within 2 hours of `as_of` (falling open to all rows if none are).
///   4. Nearest historical station, used directly as the current observation.
///   5. The single most recent current row, regardless of location.
///
/// Fails with `LocationUnresolved` only when both tables are empty. A
/// resolved row may still have every metric missing; that is not an error.
///
/// Distance is planar squared-coordinate difference, not geodesic. This
/// mis-ranks candidates at high latitude or large radii; adequate at the
/// city granularity the datasets have, and kept consistent with how the
/// station data was curated.

use chrono::{DateTime, Duration, Utc};

use crate::model::{ObservationRow, PipelineError};
use crate::store::ObservationStore;

/// Window for "recent" current observations in the coordinate-nearest step.
const RECENT_WINDOW_HOURS: i64 = 2;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

pub fn resolve(
    store: &ObservationStore,
    city: Option<&str>,
    lat: Option<f64>,
    lon: Option<f64>,
    as_of: DateTime<Utc>,
) -> Result<ObservationRow, PipelineError> {
    // Step 1: exact city match in the current table.
    if let Some(city) = city {
        if let Some(row) = best_city_match(store.current(), city) {
            return Ok(row.clone());
        }
    }

    // Step 2: map the coordinate to a historical station's city label and
    // retry the current-table city match.
    if city.is_none() {
        if let (Some(lat), Some(lon)) = (lat, lon) {
            if let Some(station) = nearest_row(store.historical(), lat, lon) {
                if let Some(station_city) = station.city.as_deref() {
                    if let Some(row) = best_city_match(store.current(), station_city) {
                        return Ok(row.clone());
                    }
                }
            }
        }
    }

    // Step 3: nearest current row, preferring recently observed rows.
    if let (Some(lat), Some(lon)) = (lat, lon) {
        let cutoff = as_of - Duration::hours(RECENT_WINDOW_HOURS);
        let recent: Vec<&ObservationRow> = store
            .current()
            .iter()
            .filter(|row| row.timestamp.is_some_and(|ts| ts >= cutoff))
            .collect();
        let candidates: Vec<&ObservationRow> = if recent.is_empty() {
            store.current().iter().collect()
        } else {
            recent
        };
        if let Some(row) = nearest_of(&candidates, lat, lon) {
            return Ok(row.clone());
        }

        // Step 4: nearest historical station, used directly.
        if let Some(row) = nearest_row(store.historical(), lat, lon) {
            return Ok(row.clone());
        }
    }

    // Step 5: most recent current row, regardless of location.
    if let Some(row) = most_recent(store.current()) {
        return Ok(row.clone());
    }

    // City-only requests never reach the coordinate steps; give the
    // historical table one last chance before giving up.
    if let Some(row) = most_recent(store.historical()) {
        return Ok(row.clone());
    }

    Err(PipelineError::LocationUnresolved)
}

// ---------------------------------------------------------------------------
// Matching helpers
// ---------------------------------------------------------------------------

/// Most recent row whose city matches case-insensitively. Rows without a
/// timestamp sort last.
fn best_city_match<'a>(rows: &'a [ObservationRow], city: &str) -> Option<&'a ObservationRow> {
    let wanted = city.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    rows.iter()
        .filter(|row| {
            row.city
                .as_deref()
                .is_some_and(|c| c.trim().to_lowercase() == wanted)
        })
        .max_by_key(|row| row.timestamp)
}

/// Squared planar distance between a row's coordinate and the query point.
/// Rows without a full coordinate are excluded by returning `None`.
fn squared_distance(row: &ObservationRow, lat: f64, lon: f64) -> Option<f64> {
    let (row_lat, row_lon) = (row.latitude?, row.longitude?);
    let (dlat, dlon) = (row_lat - lat, row_lon - lon);
    Some(dlat * dlat + dlon * dlon)
}

fn nearest_row(rows: &[ObservationRow], lat: f64, lon: f64) -> Option<&ObservationRow> {
    let refs: Vec<&ObservationRow> = rows.iter().collect();
    nearest_of(&refs, lat, lon)
}

fn nearest_of<'a>(rows: &[&'a ObservationRow], lat: f64, lon: f64) -> Option<&'a ObservationRow> {
    rows.iter()
        .filter_map(|row| squared_distance(row, lat, lon).map(|d| (d, *row)))
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, row)| row)
}

fn most_recent(rows: &[ObservationRow]) -> Option<&ObservationRow> {
    rows.iter().max_by_key(|row| row.timestamp)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
