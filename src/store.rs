/// Observation store: read-only access to the two tabular weather datasets.
///
/// Two CSV files are loaded once at process start and held for the process
/// lifetime: a "current observations" table (most recent reading per
/// location, possibly stale) and a "historical observations" table (dated,
/// multi-year, multi-location). Refreshing either requires a restart.
///
/// The datasets come from different public archives and do not agree on
/// column names, so each metric carries an ordered synonym list (see
/// `Metric::column_candidates`). Synonyms are resolved against the header
/// row exactly once at load time, producing a fixed column index per field;
/// per-row access is then a plain index lookup.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

use crate::logging::{self, Source};
use crate::model::{ALL_METRICS, Metric, ObservationRow};

// ---------------------------------------------------------------------------
// Sentinel-null normalization
// ---------------------------------------------------------------------------

/// Parse one CSV cell into a numeric value, mapping every sentinel-null
/// spelling the source archives use to `None`: empty string, textual
/// "nan"/"none"/"null" (any case), and an actual parsed NaN.
pub fn normalize_cell(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.to_lowercase().as_str() {
        "nan" | "none" | "null" => return None,
        _ => {}
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parse a CSV text cell, mapping sentinel nulls to `None`.
fn normalize_text_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.to_lowercase().as_str() {
        "nan" | "none" | "null" => None,
        _ => Some(trimmed.to_string()),
    }
}

/// Parse a timestamp cell. The archives mix RFC 3339 instants, naive
/// datetimes, and bare dates; all are interpreted as UTC.
pub fn parse_timestamp_cell(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

// ---------------------------------------------------------------------------
// Column resolution
// ---------------------------------------------------------------------------

const CITY_CANDIDATES: &[&str] = &["city", "City", "region", "location"];
const LAT_CANDIDATES: &[&str] = &["latitude", "Latitude", "lat"];
const LON_CANDIDATES: &[&str] = &["longitude", "Longitude", "lon"];
const TIME_CANDIDATES: &[&str] = &["timestamp", "datetime", "date", "Formatted Date"];

/// Header-resolved column indices for one dataset.
///
/// Any field may be unresolved (`None`); a dataset without, say, a city
/// column still loads; rows simply carry no city identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    pub city: Option<usize>,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
    pub timestamp: Option<usize>,
    /// Indexed by `ALL_METRICS` order.
    pub metrics: [Option<usize>; 4],
}

impl ColumnMap {
    /// Resolve all field synonyms against a header row. First candidate
    /// present wins; candidates are matched exactly as spelled.
    pub fn resolve(headers: &[&str]) -> ColumnMap {
        let find = |candidates: &[&str]| -> Option<usize> {
            candidates
                .iter()
                .find_map(|cand| headers.iter().position(|h| h.trim() == *cand))
        };
        let mut metrics = [None; 4];
        for (i, metric) in ALL_METRICS.iter().enumerate() {
            metrics[i] = find(metric.column_candidates());
        }
        ColumnMap {
            city: find(CITY_CANDIDATES),
            latitude: find(LAT_CANDIDATES),
            longitude: find(LON_CANDIDATES),
            timestamp: find(TIME_CANDIDATES),
            metrics,
        }
    }

    fn metric_index(&self, metric: Metric) -> Option<usize> {
        ALL_METRICS
            .iter()
            .position(|m| *m == metric)
            .and_then(|i| self.metrics[i])
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The loaded observation datasets. Read-only after construction; concurrent
/// readers need no synchronization.
#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    current: Vec<ObservationRow>,
    historical: Vec<ObservationRow>,
}

impl ObservationStore {
    /// Load both datasets from disk. A missing file is logged and treated as
    /// an empty table; resolution fails later only if *both* end up empty.
    pub fn load(current_path: &str, historical_path: &str) -> ObservationStore {
        ObservationStore {
            current: load_table(current_path, "current"),
            historical: load_table(historical_path, "historical"),
        }
    }

    /// Build a store from preconstructed rows. Used by tests and by
    /// embedders that source observations elsewhere.
    pub fn from_rows(current: Vec<ObservationRow>, historical: Vec<ObservationRow>) -> ObservationStore {
        ObservationStore { current, historical }
    }

    pub fn current(&self) -> &[ObservationRow] {
        &self.current
    }

    pub fn historical(&self) -> &[ObservationRow] {
        &self.historical
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.historical.is_empty()
    }
}

fn load_table(path: &str, label: &str) -> Vec<ObservationRow> {
    if !Path::new(path).exists() {
        logging::warn(
            Source::Store,
            Some(label),
            &format!("dataset file {} not found, loading empty table", path),
        );
        return Vec::new();
    }
    match std::fs::File::open(path) {
        Ok(file) => match parse_table(file) {
            Ok(rows) => {
                logging::info(
                    Source::Store,
                    Some(label),
                    &format!("loaded {} rows from {}", rows.len(), path),
                );
                rows
            }
            Err(e) => {
                logging::error(
                    Source::Store,
                    Some(label),
                    &format!("failed to parse {}: {}", path, e),
                );
                Vec::new()
            }
        },
        Err(e) => {
            logging::error(
                Source::Store,
                Some(label),
                &format!("failed to open {}: {}", path, e),
            );
            Vec::new()
        }
    }
}

/// Parse one CSV dataset from any reader. Short or malformed rows are
/// skipped rather than failing the whole load.
pub fn parse_table<R: Read>(reader: R) -> Result<Vec<ObservationRow>, csv::Error> {
    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let header_refs: Vec<&str> = headers.iter().map(|h| h.as_str()).collect();
    let columns = ColumnMap::resolve(&header_refs);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) => continue,
        };
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i));

        let mut row = ObservationRow {
            city: cell(columns.city).and_then(normalize_text_cell),
            latitude: cell(columns.latitude).and_then(normalize_cell),
            longitude: cell(columns.longitude).and_then(normalize_cell),
            timestamp: cell(columns.timestamp).and_then(parse_timestamp_cell),
            ..ObservationRow::default()
        };
        for metric in ALL_METRICS {
            row.set_metric(metric, cell(columns.metric_index(metric)).and_then(normalize_cell));
        }
        rows.push(row);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cell_sentinel_spellings() {
        assert_eq!(normalize_cell(""), None);
        assert_eq!(normalize_cell("   "), None);
        assert_eq!(normalize_cell("nan"), None);
        assert_eq!(normalize_cell("NaN"), None);
        assert_eq!(normalize_cell("None"), None);
        assert_eq!(normalize_cell("null"), None);
        assert_eq!(normalize_cell("not a number"), None);
        assert_eq!(normalize_cell("21.5"), Some(21.5));
        assert_eq!(normalize_cell(" -3.0 "), Some(-3.0));
        // zero is a value, not a missing marker
        assert_eq!(normalize_cell("0"), Some(0.0));
    }

    #[test]
    fn test_column_resolution_first_candidate_wins() {
        // both "temperature" and "temp" present: the earlier synonym wins
        let headers = ["temp", "temperature", "humidity"];
        let columns = ColumnMap::resolve(&headers);
        assert_eq!(columns.metric_index(Metric::Temperature), Some(1));
        assert_eq!(columns.metric_index(Metric::Humidity), Some(2));
        assert_eq!(columns.metric_index(Metric::Rainfall), None);
    }

    #[test]
    fn test_column_resolution_tolerates_archive_spellings() {
        let headers = ["City", "Latitude", "Longitude", "Formatted Date",
                       "Temperature (C)", "Humidity", "Wind Speed (km/h)", "precipitation"];
        let columns = ColumnMap::resolve(&headers);
        assert_eq!(columns.city, Some(0));
        assert_eq!(columns.latitude, Some(1));
        assert_eq!(columns.longitude, Some(2));
        assert_eq!(columns.timestamp, Some(3));
        assert_eq!(columns.metric_index(Metric::Temperature), Some(4));
        assert_eq!(columns.metric_index(Metric::WindSpeed), Some(6));
        assert_eq!(columns.metric_index(Metric::Rainfall), Some(7));
    }

    #[test]
    fn test_parse_table_with_sentinel_nulls() {
        let csv = "city,latitude,longitude,timestamp,temperature,humidity,wind_speed,rainfall\n\
                   Mumbai,19.076,72.8777,2024-06-01T09:45:00Z,30.0,80.0,5.0,\n\
                   Chennai,13.0827,80.2707,2024-06-01T09:00:00Z,nan,70.0,None,1.2\n";
        let rows = parse_table(csv.as_bytes()).expect("valid CSV should parse");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].city.as_deref(), Some("Mumbai"));
        assert_eq!(rows[0].temperature, Some(30.0));
        assert_eq!(rows[0].rainfall, None, "empty cell is absent, not zero");

        assert_eq!(rows[1].temperature, None, "textual nan is absent");
        assert_eq!(rows[1].wind_speed, None, "textual None is absent");
        assert_eq!(rows[1].rainfall, Some(1.2));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp_cell("2024-06-01T10:00:00Z").is_some());
        assert!(parse_timestamp_cell("2024-06-01T10:00:00+05:30").is_some());
        assert!(parse_timestamp_cell("2024-06-01 10:00:00").is_some());
        assert!(parse_timestamp_cell("2024-06-01").is_some());
        assert_eq!(parse_timestamp_cell("yesterday"), None);
        assert_eq!(parse_timestamp_cell(""), None);
    }

    #[test]
    fn test_bare_date_is_midnight_utc() {
        let parsed = parse_timestamp_cell("2024-06-01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_empty_store_reports_empty() {
        let store = ObservationStore::from_rows(Vec::new(), Vec::new());
        assert!(store.is_empty());

        let store = ObservationStore::from_rows(Vec::new(), vec![ObservationRow::default()]);
        assert!(!store.is_empty(), "one historical row is enough to serve requests");
    }
}
