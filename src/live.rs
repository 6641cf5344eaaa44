/// Live weather provider client with a TTL cache.
///
/// Fetches present-moment conditions for a coordinate, used only to fill
/// metrics the observation store could not supply. Two providers:
///
/// - OpenWeather (primary): requires `OPENWEATHER_API_KEY`; reports wind in
///   m/s and rain in mm directly.
/// - Open-Meteo (secondary): credential-free; wind arrives in km/h and is
///   converted at the boundary.
///
/// Every failure path (network error, non-2xx status, malformed payload,
/// timeout) returns `None`. Callers treat `None` as "enrichment
/// unavailable" and never propagate it as a request failure.
///
/// # Cache
/// Keyed by coordinate rounded to 3 decimal places (~100 m), which is coarse
/// on purpose: nearby requests share entries. Entries live 300 seconds and
/// expire lazily; an expired entry is overwritten on the next fetch, never
/// evicted proactively. The map is mutex-guarded; a race costs at worst one
/// redundant provider call.
///
/// # Clock injection
/// Cache freshness is evaluated against a caller-supplied `now`, so TTL
/// behavior is deterministic in tests. `fetch` is the wall-clock wrapper.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::LiveConfig;
use crate::logging;
use crate::model::LiveConditions;

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct CacheEntry {
    fetched_at: DateTime<Utc>,
    conditions: LiveConditions,
}

pub struct LiveWeatherClient {
    http: reqwest::blocking::Client,
    api_key: Option<String>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl LiveWeatherClient {
    pub fn new(config: &LiveConfig, api_key: Option<String>) -> LiveWeatherClient {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .unwrap_or_default();
        LiveWeatherClient {
            http,
            api_key,
            ttl: Duration::seconds(config.cache_ttl_secs as i64),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch current conditions, consulting the cache first.
    pub fn fetch(&self, lat: f64, lon: f64) -> Option<LiveConditions> {
        self.fetch_at(lat, lon, Utc::now())
    }

    /// Fetch with an explicit clock, for deterministic cache tests.
    pub fn fetch_at(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> Option<LiveConditions> {
        if let Some(cached) = self.cached(lat, lon, now) {
            return Some(cached);
        }
        let conditions = self.fetch_from_provider(lat, lon)?;
        self.store(lat, lon, conditions.clone(), now);
        Some(conditions)
    }

    fn cached(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> Option<LiveConditions> {
        let cache = self.cache.lock().unwrap();
        let entry = cache.get(&cache_key(lat, lon))?;
        if now - entry.fetched_at < self.ttl {
            Some(entry.conditions.clone())
        } else {
            None
        }
    }

    fn store(&self, lat: f64, lon: f64, conditions: LiveConditions, now: DateTime<Utc>) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            cache_key(lat, lon),
            CacheEntry {
                fetched_at: now,
                conditions,
            },
        );
    }

    fn fetch_from_provider(&self, lat: f64, lon: f64) -> Option<LiveConditions> {
        match &self.api_key {
            Some(key) => self.fetch_openweather(lat, lon, key),
            None => self.fetch_open_meteo(lat, lon),
        }
    }

    fn fetch_openweather(&self, lat: f64, lon: f64, api_key: &str) -> Option<LiveConditions> {
        let result = self
            .http
            .get(OPENWEATHER_URL)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", api_key.to_string()),
                ("units", "metric".to_string()),
            ])
            .send();
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                logging::log_live_fetch_failure("openweather", &e.to_string());
                return None;
            }
        };
        if !response.status().is_success() {
            logging::log_live_fetch_failure(
                "openweather",
                &format!("status {}", response.status()),
            );
            return None;
        }
        match response.json::<Value>() {
            Ok(payload) => Some(parse_openweather(&payload)),
            Err(e) => {
                logging::log_live_fetch_failure("openweather", &e.to_string());
                None
            }
        }
    }

    fn fetch_open_meteo(&self, lat: f64, lon: f64) -> Option<LiveConditions> {
        let result = self
            .http
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
                ("hourly", "relativehumidity_2m,precipitation".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send();
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                logging::log_live_fetch_failure("open-meteo", &e.to_string());
                return None;
            }
        };
        if !response.status().is_success() {
            logging::log_live_fetch_failure(
                "open-meteo",
                &format!("status {}", response.status()),
            );
            return None;
        }
        match response.json::<Value>() {
            Ok(payload) => Some(parse_open_meteo(&payload)),
            Err(e) => {
                logging::log_live_fetch_failure("open-meteo", &e.to_string());
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cache key
// ---------------------------------------------------------------------------

/// Coordinate rounded to 3 decimal places, ~100 m granularity.
fn cache_key(lat: f64, lon: f64) -> String {
    format!("{:.3}:{:.3}", lat, lon)
}

// ---------------------------------------------------------------------------
// Payload mapping
// ---------------------------------------------------------------------------

/// Map an OpenWeather current-weather payload (metric units) onto
/// `LiveConditions`. Wind is already m/s; rain sits under "rain"."1h" or
/// "rain"."3h" and defaults to 0.0 when OpenWeather reports no rain block.
pub fn parse_openweather(payload: &Value) -> LiveConditions {
    let main = &payload["main"];
    let rain = &payload["rain"];
    LiveConditions {
        temperature: main["temp"].as_f64(),
        humidity: main["humidity"].as_f64(),
        wind_speed: payload["wind"]["speed"].as_f64(),
        rainfall: rain["1h"]
            .as_f64()
            .or_else(|| rain["3h"].as_f64())
            .or(Some(0.0)),
    }
}

/// Map an Open-Meteo forecast payload onto `LiveConditions`. Temperature and
/// wind come from `current_weather` (wind in km/h, converted to m/s);
/// humidity and precipitation come from the last entry of the hourly series.
pub fn parse_open_meteo(payload: &Value) -> LiveConditions {
    let current = &payload["current_weather"];
    let hourly = &payload["hourly"];

    let last_index = hourly["time"]
        .as_array()
        .filter(|times| !times.is_empty())
        .map(|times| times.len() - 1);

    let hourly_value = |field: &str| -> Option<f64> {
        let idx = last_index?;
        hourly[field].as_array()?.get(idx)?.as_f64()
    };

    LiveConditions {
        temperature: current["temperature"].as_f64(),
        humidity: hourly_value("relativehumidity_2m"),
        wind_speed: current["windspeed"].as_f64().map(|kmh| kmh / 3.6),
        rainfall: hourly_value("precipitation"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
