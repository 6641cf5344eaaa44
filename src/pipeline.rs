/// End-to-end prediction pipeline.
///
/// Wires the pieces together for one request:
///
///   request → feature build (resolve + enrich + rolling stats)
///           → inference dispatch (fault-isolated, per-model)
///           → alert synthesis (per-metric rules + composite)
///           → output sanitation (finite-or-null)
///
/// Error policy: only `InvalidTimestamp` and `LocationUnresolved` fail a
/// request; both are client-side input conditions. Every other failure
/// degrades: live-fetch problems fall back to stored data, model failures
/// land in `prediction_errors`, and alert-composition failures lose at most
/// their own alert. Alerting consumers need *something* even under partial
/// outages, so the pipeline always prefers a best-effort partial answer
/// over failing closed.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::alert;
use crate::config::Config;
use crate::features;
use crate::inference::dispatch::{self, InferenceOutputs};
use crate::inference::{MODEL_HUMIDITY, MODEL_RAIN, MODEL_TEMPERATURE, MODEL_WATER_LEVEL, ModelRegistry};
use crate::live::LiveWeatherClient;
use crate::logging::{self, Source};
use crate::model::{Alert, FeatureRecord, PipelineError};
use crate::sanitize;
use crate::store::ObservationStore;

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// One prediction request: a location (city name, coordinate, or both) and
/// an optional ISO-8601 timestamp defaulting to "now".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionRequest {
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: Option<String>,
}

/// The full pipeline output for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub rain_predicted: Option<bool>,
    pub rain_probability: Option<f64>,
    pub temperature_predicted: Option<f64>,
    pub humidity_predicted: Option<f64>,
    pub water_level_predicted: Option<f64>,
    /// Plain-text alert lines, kept alongside the structured list for
    /// clients that predate it.
    pub alerts: Vec<String>,
    pub structured_alerts: Vec<Alert>,
    /// Per-model and per-alert failure strings. Diagnostics, not errors.
    pub prediction_errors: Vec<String>,
    pub features_used: FeatureRecord,
    pub model_meta: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
    /// "live" when any feature came from a live fetch, else "stored".
    pub source: &'static str,
}

impl PredictionResponse {
    /// Serialize with the final sanitation pass applied.
    pub fn to_sanitized_json(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(value) => sanitize::sanitize_value(value),
            Err(e) => {
                // Serialize of plain data types cannot realistically fail;
                // surface it as diagnostics if it ever does.
                logging::error(Source::Pipeline, None, &format!("serialize failed: {}", e));
                Value::Null
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    store: ObservationStore,
    registry: ModelRegistry,
    live: Option<LiveWeatherClient>,
    config: Config,
}

impl Pipeline {
    /// Build the full pipeline from configuration: load both datasets, load
    /// whatever model artifacts exist, and construct the live client when
    /// enrichment is enabled.
    pub fn from_config(config: Config) -> Pipeline {
        let store = ObservationStore::load(&config.data.current_path, &config.data.historical_path);
        let registry = ModelRegistry::load(&config.models);
        let live = config
            .live
            .enabled
            .then(|| LiveWeatherClient::new(&config.live, config.openweather_api_key()));
        Pipeline::from_parts(store, registry, live, config)
    }

    /// Assemble a pipeline from preconstructed parts. Used by tests and by
    /// embedders that manage loading themselves.
    pub fn from_parts(
        store: ObservationStore,
        registry: ModelRegistry,
        live: Option<LiveWeatherClient>,
        config: Config,
    ) -> Pipeline {
        Pipeline {
            store,
            registry,
            live,
            config,
        }
    }

    /// Per-model availability plus overall status.
    pub fn health(&self) -> Value {
        serde_json::json!({
            "status": "ok",
            "models": self.registry.health(),
        })
    }

    /// Run the full prediction pipeline for one request.
    pub fn predict_alerts(&self, request: &PredictionRequest) -> Result<PredictionResponse, PipelineError> {
        self.predict_alerts_at(request, Utc::now())
    }

    /// As `predict_alerts`, with an explicit clock for deterministic tests.
    pub fn predict_alerts_at(
        &self,
        request: &PredictionRequest,
        now: DateTime<Utc>,
    ) -> Result<PredictionResponse, PipelineError> {
        let record = features::build_at(
            &self.store,
            self.live.as_ref(),
            &self.config.pipeline,
            request.city.as_deref(),
            request.latitude,
            request.longitude,
            request.timestamp.as_deref(),
            now,
        )?;

        let outputs = dispatch::run(&self.registry, &record);
        let (structured_alerts, alert_failures) = alert::synthesize(&outputs);

        let mut prediction_errors = outputs.errors.clone();
        prediction_errors.extend(alert_failures);
        if !prediction_errors.is_empty() {
            logging::warn(
                Source::Pipeline,
                record.city.as_deref(),
                &format!("request degraded: {}", prediction_errors.join("; ")),
            );
        }

        let mut response = PredictionResponse {
            rain_predicted: outputs.rain.as_ref().map(|o| o.value != 0.0),
            rain_probability: outputs.rain.as_ref().and_then(|o| o.probability),
            temperature_predicted: outputs.temperature.as_ref().map(|o| o.value),
            humidity_predicted: outputs.humidity.as_ref().map(|o| o.value),
            water_level_predicted: outputs.water_level.as_ref().map(|o| o.value),
            alerts: structured_alerts.iter().map(|a| a.text.clone()).collect(),
            structured_alerts,
            prediction_errors,
            source: if record.live_source { "live" } else { "stored" },
            features_used: record,
            model_meta: self.model_meta(&outputs),
            generated_at: now,
        };
        sanitize_response(&mut response);
        Ok(response)
    }

    fn model_meta(&self, outputs: &InferenceOutputs) -> BTreeMap<String, String> {
        let slot = |present: bool, produced: bool| -> String {
            match (present, produced) {
                (false, _) => "absent".to_string(),
                (true, true) => "ok".to_string(),
                (true, false) => "failed".to_string(),
            }
        };
        let health = self.registry.health();
        BTreeMap::from([
            (MODEL_RAIN.to_string(), slot(health["rain"], outputs.rain.is_some())),
            (
                MODEL_TEMPERATURE.to_string(),
                slot(health["temp"], outputs.temperature.is_some()),
            ),
            (
                MODEL_HUMIDITY.to_string(),
                slot(health["humidity"], outputs.humidity.is_some()),
            ),
            (
                MODEL_WATER_LEVEL.to_string(),
                slot(health["water_level"], outputs.water_level.is_some()),
            ),
        ])
    }
}

/// Typed finite-or-null pass over every numeric field of the response.
/// The JSON walker in `sanitize` runs again at serialization time; this
/// keeps the typed struct itself clean for in-process consumers.
fn sanitize_response(response: &mut PredictionResponse) {
    response.rain_probability = sanitize::finite(response.rain_probability);
    response.temperature_predicted = sanitize::finite(response.temperature_predicted);
    response.humidity_predicted = sanitize::finite(response.humidity_predicted);
    response.water_level_predicted = sanitize::finite(response.water_level_predicted);
    for alert in &mut response.structured_alerts {
        alert.value = sanitize::finite(alert.value);
        alert.confidence = sanitize::finite(alert.confidence);
    }
    let features = &mut response.features_used;
    features.temperature_current = sanitize::finite(features.temperature_current);
    features.humidity_current = sanitize::finite(features.humidity_current);
    features.wind_speed_current = sanitize::finite(features.wind_speed_current);
    features.rainfall_current = sanitize::finite(features.rainfall_current);
    features.latitude = sanitize::finite(features.latitude);
    features.longitude = sanitize::finite(features.longitude);
}

// ---------------------------------------------------------------------------
// Hourly forecast
// ---------------------------------------------------------------------------

/// Forecast horizon bounds, hours.
const FORECAST_MIN_HOURS: u32 = 1;
const FORECAST_MAX_HOURS: u32 = 72;

#[derive(Debug, Clone, Serialize)]
pub struct ForecastHour {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rain_probability: Option<f64>,
    pub water_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub generated_at: DateTime<Utc>,
    pub hours: u32,
    pub forecast: Vec<ForecastHour>,
}

impl Pipeline {
    /// Simple hourly forecast: the models produce a base prediction for the
    /// coordinate, and hourly values apply a small diurnal variation on top.
    /// The horizon is clamped to 1..=72 hours.
    pub fn forecast(&self, lat: f64, lon: f64, hours: u32) -> Result<ForecastResponse, PipelineError> {
        self.forecast_at(lat, lon, hours, Utc::now())
    }

    pub fn forecast_at(
        &self,
        lat: f64,
        lon: f64,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<ForecastResponse, PipelineError> {
        let hours = hours.clamp(FORECAST_MIN_HOURS, FORECAST_MAX_HOURS);

        let record = features::build_at(
            &self.store,
            self.live.as_ref(),
            &self.config.pipeline,
            None,
            Some(lat),
            Some(lon),
            None,
            now,
        )?;
        let outputs = dispatch::run(&self.registry, &record);

        // Base values: model output first, then the current observation,
        // then a climatological default.
        let base_temp = outputs
            .temperature
            .as_ref()
            .map(|o| o.value)
            .or(record.temperature_current)
            .unwrap_or(295.0);
        let base_hum = outputs
            .humidity
            .as_ref()
            .map(|o| o.value)
            .or(record.humidity_current)
            .unwrap_or(60.0);
        let base_rain = outputs
            .rain
            .as_ref()
            .and_then(|o| o.probability)
            .or_else(|| record.rainfall_current.map(|r| r.clamp(0.0, 1.0)))
            .unwrap_or(0.0);
        let base_water = outputs.water_level.as_ref().map(|o| o.value).unwrap_or(0.5);

        let forecast = (1..=hours)
            .map(|offset| {
                let at = now + chrono::Duration::hours(offset as i64);
                let hour = at.hour() as f64;
                let temperature = base_temp + 3.0 * (2.0 * PI * hour / 24.0).sin();
                let humidity = (base_hum + 5.0 * (2.0 * PI * (hour + 6.0) / 24.0).sin())
                    .clamp(0.0, 100.0);
                let rain_probability =
                    (base_rain + 0.1 * (2.0 * PI * hour / 24.0).sin()).clamp(0.0, 1.0);
                ForecastHour {
                    timestamp: at,
                    temperature: sanitize::finite(Some(round2(temperature))),
                    humidity: sanitize::finite(Some(round2(humidity))),
                    rain_probability: sanitize::finite(Some(round3(rain_probability))),
                    water_level: sanitize::finite(Some(base_water)),
                }
            })
            .collect();

        Ok(ForecastResponse {
            latitude: lat,
            longitude: lon,
            generated_at: now,
            hours,
            forecast,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::artifact::ModelArtifact;
    use crate::model::ObservationRow;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn mumbai_row() -> ObservationRow {
        ObservationRow {
            city: Some("Mumbai".to_string()),
            latitude: Some(19.076),
            longitude: Some(72.8777),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 45, 0).unwrap()),
            temperature: Some(30.0),
            humidity: Some(80.0),
            wind_speed: Some(5.0),
            rainfall: None,
        }
    }

    fn pipeline_with(registry: ModelRegistry) -> Pipeline {
        let store = ObservationStore::from_rows(vec![mumbai_row()], Vec::new());
        Pipeline::from_parts(store, registry, None, Config::default())
    }

    fn request_for_mumbai() -> PredictionRequest {
        PredictionRequest {
            city: Some("Mumbai".to_string()),
            timestamp: Some("2024-06-01T10:00:00Z".to_string()),
            ..PredictionRequest::default()
        }
    }

    /// A classifier whose intercept alone fixes the rain probability.
    fn rain_classifier_with_probability(p: f64) -> ModelArtifact {
        let intercept = (p / (1.0 - p)).ln();
        ModelArtifact::LogisticClassifier {
            n_features: 3,
            weights: vec![0.0, 0.0, 0.0],
            intercept,
            classes: vec![0, 1],
            positive_class: Some(1),
        }
    }

    #[test]
    fn test_end_to_end_rain_scenario() {
        let registry = ModelRegistry {
            rain_classifier: Some(Box::new(rain_classifier_with_probability(0.8))),
            ..ModelRegistry::default()
        };
        let pipeline = pipeline_with(registry);

        let response = pipeline
            .predict_alerts_at(&request_for_mumbai(), fixed_now())
            .expect("request should succeed");

        assert_eq!(response.features_used.temperature_current, Some(30.0));
        assert_eq!(response.rain_predicted, Some(true));
        let p = response.rain_probability.expect("classifier probability");
        assert!((p - 0.8).abs() < 1e-9, "expected 0.8, got {}", p);

        let rain_alert = response
            .structured_alerts
            .iter()
            .find(|a| a.id == "rain_24h")
            .expect("rain alert should fire");
        assert_eq!(rain_alert.severity, crate::model::Severity::Critical);
        assert!((rain_alert.confidence.unwrap() - 0.8).abs() < 1e-9);

        assert!(response.prediction_errors.is_empty());
        assert_eq!(response.source, "stored");
        assert_eq!(response.generated_at, fixed_now());
        assert_eq!(response.alerts.len(), response.structured_alerts.len());
    }

    #[test]
    fn test_empty_registry_yields_featureful_response_without_predictions() {
        let pipeline = pipeline_with(ModelRegistry::default());
        let response = pipeline
            .predict_alerts_at(&request_for_mumbai(), fixed_now())
            .unwrap();
        assert_eq!(response.rain_predicted, None);
        assert_eq!(response.temperature_predicted, None);
        assert!(response.structured_alerts.is_empty());
        assert!(response.prediction_errors.is_empty());
        assert_eq!(response.features_used.humidity_current, Some(80.0));
        assert_eq!(response.model_meta["rain_classifier"], "absent");
    }

    #[test]
    fn test_empty_store_is_client_error() {
        let pipeline = Pipeline::from_parts(
            ObservationStore::from_rows(Vec::new(), Vec::new()),
            ModelRegistry::default(),
            None,
            Config::default(),
        );
        let result = pipeline.predict_alerts_at(&request_for_mumbai(), fixed_now());
        assert_eq!(result, Err(PipelineError::LocationUnresolved));
    }

    #[test]
    fn test_bad_timestamp_is_client_error() {
        let pipeline = pipeline_with(ModelRegistry::default());
        let request = PredictionRequest {
            city: Some("Mumbai".to_string()),
            timestamp: Some("06/01/2024".to_string()),
            ..PredictionRequest::default()
        };
        let result = pipeline.predict_alerts_at(&request, fixed_now());
        assert!(matches!(result, Err(PipelineError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_nan_prediction_is_nulled_in_response() {
        // a regressor with a NaN intercept produces a NaN prediction
        let registry = ModelRegistry {
            water_level_regressor: Some(Box::new(ModelArtifact::LinearRegressor {
                n_features: 3,
                weights: vec![0.0, 0.0, 0.0],
                intercept: f64::NAN,
            })),
            ..ModelRegistry::default()
        };
        let pipeline = pipeline_with(registry);
        let response = pipeline
            .predict_alerts_at(&request_for_mumbai(), fixed_now())
            .unwrap();
        assert_eq!(
            response.water_level_predicted, None,
            "non-finite prediction must be nulled, not surfaced"
        );
        let json = response.to_sanitized_json();
        assert_eq!(json["water_level_predicted"], serde_json::Value::Null);
    }

    #[test]
    fn test_health_reports_model_slots() {
        let registry = ModelRegistry {
            rain_classifier: Some(Box::new(rain_classifier_with_probability(0.5))),
            ..ModelRegistry::default()
        };
        let health = pipeline_with(registry).health();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["models"]["rain"], true);
        assert_eq!(health["models"]["water_level"], false);
    }

    // --- Forecast -----------------------------------------------------------

    #[test]
    fn test_forecast_produces_requested_hours() {
        let pipeline = pipeline_with(ModelRegistry::default());
        let response = pipeline
            .forecast_at(19.076, 72.8777, 6, fixed_now())
            .expect("forecast should succeed");
        assert_eq!(response.hours, 6);
        assert_eq!(response.forecast.len(), 6);
        assert_eq!(
            response.forecast[0].timestamp,
            fixed_now() + chrono::Duration::hours(1)
        );
    }

    #[test]
    fn test_forecast_horizon_is_clamped() {
        let pipeline = pipeline_with(ModelRegistry::default());
        assert_eq!(pipeline.forecast_at(19.0, 72.8, 0, fixed_now()).unwrap().hours, 1);
        assert_eq!(
            pipeline.forecast_at(19.0, 72.8, 500, fixed_now()).unwrap().hours,
            72
        );
    }

    #[test]
    fn test_forecast_values_stay_within_physical_bounds() {
        let pipeline = pipeline_with(ModelRegistry::default());
        let response = pipeline.forecast_at(19.076, 72.8777, 24, fixed_now()).unwrap();
        for hour in &response.forecast {
            let humidity = hour.humidity.unwrap();
            assert!((0.0..=100.0).contains(&humidity), "humidity {}", humidity);
            let rain = hour.rain_probability.unwrap();
            assert!((0.0..=1.0).contains(&rain), "rain probability {}", rain);
        }
    }

    #[test]
    fn test_forecast_uses_current_observation_as_base() {
        // no models loaded: base temperature falls back to the stored 30.0
        let pipeline = pipeline_with(ModelRegistry::default());
        let response = pipeline.forecast_at(19.076, 72.8777, 3, fixed_now()).unwrap();
        for hour in &response.forecast {
            let temp = hour.temperature.unwrap();
            assert!(
                (27.0..=33.0).contains(&temp),
                "hourly temperature {} should vary around the 30.0 base",
                temp
            );
        }
    }
}
