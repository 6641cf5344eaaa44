/// Service configuration.
///
/// Loaded once at startup from a TOML file (default `coastmon.toml`), with a
/// small set of environment overrides loaded via dotenv:
///   - `USE_LIVE_WEATHER`:  "1"/"true"/"yes" enables live enrichment
///   - `OPENWEATHER_API_KEY`: credential for the primary live provider
///
/// Every field has a default so the service (and tests) can start without a
/// config file at all.

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Configuration sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Most-recent-reading-per-location dataset.
    pub current_path: String,
    /// Dated multi-year dataset used for rolling statistics.
    pub historical_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            current_path: "weather_data_with_rainfall.csv".to_string(),
            historical_path: "final_training_dataset.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub rain_classifier_path: String,
    pub temperature_regressor_path: String,
    pub humidity_regressor_path: String,
    pub water_level_regressor_path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            rain_classifier_path: "rain_classifier.json".to_string(),
            temperature_regressor_path: "temperature_regressor.json".to_string(),
            humidity_regressor_path: "humidity_regressor.json".to_string(),
            water_level_regressor_path: "water_level_regressor.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Master toggle for live enrichment. Overridden by USE_LIVE_WEATHER.
    pub enabled: bool,
    /// Cache entry time-to-live, seconds. Expired entries are refetched
    /// lazily, never evicted proactively.
    pub cache_ttl_secs: u64,
    /// Upper bound on any provider call.
    pub fetch_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            enabled: false,
            cache_ttl_secs: 300,
            fetch_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rolling-statistics window, days.
    pub history_days: i64,
    /// A stored observation older than this relative to the request
    /// timestamp triggers live enrichment (when enabled).
    pub stale_after_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            history_days: 7,
            stale_after_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// "debug" | "info" | "warn" | "error"
    pub level: String,
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            file: None,
            console_timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub models: ModelConfig,
    pub live: LiveConfig,
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides. A missing file yields the defaults; a present but
    /// malformed file is an error.
    pub fn load(path: &str) -> Result<Config, String> {
        let mut config = if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config {}: {}", path, e))?;
            toml::from_str(&raw)
                .map_err(|e| format!("Failed to parse config {}: {}", path, e))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("USE_LIVE_WEATHER") {
            self.live.enabled = parse_bool_flag(&raw);
        }
    }

    /// Credential for the primary live provider, if configured.
    /// Read at call time so dotenv loading order does not matter.
    pub fn openweather_api_key(&self) -> Option<String> {
        std::env::var("OPENWEATHER_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// Accepts the same truthy spellings the original deployment scripts used.
fn parse_bool_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_contract() {
        let config = Config::default();
        assert_eq!(config.pipeline.history_days, 7);
        assert_eq!(config.pipeline.stale_after_minutes, 30);
        assert_eq!(config.live.cache_ttl_secs, 300);
        assert_eq!(config.live.fetch_timeout_secs, 10);
        assert!(!config.live.enabled);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            [live]
            enabled = true

            [pipeline]
            history_days = 14
        "#;
        let config: Config = toml::from_str(raw).expect("partial config should parse");
        assert!(config.live.enabled);
        assert_eq!(config.pipeline.history_days, 14);
        // untouched sections keep their defaults
        assert_eq!(config.live.cache_ttl_secs, 300);
        assert_eq!(config.pipeline.stale_after_minutes, 30);
    }

    #[test]
    fn test_bool_flag_spellings() {
        for truthy in ["1", "true", "TRUE", "yes", " Yes "] {
            assert!(parse_bool_flag(truthy), "{:?} should be truthy", truthy);
        }
        for falsy in ["0", "false", "no", "", "on"] {
            assert!(!parse_bool_flag(falsy), "{:?} should be falsy", falsy);
        }
    }
}
