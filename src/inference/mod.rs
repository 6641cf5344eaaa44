/// Inference: model loading and fault-isolated dispatch.
///
/// Submodules:
/// - `artifact`: the JSON model artifact format and the `PointModel`
///   contract a trained model must satisfy.
/// - `dispatch`: fans one feature record out to every available model,
///   isolating per-model failures.

pub mod artifact;
pub mod dispatch;

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::ModelConfig;
use crate::logging;
use artifact::{ModelArtifact, PointModel};

// ---------------------------------------------------------------------------
// Model identifiers
// ---------------------------------------------------------------------------

pub const MODEL_RAIN: &str = "rain_classifier";
pub const MODEL_TEMPERATURE: &str = "temperature_regressor";
pub const MODEL_HUMIDITY: &str = "humidity_regressor";
pub const MODEL_WATER_LEVEL: &str = "water_level_regressor";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub type LoadedModel = Box<dyn PointModel + Send + Sync>;

/// Holds the independently loadable point-estimate models. Every slot is
/// optional: a model that fails to load is logged and skipped, never fatal.
/// The dispatcher simply produces no outcome for an empty slot.
#[derive(Default)]
pub struct ModelRegistry {
    pub rain_classifier: Option<LoadedModel>,
    pub temperature_regressor: Option<LoadedModel>,
    pub humidity_regressor: Option<LoadedModel>,
    pub water_level_regressor: Option<LoadedModel>,
}

impl ModelRegistry {
    /// Load all configured model artifacts. Each load failure leaves that
    /// slot empty and logs a warning.
    pub fn load(config: &ModelConfig) -> ModelRegistry {
        ModelRegistry {
            rain_classifier: load_artifact(&config.rain_classifier_path, MODEL_RAIN),
            temperature_regressor: load_artifact(&config.temperature_regressor_path, MODEL_TEMPERATURE),
            humidity_regressor: load_artifact(&config.humidity_regressor_path, MODEL_HUMIDITY),
            water_level_regressor: load_artifact(&config.water_level_regressor_path, MODEL_WATER_LEVEL),
        }
    }

    /// Per-model availability, for the health summary.
    pub fn health(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("rain", self.rain_classifier.is_some()),
            ("temp", self.temperature_regressor.is_some()),
            ("humidity", self.humidity_regressor.is_some()),
            ("water_level", self.water_level_regressor.is_some()),
        ])
    }
}

fn load_artifact(path: &str, model_id: &'static str) -> Option<LoadedModel> {
    if !Path::new(path).exists() {
        logging::log_model_unavailable(model_id, &format!("artifact {} not found", path));
        return None;
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            logging::log_model_unavailable(model_id, &format!("failed to read {}: {}", path, e));
            return None;
        }
    };
    match serde_json::from_str::<ModelArtifact>(&raw) {
        Ok(artifact) => Some(Box::new(artifact)),
        Err(e) => {
            logging::log_model_unavailable(model_id, &format!("failed to parse {}: {}", path, e));
            None
        }
    }
}
