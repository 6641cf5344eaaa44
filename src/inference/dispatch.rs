/// Inference dispatch: one feature record, many independent models.
///
/// Each model consumes its own named subset of the feature record (the
/// subsets the models were trained on):
///
///   rain classifier:        temperature, humidity, wind speed
///   temperature regressor:  humidity, wind speed
///   humidity regressor:     humidity, wind speed
///   water level regressor:  wind speed, humidity, rainfall
///
/// Models require fixed-width numeric input, so an absent feature becomes
/// 0.0, an explicit lossy default; there is no way to "omit a
/// slot" from a fitted coefficient vector. The list is then right-padded
/// with zeros or right-truncated to the model's declared width.
///
/// Failures are isolated per model: a failed invocation appends one entry
/// to the error list and never suppresses the other models' outcomes.
/// Dispatch order is irrelevant; models share no mutable state.

use crate::model::{FeatureRecord, Metric, ModelOutcome};

use super::artifact::{PointModel, Prediction};
use super::{MODEL_HUMIDITY, MODEL_RAIN, MODEL_TEMPERATURE, MODEL_WATER_LEVEL, ModelRegistry};

// ---------------------------------------------------------------------------
// Batch output
// ---------------------------------------------------------------------------

/// Everything the model batch produced for one request.
#[derive(Debug, Default, PartialEq)]
pub struct InferenceOutputs {
    pub rain: Option<ModelOutcome>,
    pub temperature: Option<ModelOutcome>,
    pub humidity: Option<ModelOutcome>,
    pub water_level: Option<ModelOutcome>,
    /// One `"{model_id}: {reason}"` entry per failed invocation.
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(registry: &ModelRegistry, record: &FeatureRecord) -> InferenceOutputs {
    let mut outputs = InferenceOutputs::default();

    let t = record.current(Metric::Temperature);
    let h = record.current(Metric::Humidity);
    let w = record.current(Metric::WindSpeed);
    let r = record.current(Metric::Rainfall);

    outputs.rain = dispatch_one(
        registry.rain_classifier.as_deref(),
        MODEL_RAIN,
        &[t, h, w],
        &mut outputs.errors,
    );
    outputs.temperature = dispatch_one(
        registry.temperature_regressor.as_deref(),
        MODEL_TEMPERATURE,
        &[h, w],
        &mut outputs.errors,
    );
    outputs.humidity = dispatch_one(
        registry.humidity_regressor.as_deref(),
        MODEL_HUMIDITY,
        &[h, w],
        &mut outputs.errors,
    );
    outputs.water_level = dispatch_one(
        registry.water_level_regressor.as_deref(),
        MODEL_WATER_LEVEL,
        &[w, h, r],
        &mut outputs.errors,
    );

    outputs
}

/// Invoke one model slot. An empty slot produces no outcome and no error; a
/// failed invocation produces no outcome and exactly one error entry.
fn dispatch_one(
    model: Option<&(dyn PointModel + Send + Sync)>,
    model_id: &'static str,
    features: &[Option<f64>],
    errors: &mut Vec<String>,
) -> Option<ModelOutcome> {
    let model = model?;
    match invoke(model, features) {
        Ok(prediction) => Some(ModelOutcome {
            model_id,
            value: prediction.value,
            probability: confidence_of(&prediction),
        }),
        Err(reason) => {
            errors.push(format!("{}: {}", model_id, reason));
            None
        }
    }
}

fn invoke(model: &(dyn PointModel + Send + Sync), features: &[Option<f64>]) -> Result<Prediction, String> {
    let expected = model.expected_features();
    if expected == 0 {
        return Err("model declares zero input features".to_string());
    }
    let inputs = adapt_width(&coerce(features), expected);
    model.predict(&inputs)
}

// ---------------------------------------------------------------------------
// Input preparation
// ---------------------------------------------------------------------------

/// Coerce optional features to concrete numbers: absent or non-finite
/// values become 0.0.
fn coerce(features: &[Option<f64>]) -> Vec<f64> {
    features
        .iter()
        .map(|v| v.filter(|x| x.is_finite()).unwrap_or(0.0))
        .collect()
}

/// Right-pad with zeros or right-truncate to the declared width.
fn adapt_width(values: &[f64], expected: usize) -> Vec<f64> {
    let mut adapted = values.to_vec();
    adapted.resize(expected, 0.0);
    adapted
}

/// Confidence from a prediction: probability mass on the positive class
/// when it is enumerable, otherwise the maximum class probability as a
/// best-effort stand-in. Regressors have neither and yield `None`.
fn confidence_of(prediction: &Prediction) -> Option<f64> {
    let probs = prediction.probabilities.as_ref()?;
    match prediction.positive_index {
        Some(i) => probs.get(i).copied(),
        None => probs.iter().copied().reduce(f64::max),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
