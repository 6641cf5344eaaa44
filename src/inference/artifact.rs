/// Trained model artifacts.
///
/// Models are trained offline and serialized as small JSON documents: a
/// `kind` tag plus fitted coefficients. The pipeline treats them as opaque
/// callables behind the `PointModel` trait; it only needs the declared
/// input width and a predict call. New artifact kinds slot in by extending
/// the enum; nothing downstream changes.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Model contract
// ---------------------------------------------------------------------------

/// Result of one model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Point estimate: regression value, or predicted class label for
    /// classifiers (0.0 / 1.0).
    pub value: f64,
    /// Class probability vector, classifiers only.
    pub probabilities: Option<Vec<f64>>,
    /// Index of the positive class within `probabilities`, when the
    /// artifact's class list makes it enumerable.
    pub positive_index: Option<usize>,
}

/// The contract a trained model must satisfy to be invoked by the pipeline:
/// a fixed-width numeric vector in, a point estimate (plus class
/// probabilities for classifiers) out.
pub trait PointModel {
    /// Declared input width. The dispatcher adapts every feature list to
    /// exactly this many values before calling `predict`.
    fn expected_features(&self) -> usize;

    fn predict(&self, inputs: &[f64]) -> Result<Prediction, String>;
}

// ---------------------------------------------------------------------------
// Artifact format
// ---------------------------------------------------------------------------

/// A deserialized model artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Plain linear regression: `value = weights · inputs + intercept`.
    LinearRegressor {
        n_features: usize,
        weights: Vec<f64>,
        intercept: f64,
    },
    /// Binary logistic classifier. `classes` lists the label for each
    /// position of the probability vector; `positive_class` names the
    /// "event happens" label (defaults to 1).
    LogisticClassifier {
        n_features: usize,
        weights: Vec<f64>,
        intercept: f64,
        #[serde(default = "default_classes")]
        classes: Vec<i64>,
        #[serde(default)]
        positive_class: Option<i64>,
    },
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

impl ModelArtifact {
    fn dot(weights: &[f64], inputs: &[f64], intercept: f64) -> Result<f64, String> {
        if weights.len() != inputs.len() {
            return Err(format!(
                "weight vector has {} entries but {} inputs were supplied",
                weights.len(),
                inputs.len()
            ));
        }
        Ok(weights.iter().zip(inputs).map(|(w, x)| w * x).sum::<f64>() + intercept)
    }
}

impl PointModel for ModelArtifact {
    fn expected_features(&self) -> usize {
        match self {
            ModelArtifact::LinearRegressor { n_features, .. } => *n_features,
            ModelArtifact::LogisticClassifier { n_features, .. } => *n_features,
        }
    }

    fn predict(&self, inputs: &[f64]) -> Result<Prediction, String> {
        match self {
            ModelArtifact::LinearRegressor {
                weights, intercept, ..
            } => {
                let value = Self::dot(weights, inputs, *intercept)?;
                Ok(Prediction {
                    value,
                    probabilities: None,
                    positive_index: None,
                })
            }
            ModelArtifact::LogisticClassifier {
                weights,
                intercept,
                classes,
                positive_class,
                ..
            } => {
                let score = Self::dot(weights, inputs, *intercept)?;
                let p = 1.0 / (1.0 + (-score).exp());
                let positive = positive_class.unwrap_or(1);
                let positive_index = classes.iter().position(|c| *c == positive);
                // probability vector in class-list order: [P(neg), P(pos)]
                // for the conventional [0, 1] layout
                let probabilities = classes
                    .iter()
                    .map(|c| if *c == positive { p } else { 1.0 - p })
                    .collect();
                Ok(Prediction {
                    value: if p >= 0.5 { 1.0 } else { 0.0 },
                    probabilities: Some(probabilities),
                    positive_index,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
